//! Telemetry sinks for detection notifications.
//!
//! A trap notifies its sink once per detection with the simulated position
//! of the camera and, for the classification trap, the detected species.
//! Sinks:
//! - `iothub`: Azure IoT Hub device-to-cloud messages over HTTPS
//! - `mqtt`: any MQTT broker (QoS 1)
//! - `log`: dry run, logs the message only
//!
//! Delivery is synchronous: `notify` returns once the sink has accepted the
//! message or failed. There is no retry.

pub mod iothub;
pub mod mqtt;

use anyhow::{anyhow, Result};
use std::str::FromStr;

pub use iothub::{IotHubConnection, IotHubSink};
pub use mqtt::{MqttSettings, MqttSink};

/// Simulated fixed position of the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(anyhow!("longitude {} is outside [-180, 180]", longitude));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(anyhow!("latitude {} is outside [-90, 90]", latitude));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// GeoJSON point feature for this position.
    pub fn geo_json(&self) -> String {
        format!(
            r#"{{"type": "Feature", "geometry": {{"type": "Point", "coordinates": [{}, {}]}}}}"#,
            self.longitude, self.latitude
        )
    }
}

/// Rendered notification: a text body plus application properties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryMessage {
    pub body: String,
    pub properties: Vec<(String, String)>,
}

impl TelemetryMessage {
    /// Build the message for a detection.
    ///
    /// Properties: `Location` carries the GeoJSON point, `<species>Alert` is
    /// `"true"` only when `animal` is the alert species.
    pub fn build(position: GeoPoint, animal: Option<&str>, alert_species: &str) -> Self {
        let geo_json = position.geo_json();
        let animal = animal.unwrap_or_default();
        let body = format!("{{GeoJSON: {}, Animal: {}}}", geo_json, animal);
        let alert = if !animal.is_empty() && animal == alert_species {
            "true"
        } else {
            "false"
        };
        Self {
            body,
            properties: vec![
                ("Location".to_string(), geo_json),
                (format!("{}Alert", alert_species), alert.to_string()),
            ],
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Destination for detection notifications.
pub trait TelemetrySink {
    /// Sink identifier.
    fn name(&self) -> &'static str;

    /// Deliver one notification. Blocks until the sink accepts or fails.
    fn notify(&mut self, position: GeoPoint, animal: Option<&str>) -> Result<()>;

    /// Release the connection, if any.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink kind selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    IotHub,
    Mqtt,
    Log,
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "iothub" | "iot_hub" | "azure" => Ok(Self::IotHub),
            "mqtt" => Ok(Self::Mqtt),
            "log" | "dry_run" | "none" => Ok(Self::Log),
            other => Err(anyhow!(
                "unknown telemetry sink '{}': expected 'iothub', 'mqtt' or 'log'",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelemetrySettings {
    pub kind: SinkKind,
    pub connection_string: Option<String>,
    pub mqtt: MqttSettings,
    /// Species whose detection raises the alert property.
    pub alert_species: String,
}

/// Dry-run sink: logs what would have been sent.
pub struct LogSink {
    alert_species: String,
    sent: u64,
}

impl LogSink {
    pub fn new(alert_species: impl Into<String>) -> Self {
        Self {
            alert_species: alert_species.into(),
            sent: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl TelemetrySink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&mut self, position: GeoPoint, animal: Option<&str>) -> Result<()> {
        let message = TelemetryMessage::build(position, animal, &self.alert_species);
        self.sent += 1;
        log::info!(
            "telemetry (dry run) #{}: {} {:?}",
            self.sent,
            message.body,
            message.properties
        );
        Ok(())
    }
}

/// Create the configured sink.
pub fn open_sink(settings: &TelemetrySettings) -> Result<Box<dyn TelemetrySink>> {
    let sink: Box<dyn TelemetrySink> = match settings.kind {
        SinkKind::IotHub => {
            let raw = settings
                .connection_string
                .as_deref()
                .ok_or_else(|| anyhow!("iothub telemetry requires connection_string"))?;
            let connection = IotHubConnection::parse(raw)?;
            Box::new(IotHubSink::new(connection, settings.alert_species.clone()))
        }
        SinkKind::Mqtt => Box::new(MqttSink::connect(
            &settings.mqtt,
            settings.alert_species.clone(),
        )?),
        SinkKind::Log => Box::new(LogSink::new(settings.alert_species.clone())),
    };
    log::info!("telemetry sink: {}", sink.name());
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_geo_json_and_alert() -> Result<()> {
        let position = GeoPoint::new(36.2833, -18.8333)?;
        let message = TelemetryMessage::build(position, Some("elephant"), "elephant");

        let geo = r#"{"type": "Feature", "geometry": {"type": "Point", "coordinates": [36.2833, -18.8333]}}"#;
        assert_eq!(message.body, format!("{{GeoJSON: {}, Animal: elephant}}", geo));
        assert_eq!(message.property("Location"), Some(geo));
        assert_eq!(message.property("elephantAlert"), Some("true"));
        Ok(())
    }

    #[test]
    fn motion_message_has_no_animal_and_no_alert() -> Result<()> {
        let message = TelemetryMessage::build(GeoPoint::new(1.5, 2.0)?, None, "elephant");
        assert!(message.body.ends_with("Animal: }"));
        assert_eq!(message.property("elephantAlert"), Some("false"));
        Ok(())
    }

    #[test]
    fn position_is_range_checked() {
        assert!(GeoPoint::new(181.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -90.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-180.0, 90.0).is_ok());
    }

    #[test]
    fn sink_kind_parses() {
        assert_eq!("IoTHub".parse::<SinkKind>().unwrap(), SinkKind::IotHub);
        assert_eq!("mqtt".parse::<SinkKind>().unwrap(), SinkKind::Mqtt);
        assert!("kafka".parse::<SinkKind>().is_err());
    }

    #[test]
    fn log_sink_counts_notifications() -> Result<()> {
        let mut sink = LogSink::new("elephant");
        sink.notify(GeoPoint::new(0.0, 0.0)?, None)?;
        sink.notify(GeoPoint::new(0.0, 0.0)?, Some("cat"))?;
        assert_eq!(sink.sent(), 2);
        Ok(())
    }
}
