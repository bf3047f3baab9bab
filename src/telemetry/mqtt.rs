//! MQTT telemetry sink.
//!
//! Publishes one JSON document per detection with QoS 1. Plain TCP and TLS
//! brokers are supported; TLS uses the system roots unless a CA (and
//! optionally a client certificate pair) is configured.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::{GeoPoint, TelemetryMessage, TelemetrySink};

pub const DEFAULT_BROKER: &str = "127.0.0.1:1883";
pub const DEFAULT_TOPIC: &str = "camera-trap/events";
pub const DEFAULT_CLIENT_ID: &str = "camera-trap";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttSettings {
    /// `host:port`, `mqtt://host:port` or `mqtts://host:port`.
    pub broker: String,
    pub topic: String,
    pub client_id: String,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            use_tls: false,
            username: None,
            password: None,
            ca_path: None,
            client_cert_path: None,
            client_key_path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse a broker address. `mqtts://` and `ssl://` force TLS.
pub fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid MQTT port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}

/// PEM materials for TLS brokers.
#[derive(Clone, Debug, Default)]
struct TlsMaterials {
    ca: Option<Vec<u8>>,
    client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    fn load(settings: &MqttSettings) -> Result<Self> {
        let ca = match &settings.ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA {}", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (&settings.client_cert_path, &settings.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!("failed to read MQTT TLS client cert {}", cert_path.display())
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!("failed to read MQTT TLS client key {}", key_path.display())
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "MQTT TLS client cert and key must be provided together"
                ))
            }
        };

        Ok(Self { ca, client_auth })
    }

    fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }

    fn transport(&self, endpoint: &MqttEndpoint) -> Result<Transport> {
        if !endpoint.use_tls {
            if self.is_configured() {
                return Err(anyhow!(
                    "MQTT TLS materials provided but TLS is disabled (set use_tls or use mqtts://)"
                ));
            }
            return Ok(Transport::tcp());
        }
        if !self.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }
        let ca = self.ca.clone().ok_or_else(|| {
            anyhow!("MQTT TLS CA certificate is required when providing client certificates")
        })?;
        Ok(Transport::tls(ca, self.client_auth.clone(), None))
    }
}

/// JSON document published per detection.
#[derive(Debug, Serialize)]
pub struct DetectionPayload<'a> {
    pub message: &'a str,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal: Option<&'a str>,
    pub properties: BTreeMap<&'a str, &'a str>,
}

impl<'a> DetectionPayload<'a> {
    pub fn new(position: GeoPoint, animal: Option<&'a str>, message: &'a TelemetryMessage) -> Self {
        Self {
            message: &message.body,
            longitude: position.longitude,
            latitude: position.latitude,
            animal,
            properties: message
                .properties
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        }
    }
}

pub struct MqttSink {
    client: Client,
    connection_handle: Option<std::thread::JoinHandle<()>>,
    topic: String,
    alert_species: String,
}

impl MqttSink {
    pub fn connect(settings: &MqttSettings, alert_species: String) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker, settings.use_tls)?;
        let tls = TlsMaterials::load(settings)?;

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        options.set_transport(tls.transport(&endpoint)?);

        let (client, connection) = Client::new(options, 10);
        log::info!(
            "MQTT sink: {}:{} topic {} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            settings.topic,
            endpoint.use_tls,
            settings.username.is_some()
        );
        Ok(Self {
            client,
            connection_handle: Some(spawn_connection(connection)),
            topic: settings.topic.clone(),
            alert_species,
        })
    }
}

fn spawn_connection(mut connection: Connection) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

fn join_connection(handle: std::thread::JoinHandle<()>) {
    if handle.join().is_err() {
        log::warn!("MQTT connection thread panicked");
    }
}

impl TelemetrySink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn notify(&mut self, position: GeoPoint, animal: Option<&str>) -> Result<()> {
        let message = TelemetryMessage::build(position, animal, &self.alert_species);
        let payload = serde_json::to_vec(&DetectionPayload::new(position, animal, &message))?;
        log::info!("Sending message: {}", message.body);
        self.client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .context("publish detection")?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        // The event loop may already be gone; the thread is joined either way.
        let disconnected = self.client.disconnect().context("disconnect from MQTT broker");
        if let Some(handle) = self.connection_handle.take() {
            join_connection(handle);
        }
        disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoints() -> Result<()> {
        let plain = parse_mqtt_endpoint("broker.local:1883", false)?;
        assert_eq!(plain.host, "broker.local");
        assert_eq!(plain.port, 1883);
        assert!(!plain.use_tls);

        let tls = parse_mqtt_endpoint("mqtts://broker.local:8883", false)?;
        assert!(tls.use_tls);
        assert_eq!(tls.port, 8883);

        let v6 = parse_mqtt_endpoint("[::1]:1883", true)?;
        assert_eq!(v6.host, "::1");
        assert!(v6.use_tls);
        Ok(())
    }

    #[test]
    fn rejects_bad_endpoints() {
        assert!(parse_mqtt_endpoint("broker.local", false).is_err());
        assert!(parse_mqtt_endpoint("ws://broker:80", false).is_err());
        assert!(parse_mqtt_endpoint("broker:http", false).is_err());
        assert!(parse_mqtt_endpoint(":1883", false).is_err());
    }

    #[test]
    fn tls_materials_require_tls() {
        let materials = TlsMaterials {
            ca: Some(b"pem".to_vec()),
            client_auth: None,
        };
        let endpoint = MqttEndpoint {
            host: "h".into(),
            port: 1,
            use_tls: false,
        };
        assert!(materials.transport(&endpoint).is_err());
    }

    #[test]
    fn shutdown_joins_a_dead_event_loop() -> Result<()> {
        // Nothing listens on port 1; the event loop stops on its first error.
        let settings = MqttSettings {
            broker: "127.0.0.1:1".to_string(),
            ..MqttSettings::default()
        };
        let mut sink = MqttSink::connect(&settings, "elephant".to_string())?;
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while std::time::Instant::now() < deadline
            && !sink
                .connection_handle
                .as_ref()
                .map_or(true, |handle| handle.is_finished())
        {
            std::thread::sleep(Duration::from_millis(10));
        }

        // Whatever disconnect reports, the thread is reaped.
        let _ = sink.shutdown();
        assert!(sink.connection_handle.is_none());
        Ok(())
    }

    #[test]
    fn panicked_connection_thread_is_reported_not_propagated() {
        let handle = std::thread::spawn(|| panic!("event loop crashed"));
        join_connection(handle);
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let settings = MqttSettings {
            client_cert_path: Some(PathBuf::from("/nonexistent/cert.pem")),
            ..MqttSettings::default()
        };
        assert!(TlsMaterials::load(&settings).is_err());
    }

    #[test]
    fn payload_serializes_position_and_properties() -> Result<()> {
        let position = GeoPoint::new(36.0, -18.5)?;
        let message = TelemetryMessage::build(position, Some("elephant"), "elephant");
        let json = serde_json::to_value(DetectionPayload::new(position, Some("elephant"), &message))?;
        assert_eq!(json["longitude"], 36.0);
        assert_eq!(json["latitude"], -18.5);
        assert_eq!(json["animal"], "elephant");
        assert_eq!(json["properties"]["elephantAlert"], "true");

        let motion = TelemetryMessage::build(position, None, "elephant");
        let json = serde_json::to_value(DetectionPayload::new(position, None, &motion))?;
        assert!(json.get("animal").is_none());
        Ok(())
    }
}
