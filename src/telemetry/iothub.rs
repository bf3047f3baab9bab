//! Azure IoT Hub device-to-cloud sink.
//!
//! Messages are posted to the hub's HTTPS device endpoint, authorized with a
//! SAS token derived from the device connection string. Application
//! properties travel as `iothub-app-*` headers.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{GeoPoint, TelemetryMessage, TelemetrySink};
use crate::signing::{sign_base64_key, url_encode};

const API_VERSION: &str = "2020-03-13";
const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Parsed device connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct IotHubConnection {
    pub host_name: String,
    pub device_id: String,
    shared_access_key: String,
}

impl IotHubConnection {
    /// Parse `HostName=…;DeviceId=…;SharedAccessKey=…`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut host_name = None;
        let mut device_id = None;
        let mut key = None;
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed connection string segment '{}'", name_only(part)))?;
            match name {
                "HostName" => host_name = Some(value.to_string()),
                "DeviceId" => device_id = Some(value.to_string()),
                "SharedAccessKey" => key = Some(value.to_string()),
                _ => {}
            }
        }
        let host_name = host_name
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("connection string is missing HostName"))?;
        let device_id = device_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("connection string is missing DeviceId"))?;
        let shared_access_key = key
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("connection string is missing SharedAccessKey"))?;
        Ok(Self {
            host_name,
            device_id,
            shared_access_key,
        })
    }

    /// SAS resource URI of this device.
    pub fn resource_uri(&self) -> String {
        format!("{}/devices/{}", self.host_name, self.device_id)
    }

    pub fn events_url(&self) -> String {
        format!(
            "https://{}/devices/{}/messages/events?api-version={}",
            self.host_name,
            url_encode(&self.device_id),
            API_VERSION
        )
    }

    /// SAS token valid until `expiry` (seconds since the epoch).
    pub fn sas_token(&self, expiry: u64) -> Result<String> {
        let resource = url_encode(&self.resource_uri());
        let to_sign = format!("{}\n{}", resource, expiry);
        let signature = sign_base64_key(&self.shared_access_key, &to_sign)?;
        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}",
            resource,
            url_encode(&signature),
            expiry
        ))
    }
}

// The key must never reach the logs.
impl std::fmt::Debug for IotHubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IotHubConnection")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

fn name_only(segment: &str) -> &str {
    segment.split('=').next().unwrap_or_default()
}

pub struct IotHubSink {
    connection: IotHubConnection,
    alert_species: String,
    agent: ureq::Agent,
    token: Option<(String, u64)>,
    sent: u64,
}

impl IotHubSink {
    pub fn new(connection: IotHubConnection, alert_species: String) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        log::info!(
            "IotHubSink: device {} on {}",
            connection.device_id,
            connection.host_name
        );
        Self {
            connection,
            alert_species,
            agent,
            token: None,
            sent: 0,
        }
    }

    fn current_token(&mut self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the epoch")?
            .as_secs();
        if let Some((token, expiry)) = &self.token {
            if now + TOKEN_REFRESH_MARGIN.as_secs() < *expiry {
                return Ok(token.clone());
            }
        }
        let expiry = now + TOKEN_TTL.as_secs();
        let token = self.connection.sas_token(expiry)?;
        self.token = Some((token.clone(), expiry));
        Ok(token)
    }
}

impl TelemetrySink for IotHubSink {
    fn name(&self) -> &'static str {
        "iothub"
    }

    fn notify(&mut self, position: GeoPoint, animal: Option<&str>) -> Result<()> {
        let message = TelemetryMessage::build(position, animal, &self.alert_species);
        let token = self.current_token()?;

        log::info!("Sending message: {}", message.body);
        let mut request = self
            .agent
            .post(&self.connection.events_url())
            .set("Authorization", &token)
            .set("Content-Type", "text/plain; charset=utf-8");
        for (name, value) in &message.properties {
            request = request.set(&format!("iothub-app-{}", name), value);
        }

        match request.send_string(&message.body) {
            Ok(_) => {
                self.sent += 1;
                log::info!("Message successfully sent (#{})", self.sent);
                Ok(())
            }
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                Err(anyhow!("iot hub rejected message: HTTP {} {}", code, detail))
            }
            Err(e) => Err(anyhow::Error::new(e).context("send message to iot hub")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN: &str =
        "HostName=CameraTrap.azure-devices.net;DeviceId=trap-01;SharedAccessKey=ZGV2aWNlLXNlY3JldA==";

    #[test]
    fn parses_connection_string() -> Result<()> {
        let conn = IotHubConnection::parse(CONN)?;
        assert_eq!(conn.host_name, "CameraTrap.azure-devices.net");
        assert_eq!(conn.device_id, "trap-01");
        assert_eq!(conn.resource_uri(), "CameraTrap.azure-devices.net/devices/trap-01");
        assert_eq!(
            conn.events_url(),
            "https://CameraTrap.azure-devices.net/devices/trap-01/messages/events?api-version=2020-03-13"
        );
        Ok(())
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = IotHubConnection::parse("HostName=hub;SharedAccessKey=abc=").unwrap_err();
        assert!(err.to_string().contains("DeviceId"));
        assert!(IotHubConnection::parse("garbage").is_err());
    }

    #[test]
    fn sas_token_has_resource_signature_and_expiry() -> Result<()> {
        let conn = IotHubConnection::parse(CONN)?;
        let token = conn.sas_token(1_700_000_000)?;
        assert!(token.starts_with(
            "SharedAccessSignature sr=CameraTrap.azure-devices.net%2Fdevices%2Ftrap-01&sig="
        ));
        assert!(token.ends_with("&se=1700000000"));
        Ok(())
    }

    #[test]
    fn debug_output_hides_key() -> Result<()> {
        let conn = IotHubConnection::parse(CONN)?;
        assert!(!format!("{:?}", conn).contains("ZGV2aWNl"));
        Ok(())
    }
}
