use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::classify::{
    InputLayout, LabelTable, ModelSettings, SpeciesGate, DEFAULT_INPUT_SIZE, DEFAULT_LABELS,
    DEFAULT_TARGET_SPECIES,
};
use crate::ingest::{SourceSettings, DEFAULT_DEVICE};
use crate::motion::{MotionSettings, DEFAULT_FRAME_WIDTH};
use crate::telemetry::{GeoPoint, MqttSettings, SinkKind, TelemetrySettings};

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_REFERENCE_FRAME_RESET: u32 = 100;
const DEFAULT_OBJECT_SIZE: f64 = 500.0;
const DEFAULT_MODEL_CHECK_RATE: u64 = 30;
const DEFAULT_EXPORT_PATH: &str = "Times.csv";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct TrapConfigFile {
    reference_frame_reset: Option<u32>,
    object_size: Option<f64>,
    model_check_rate: Option<u64>,
    #[serde(alias = "Longitude")]
    longitude: Option<f64>,
    #[serde(alias = "Latitude")]
    latitude: Option<f64>,
    frame_width: Option<u32>,
    target_species: Option<String>,
    labels: Option<Vec<String>>,
    model: Option<ModelConfigFile>,
    export_path: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    device: Option<String>,
    capture: Option<CaptureConfigFile>,
    connection_string: Option<String>,
    telemetry: Option<TelemetryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    input_width: Option<u32>,
    input_height: Option<u32>,
    layout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    kind: Option<String>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    use_tls: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    ca_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
}

/// Settings of the `camera_trap` binary, built once at startup.
#[derive(Debug, Clone)]
pub struct TrapConfig {
    pub reference_frame_reset: u32,
    pub object_size: f64,
    pub model_check_rate: u64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub frame_width: u32,
    pub target_species: String,
    pub labels: Vec<String>,
    pub model: ModelSettings,
    pub export_path: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
    pub source: SourceSettings,
    pub sink_kind: SinkKind,
    pub connection_string: Option<String>,
    pub mqtt: MqttSettings,
}

impl TrapConfig {
    /// Load from `path`, else `CAMERA_TRAP_CONFIG`, else `config.json` when
    /// present. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env_value("CAMERA_TRAP_CONFIG").map(PathBuf::from));
        let file_cfg = match explicit {
            Some(path) => read_config_file(&path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    read_config_file(default)?
                } else {
                    log::warn!("no {} found; using defaults", DEFAULT_CONFIG_PATH);
                    TrapConfigFile::default()
                }
            }
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrapConfigFile) -> Result<Self> {
        let model_file = file.model.unwrap_or_default();
        let layout = match model_file.layout.as_deref() {
            Some(raw) => InputLayout::from_str(raw)?,
            None => InputLayout::default(),
        };
        let model = ModelSettings {
            input_width: model_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: model_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
            layout,
        };

        let capture = file.capture.unwrap_or_default();
        let source = SourceSettings {
            device: file.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: capture.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
            height: capture.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            target_fps: capture.target_fps.unwrap_or(DEFAULT_CAPTURE_FPS),
        };

        let telemetry = file.telemetry.unwrap_or_default();
        let connection_string = file.connection_string.filter(|s| !s.trim().is_empty());
        let sink_kind = match telemetry.kind.as_deref() {
            Some(raw) => SinkKind::from_str(raw)?,
            None => default_sink_kind(connection_string.as_deref()),
        };
        let mqtt_file = telemetry.mqtt.unwrap_or_default();
        let defaults = MqttSettings::default();
        let mqtt = MqttSettings {
            broker: mqtt_file.broker.unwrap_or(defaults.broker),
            topic: mqtt_file.topic.unwrap_or(defaults.topic),
            client_id: mqtt_file.client_id.unwrap_or(defaults.client_id),
            use_tls: mqtt_file.use_tls.unwrap_or(defaults.use_tls),
            username: mqtt_file.username,
            password: mqtt_file.password,
            ca_path: mqtt_file.ca_path,
            client_cert_path: mqtt_file.client_cert_path,
            client_key_path: mqtt_file.client_key_path,
        };

        Ok(Self {
            reference_frame_reset: file
                .reference_frame_reset
                .unwrap_or(DEFAULT_REFERENCE_FRAME_RESET),
            object_size: file.object_size.unwrap_or(DEFAULT_OBJECT_SIZE),
            model_check_rate: file.model_check_rate.unwrap_or(DEFAULT_MODEL_CHECK_RATE),
            longitude: file.longitude,
            latitude: file.latitude,
            frame_width: file.frame_width.unwrap_or(DEFAULT_FRAME_WIDTH),
            target_species: file
                .target_species
                .unwrap_or_else(|| DEFAULT_TARGET_SPECIES.to_string()),
            labels: file
                .labels
                .unwrap_or_else(|| DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()),
            model,
            export_path: file
                .export_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_PATH)),
            snapshot_dir: file.snapshot_dir,
            source,
            sink_kind,
            connection_string,
            mqtt,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(raw) = env_value("CAMERA_TRAP_LONGITUDE") {
            self.longitude = Some(
                raw.parse()
                    .map_err(|_| anyhow!("CAMERA_TRAP_LONGITUDE must be a number"))?,
            );
        }
        if let Some(raw) = env_value("CAMERA_TRAP_LATITUDE") {
            self.latitude = Some(
                raw.parse()
                    .map_err(|_| anyhow!("CAMERA_TRAP_LATITUDE must be a number"))?,
            );
        }
        if let Some(conn) = env_value("CAMERA_TRAP_CONNECTION_STRING") {
            // A connection string in the environment selects IoT Hub unless
            // the sink was chosen explicitly.
            if self.sink_kind == SinkKind::Log && self.connection_string.is_none() {
                self.sink_kind = SinkKind::IotHub;
            }
            self.connection_string = Some(conn);
        }
        if let Some(species) = env_value("CAMERA_TRAP_TARGET_SPECIES") {
            self.target_species = species;
        }
        if let Some(path) = env_value("CAMERA_TRAP_EXPORT_PATH") {
            self.export_path = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.reference_frame_reset == 0 {
            return Err(anyhow!("reference_frame_reset must be greater than zero"));
        }
        if !self.object_size.is_finite() || self.object_size < 0.0 {
            return Err(anyhow!(
                "object_size must be a non-negative number, got {}",
                self.object_size
            ));
        }
        if self.model_check_rate == 0 {
            return Err(anyhow!("model_check_rate must be greater than zero"));
        }
        if self.frame_width == 0 {
            return Err(anyhow!("frame_width must be greater than zero"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input dimensions must be greater than zero"));
        }
        self.position()?;
        self.species_gate()?;
        if self.sink_kind == SinkKind::IotHub && self.connection_string.is_none() {
            return Err(anyhow!("iothub telemetry requires connection_string"));
        }
        Ok(())
    }

    /// Simulated camera position from `Longitude`/`Latitude`.
    pub fn position(&self) -> Result<GeoPoint> {
        let longitude = self
            .longitude
            .ok_or_else(|| anyhow!("config is missing Longitude"))?;
        let latitude = self
            .latitude
            .ok_or_else(|| anyhow!("config is missing Latitude"))?;
        GeoPoint::new(longitude, latitude)
    }

    pub fn motion_settings(&self) -> MotionSettings {
        MotionSettings {
            frame_width: self.frame_width,
            reference_frame_reset: self.reference_frame_reset,
            object_size: self.object_size,
        }
    }

    pub fn label_table(&self) -> Result<LabelTable> {
        LabelTable::new(self.labels.clone())
    }

    pub fn species_gate(&self) -> Result<SpeciesGate> {
        SpeciesGate::new(self.label_table()?, self.target_species.clone())
    }

    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            kind: self.sink_kind,
            connection_string: self.connection_string.clone(),
            mqtt: self.mqtt.clone(),
            alert_species: self.target_species.clone(),
        }
    }
}

fn default_sink_kind(connection_string: Option<&str>) -> SinkKind {
    if connection_string.is_some() {
        SinkKind::IotHub
    } else {
        SinkKind::Log
    }
}

#[derive(Debug, Deserialize, Default)]
struct IndexerConfigFile {
    storage_account_name: Option<String>,
    storage_account_key: Option<String>,
    storage_container_name: Option<String>,
    video_indexer_account_id: Option<String>,
    video_indexer_api_key: Option<String>,
    video_indexer_api_region: Option<String>,
    file_name: Option<String>,
    confidence_threshold: Option<f64>,
    poll_interval_secs: Option<u64>,
}

/// Settings of the `video_indexer` binary.
#[derive(Clone)]
pub struct IndexerConfig {
    pub storage_account_name: String,
    pub storage_account_key: String,
    pub storage_container_name: String,
    pub video_indexer_account_id: String,
    pub video_indexer_api_key: String,
    pub video_indexer_api_region: String,
    pub file_name: String,
    pub confidence_threshold: f64,
    pub poll_interval_secs: u64,
}

impl IndexerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file: IndexerConfigFile = read_structured(path)?;
        let cfg = Self {
            storage_account_name: required(file.storage_account_name, "storage_account_name")?,
            storage_account_key: required(file.storage_account_key, "storage_account_key")?,
            storage_container_name: required(
                file.storage_container_name,
                "storage_container_name",
            )?,
            video_indexer_account_id: required(
                file.video_indexer_account_id,
                "video_indexer_account_id",
            )?,
            video_indexer_api_key: required(file.video_indexer_api_key, "video_indexer_api_key")?,
            video_indexer_api_region: required(
                file.video_indexer_api_region,
                "video_indexer_api_region",
            )?,
            file_name: required(file.file_name, "file_name")?,
            confidence_threshold: file
                .confidence_threshold
                .ok_or_else(|| anyhow!("config is missing confidence_threshold"))?,
            poll_interval_secs: file
                .poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        };
        if !cfg.confidence_threshold.is_finite() {
            return Err(anyhow!("confidence_threshold must be a finite number"));
        }
        if cfg.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be greater than zero"));
        }
        Ok(cfg)
    }
}

impl std::fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("storage_account_name", &self.storage_account_name)
            .field("storage_container_name", &self.storage_container_name)
            .field("video_indexer_account_id", &self.video_indexer_account_id)
            .field("video_indexer_api_region", &self.video_indexer_api_region)
            .field("file_name", &self.file_name)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish_non_exhaustive()
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("config is missing {}", key))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<TrapConfigFile> {
    read_structured(path)
}

/// Parse JSON, or TOML when the extension says so.
fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}
