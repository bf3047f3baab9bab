//! Camera Trap Simulator
//!
//! Reads frames from a live or recorded feed, detects animals in them and
//! reports each detection to a telemetry endpoint as a geotagged event.
//!
//! # Pipelines
//!
//! - **Motion**: frames are resized, converted to blurred grayscale and
//!   differenced against a periodically refreshed baseline. External contours
//!   of the thresholded, dilated difference above `object_size` mark the frame
//!   as occupied; entering an occupied state notifies the sink, and every
//!   entry/exit is logged for the session export (`Times.csv`).
//! - **Classification**: every `model_check_rate`-th frame is classified by an
//!   image model; the target species (by default `elephant`) notifies the
//!   sink with its name.
//!
//! A companion tool (`video_indexer`) indexes a stored clip with Azure Video
//! Indexer and filters the returned labels by confidence.
//!
//! # Module Structure
//!
//! - `frame`: the captured frame type
//! - `ingest`: frame sources (synthetic, stills, video files, V4L2)
//! - `motion`: preprocessing, baseline, differencing, status and session log
//! - `classify`: model input, classifiers and the species gate
//! - `telemetry`: notification sinks (IoT Hub, MQTT, log)
//! - `trap`: the detection loops
//! - `mode`, `config`: startup selection and settings
//! - `indexer`, `ui`: the video indexer tool

pub mod classify;
pub mod config;
pub mod frame;
pub mod indexer;
pub mod ingest;
pub mod mode;
pub mod motion;
mod signing;
pub mod telemetry;
pub mod trap;
pub mod ui;

pub use classify::{open_classifier, Classifier, LabelTable, PredictionVector, SpeciesGate};
pub use config::{IndexerConfig, TrapConfig};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceSettings};
pub use mode::{select_mode, TrapMode};
pub use motion::{MotionDetector, MotionSettings, SessionRecorder};
pub use telemetry::{open_sink, GeoPoint, TelemetrySink};
pub use trap::{run, ClassificationTrap, MotionTrap, Trap, TrapSummary};
