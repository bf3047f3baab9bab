//! Frame ingestion sources.
//!
//! Every source yields RGB `Frame`s in capture order and reports end of
//! stream as `Ok(None)`:
//! - `stub://` synthetic scenes (testing, dry runs)
//! - Image directories and single stills (camera-trap photo feeds)
//! - Local video files and `rtsp://` URLs (feature: ingest-file-ffmpeg)
//! - Live USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources never write frames anywhere; whatever the trap keeps is derived
//! from the frame it is handed.

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
mod images;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::Frame;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::FfmpegSource;
pub use images::ImageSequenceSource;
pub use synthetic::{SceneSpec, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// A stream of frames.
pub trait FrameSource {
    /// Open the underlying stream. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame; `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Capture preferences for live devices and decoders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// Device node used when no source is given.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Target frame rate; 0 leaves the device default.
    pub target_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Open the source named by `video`, or the live device when absent.
pub fn open_source(video: Option<&str>, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let Some(video) = video else {
        return open_device(settings);
    };
    if video.trim().is_empty() {
        return Err(anyhow!("video source must not be empty"));
    }
    if video.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_url(video)?));
    }
    let path = Path::new(video);
    if !video.contains("://") && (path.is_dir() || ImageSequenceSource::is_still(path)) {
        return Ok(Box::new(ImageSequenceSource::new(path)?));
    }
    open_video(video, settings)
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(video: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegSource::new(video, settings.target_fps)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(video: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "decoding '{}' requires the ingest-file-ffmpeg feature",
        video
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(settings.clone())))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "live capture from {} requires the ingest-v4l2 feature",
        settings.device
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_url_opens_synthetic_source() -> Result<()> {
        let mut source = open_source(Some("stub://yard?frames=3"), &SourceSettings::default())?;
        source.connect()?;
        let mut count = 0;
        while source.next_frame()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn empty_source_is_rejected() {
        assert!(open_source(Some("  "), &SourceSettings::default()).is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn live_device_requires_feature() {
        let err = open_source(None, &SourceSettings::default()).err();
        assert!(err.is_some_and(|e| e.to_string().contains("ingest-v4l2")));
    }
}
