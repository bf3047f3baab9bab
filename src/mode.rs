//! Pipeline selection from the command line.

use anyhow::{anyhow, Result};
use std::path::Path;

/// Which trap runs, and on what.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrapMode {
    /// Frame differencing; `None` reads the live device.
    Motion { video: Option<String> },
    /// Model inference on every `model_check_rate`-th frame.
    Classification { model: String, video: Option<String> },
}

impl TrapMode {
    pub fn video(&self) -> Option<&str> {
        match self {
            Self::Motion { video } | Self::Classification { video, .. } => video.as_deref(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Motion { .. } => "motion",
            Self::Classification { .. } => "classification",
        }
    }
}

/// Choose the pipeline and check that every local path given exists.
///
/// A model selects classification; otherwise motion. URLs (anything with a
/// scheme, such as `rtsp://` or `stub://`) are not checked here.
pub fn select_mode(video: Option<&str>, model: Option<&str>) -> Result<TrapMode> {
    for (what, path) in [("video", video), ("model", model)] {
        if let Some(path) = path {
            check_exists(what, path)?;
        }
    }
    let video = video.map(str::to_string);
    Ok(match model {
        Some(model) => TrapMode::Classification {
            model: model.to_string(),
            video,
        },
        None => TrapMode::Motion { video },
    })
}

fn check_exists(what: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(anyhow!("{} path must not be empty", what));
    }
    if path.contains("://") {
        return Ok(());
    }
    if !Path::new(path).exists() {
        return Err(anyhow!("{} file does not exist: {}", what, path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_selects_live_motion() -> Result<()> {
        assert_eq!(select_mode(None, None)?, TrapMode::Motion { video: None });
        Ok(())
    }

    #[test]
    fn model_selects_classification() -> Result<()> {
        let model = tempfile::NamedTempFile::new()?;
        let model_path = model.path().to_string_lossy().to_string();
        let mode = select_mode(None, Some(&model_path))?;
        assert_eq!(
            mode,
            TrapMode::Classification {
                model: model_path,
                video: None
            }
        );
        assert_eq!(mode.name(), "classification");
        Ok(())
    }

    #[test]
    fn video_only_selects_motion_on_file() -> Result<()> {
        let video = tempfile::NamedTempFile::new()?;
        let video_path = video.path().to_string_lossy().to_string();
        let mode = select_mode(Some(&video_path), None)?;
        assert_eq!(mode.video(), Some(video_path.as_str()));
        assert_eq!(mode.name(), "motion");
        Ok(())
    }

    #[test]
    fn each_missing_path_is_fatal() -> Result<()> {
        let present = tempfile::NamedTempFile::new()?;
        let present = present.path().to_string_lossy().to_string();
        assert!(select_mode(Some("/nonexistent/clip.mp4"), None).is_err());
        assert!(select_mode(Some(&present), Some("/nonexistent/model.onnx")).is_err());
        assert!(select_mode(Some("/nonexistent/clip.mp4"), Some(&present)).is_err());
        Ok(())
    }

    #[test]
    fn urls_are_not_checked() -> Result<()> {
        let mode = select_mode(Some("rtsp://camera.local/stream"), Some("stub://2"))?;
        assert_eq!(mode.video(), Some("rtsp://camera.local/stream"));
        Ok(())
    }
}
