//! Still-image sources.
//!
//! A directory is read as an image sequence ordered by file name; a single
//! still is a one-frame stream. Files are decoded lazily, one per
//! `next_frame`.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const STILL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceSource {
    origin: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    connected: bool,
    last_error: Option<String>,
}

impl ImageSequenceSource {
    pub fn new(path: &Path) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("failed to list image directory {}", path.display()))?
            {
                let entry = entry?;
                let candidate = entry.path();
                if candidate.is_file() && Self::is_still(&candidate) {
                    files.push(candidate);
                }
            }
            files.sort();
            files
        } else if Self::is_still(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(anyhow!("{} is not an image or directory", path.display()));
        };

        if files.is_empty() {
            log::warn!("ImageSequenceSource: no images in {}", path.display());
        }
        Ok(Self {
            origin: path.to_path_buf(),
            files,
            cursor: 0,
            connected: false,
            last_error: None,
        })
    }

    /// Whether `path` has a still-image extension.
    pub fn is_still(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                STILL_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "ImageSequenceSource: connected to {} ({} images)",
            self.origin.display(),
            self.files.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("image source {} not connected", self.origin.display()));
        }
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?
            .to_rgb8();
        log::trace!("ImageSequenceSource: decoded {}", path.display());
        let sequence = self.cursor as u64;
        self.cursor += 1;
        Ok(Some(Frame::new(image, sequence)))
    }

    fn is_healthy(&self) -> bool {
        self.connected && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.cursor as u64,
            source: self.origin.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_still(dir: &Path, name: &str, level: u8) -> Result<PathBuf> {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 6, Rgb([level; 3])).save(&path)?;
        Ok(path)
    }

    #[test]
    fn directory_is_read_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_still(dir.path(), "b.png", 20)?;
        write_still(dir.path(), "a.png", 10)?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = ImageSequenceSource::new(dir.path())?;
        assert_eq!(source.len(), 2);
        source.connect()?;
        let first = source.next_frame()?.context("first frame")?;
        let second = source.next_frame()?.context("second frame")?;
        assert_eq!(first.image().get_pixel(0, 0).0, [10; 3]);
        assert_eq!(second.image().get_pixel(0, 0).0, [20; 3]);
        assert_eq!(second.sequence, 1);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn single_still_is_one_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_still(dir.path(), "trap.PNG", 99)?;
        let mut source = ImageSequenceSource::new(&path)?;
        source.connect()?;
        let frame = source.next_frame()?.context("frame")?;
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn undecodable_still_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg")?;
        let mut source = ImageSequenceSource::new(&path)?;
        source.connect()?;
        assert!(source.next_frame().is_err());
        assert!(!source.is_healthy());
        Ok(())
    }

    #[test]
    fn non_image_file_is_rejected() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(ImageSequenceSource::new(file.path()).is_err());
        Ok(())
    }
}
