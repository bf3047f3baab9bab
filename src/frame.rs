//! Captured frames.
//!
//! A `Frame` is the unit that flows from a `FrameSource` into the traps:
//! - RGB pixels (8 bits per channel, row-major)
//! - A capture sequence number assigned by the source
//! - A local wall-clock capture timestamp
//!
//! Frames are ephemeral. The traps never retain a `Frame` beyond the current
//! cycle; the motion trap keeps only a derived grayscale reference.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use image::RgbImage;

pub struct Frame {
    image: RgbImage,

    /// Position of this frame in the source stream, starting at 0.
    pub sequence: u64,

    /// Local time at which the source produced the frame.
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Local::now(),
        }
    }

    /// Build a frame from packed RGB24 bytes, validating the buffer length.
    pub fn from_rgb_bytes(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// A zero-sized frame is what a drained capture device hands back.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_bytes_validate_length() {
        assert!(Frame::from_rgb_bytes(vec![0u8; 12], 2, 2, 0).is_ok());
        assert!(Frame::from_rgb_bytes(vec![0u8; 11], 2, 2, 0).is_err());
    }

    #[test]
    fn zero_sized_frame_is_empty() {
        let frame = Frame::new(RgbImage::new(0, 0), 3);
        assert!(frame.is_empty());
        assert_eq!(frame.sequence, 3);
    }
}
