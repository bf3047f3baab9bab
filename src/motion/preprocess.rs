use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Width every frame is scaled to before differencing.
pub const DEFAULT_FRAME_WIDTH: u32 = 500;

/// Sigma of a 21x21 Gaussian kernel when the sigma is derived from the kernel size.
pub const BLUR_SIGMA: f32 = 3.5;

/// Output of the preprocessing stage.
pub struct Preprocessed {
    /// Resized color frame, used for annotation.
    pub color: RgbImage,
    /// Resized, grayscale, blurred frame, used for differencing.
    pub gray: GrayImage,
}

#[derive(Clone, Debug)]
pub struct Preprocessor {
    target_width: u32,
    blur_sigma: f32,
}

impl Preprocessor {
    pub fn new(target_width: u32) -> Self {
        Self {
            target_width: target_width.max(1),
            blur_sigma: BLUR_SIGMA,
        }
    }

    /// Resize to the target width (aspect preserved), convert to luma and blur.
    ///
    /// Returns `None` for an empty frame, which callers treat as end of stream.
    pub fn process(&self, frame: &RgbImage) -> Option<Preprocessed> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let scaled_height =
            ((height as f64 * self.target_width as f64) / width as f64).round() as u32;
        let color = imageops::resize(
            frame,
            self.target_width,
            scaled_height.max(1),
            FilterType::Triangle,
        );
        let gray = imageops::grayscale(&color);
        let gray = gaussian_blur_f32(&gray, self.blur_sigma);

        Some(Preprocessed { color, gray })
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_WIDTH)
    }
}
