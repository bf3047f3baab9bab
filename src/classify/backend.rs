use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;
use std::str::FromStr;

use super::labels::PredictionVector;

/// Default square input edge of the bundled animal model.
pub const DEFAULT_INPUT_SIZE: u32 = 256;

/// Memory layout of the model's image input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// Batch, height, width, channel (Keras exports).
    #[default]
    Nhwc,
    /// Batch, channel, height, width (PyTorch exports).
    Nchw,
}

impl FromStr for InputLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nhwc" => Ok(Self::Nhwc),
            "nchw" => Ok(Self::Nchw),
            other => Err(anyhow!(
                "unknown input layout '{}': expected 'nhwc' or 'nchw'",
                other
            )),
        }
    }
}

/// A frame resized to the model input and normalized to [0, 1].
///
/// Samples are interleaved RGB in row-major order; backends reorder them
/// into their own tensor layout.
#[derive(Clone, Debug)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ModelInput {
    pub fn from_frame(frame: &RgbImage, width: u32, height: u32) -> Self {
        let resized = imageops::resize(frame, width, height, FilterType::CatmullRom);
        let data = resized
            .as_raw()
            .iter()
            .map(|&sample| sample as f32 / 255.0)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Sample at pixel (x, y), channel c.
    pub fn sample(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width as usize + x) * 3 + c]
    }
}

/// Image classifier trait.
///
/// Implementations receive a prepared input and return one score per class.
/// They hold no state between calls beyond the loaded model.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Width and height the model expects.
    fn input_size(&self) -> (u32, u32);

    fn classify(&mut self, input: &ModelInput) -> Result<PredictionVector>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn input_is_resized_and_normalized() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([255, 0, 51]));
        let input = ModelInput::from_frame(&frame, 256, 256);
        assert_eq!(input.data.len(), 256 * 256 * 3);
        assert!((input.sample(10, 20, 0) - 1.0).abs() < 1e-6);
        assert!(input.sample(10, 20, 1).abs() < 1e-6);
        assert!((input.sample(10, 20, 2) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn layout_parses_case_insensitively() {
        assert_eq!("NCHW".parse::<InputLayout>().unwrap(), InputLayout::Nchw);
        assert!("hwc".parse::<InputLayout>().is_err());
    }
}
