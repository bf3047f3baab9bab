//! Synthetic scene source (`stub://`).
//!
//! Renders a static textured background with light sensor noise. Between
//! frames `enter` (inclusive) and `leave` (exclusive) a bright square walks
//! across the scene, which is enough for the motion pipeline to see one
//! entry and one exit.
//!
//! `stub://<name>?frames=N&width=W&height=H&enter=A&leave=B`

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const NOISE_SEED: u64 = 0x5eed_ca3e;
const BLOCK_LEVEL: u8 = 230;
const BLOCK_STEP: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneSpec {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    /// First frame with the subject in view.
    pub enter: u64,
    /// First frame after the subject left.
    pub leave: u64,
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            frames: 120,
            width: 640,
            height: 480,
            enter: 30,
            leave: 60,
        }
    }
}

impl SceneSpec {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("synthetic scene must have non-zero dimensions"));
        }
        if self.leave < self.enter {
            return Err(anyhow!(
                "synthetic scene leave ({}) precedes enter ({})",
                self.leave,
                self.enter
            ));
        }
        Ok(())
    }

    fn subject_present(&self, sequence: u64) -> bool {
        sequence >= self.enter && sequence < self.leave
    }
}

pub struct SyntheticSource {
    name: String,
    scene: SceneSpec,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, scene: SceneSpec) -> Result<Self> {
        scene.validate()?;
        Ok(Self {
            name: name.into(),
            scene,
            rng: StdRng::seed_from_u64(NOISE_SEED),
            frame_count: 0,
            connected: false,
        })
    }

    pub fn from_url(raw: &str) -> Result<Self> {
        let url = url::Url::parse(raw).with_context(|| format!("invalid stub source '{}'", raw))?;
        let mut scene = SceneSpec::default();
        for (key, value) in url.query_pairs() {
            let parsed: u64 = value
                .parse()
                .with_context(|| format!("stub source parameter {}={} is not a number", key, value))?;
            match key.as_ref() {
                "frames" => scene.frames = parsed,
                "width" => scene.width = u32::try_from(parsed).context("stub width")?,
                "height" => scene.height = u32::try_from(parsed).context("stub height")?,
                "enter" => scene.enter = parsed,
                "leave" => scene.leave = parsed,
                other => return Err(anyhow!("unknown stub source parameter '{}'", other)),
            }
        }
        Self::new(raw, scene)
    }

    pub fn scene(&self) -> &SceneSpec {
        &self.scene
    }

    fn render(&mut self, sequence: u64) -> RgbImage {
        let SceneSpec { width, height, .. } = self.scene;
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            let base = ((x * 7 + y * 13) % 64 + 64) as u8;
            Rgb([base, base.saturating_add(8), base.saturating_sub(8)])
        });
        for pixel in image.pixels_mut() {
            let noise: i16 = self.rng.gen_range(-2..=2);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as i16 + noise).clamp(0, 255) as u8;
            }
        }

        if self.scene.subject_present(sequence) {
            let side = (width / 8).min(height / 6).max(1);
            let travel = width.saturating_sub(side).max(1);
            let step = (sequence - self.scene.enter) as u32;
            let x0 = (width / 16 + step.saturating_mul(BLOCK_STEP)) % travel;
            let y0 = (height - side.min(height)) / 2;
            for y in y0..(y0 + side).min(height) {
                for x in x0..(x0 + side).min(width) {
                    image.put_pixel(x, y, Rgb([BLOCK_LEVEL; 3]));
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{}, {} frames)",
            self.name,
            self.scene.width,
            self.scene.height,
            self.scene.frames
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.name));
        }
        if self.frame_count >= self.scene.frames {
            return Ok(None);
        }
        let sequence = self.frame_count;
        let image = self.render(sequence);
        self.frame_count += 1;
        Ok(Some(Frame::new(image, sequence)))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.name.clone(),
        }
    }
}
