#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::{Classifier, InputLayout, ModelInput};
use crate::classify::labels::PredictionVector;

/// Tract-based classifier for ONNX models.
///
/// Loads a local model file once and runs it on normalized RGB inputs.
/// The first output tensor is flattened into the per-class scores.
pub struct TractClassifier {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    layout: InputLayout,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        layout: InputLayout,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let shape = match layout {
            InputLayout::Nhwc => tvec!(1, height as usize, width as usize, 3),
            InputLayout::Nchw => tvec!(1, 3, height as usize, width as usize),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractClassifier: loaded {} ({}x{}, {:?})",
            model_path.display(),
            width,
            height,
            layout
        );

        Ok(Self {
            model,
            width,
            height,
            layout,
        })
    }

    fn build_input(&self, input: &ModelInput) -> Result<Tensor> {
        if input.width != self.width || input.height != self.height {
            return Err(anyhow!(
                "input size {}x{} does not match model input {}x{}",
                input.width,
                input.height,
                self.width,
                self.height
            ));
        }

        let expected_len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("input dimensions overflow"))?;
        if input.data.len() != expected_len {
            return Err(anyhow!(
                "expected {} input samples, received {}",
                expected_len,
                input.data.len()
            ));
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let tensor = match self.layout {
            InputLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_fn((1, height, width, 3), |(_, y, x, c)| {
                    input.sample(x, y, c)
                })
                .into_tensor()
            }
            InputLayout::Nchw => {
                tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
                    input.sample(x, y, c)
                })
                .into_tensor()
            }
        };
        Ok(tensor)
    }

    fn extract_scores(&self, outputs: TVec<TValue>) -> Result<PredictionVector> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(PredictionVector::new(scores.iter().copied().collect()))
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn classify(&mut self, input: &ModelInput) -> Result<PredictionVector> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_scores(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = ModelInput {
            width: self.width,
            height: self.height,
            data: vec![0.0; self.width as usize * self.height as usize * 3],
        };
        self.classify(&blank).map(|_| ())
    }
}
