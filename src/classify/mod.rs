//! Image classification for the model-driven trap.
//!
//! A frame is resized to the model input, normalized, classified into a
//! `PredictionVector`, reduced by arg-max to a class index, mapped through
//! a `LabelTable` and checked against the target species.

mod backend;
mod backends;
mod labels;

use anyhow::{anyhow, Result};

pub use backend::{Classifier, InputLayout, ModelInput, DEFAULT_INPUT_SIZE};
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use labels::{
    LabelTable, PredictionVector, SpeciesGate, Verdict, DEFAULT_LABELS, DEFAULT_TARGET_SPECIES,
};

/// Model input geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSettings {
    pub input_width: u32,
    pub input_height: u32,
    pub layout: InputLayout,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            layout: InputLayout::Nhwc,
        }
    }
}

/// Open the classifier named by `model_path`.
///
/// `stub://<index>` yields a stub that always predicts class `index`; any
/// other path is loaded as an ONNX model (feature: backend-tract).
pub fn open_classifier(
    model_path: &str,
    settings: &ModelSettings,
    labels: &LabelTable,
) -> Result<Box<dyn Classifier>> {
    let input_size = (settings.input_width, settings.input_height);
    if let Some(class) = model_path.strip_prefix("stub://") {
        let winner: usize = class
            .trim_end_matches('/')
            .parse()
            .map_err(|_| anyhow!("stub model '{}' must name a class index", model_path))?;
        log::info!("classifier: stub always predicting class {}", winner);
        return Ok(Box::new(StubClassifier::always(
            winner,
            labels.len(),
            input_size,
        )?));
    }

    #[cfg(feature = "backend-tract")]
    {
        let mut classifier = TractClassifier::new(
            model_path,
            settings.input_width,
            settings.input_height,
            settings.layout,
        )?;
        classifier.warm_up()?;
        Ok(Box::new(classifier))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow!(
            "model inference requires the backend-tract feature"
        ))
    }
}
