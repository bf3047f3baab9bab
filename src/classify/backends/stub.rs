use anyhow::{anyhow, Result};

use crate::classify::backend::{Classifier, ModelInput};
use crate::classify::labels::PredictionVector;

/// Stub classifier for testing and dry runs.
///
/// Replays a fixed list of predictions, cycling when it runs out.
pub struct StubClassifier {
    predictions: Vec<PredictionVector>,
    next: usize,
    input_size: (u32, u32),
}

impl StubClassifier {
    pub fn new(predictions: Vec<PredictionVector>, input_size: (u32, u32)) -> Result<Self> {
        if predictions.is_empty() {
            return Err(anyhow!("stub classifier needs at least one prediction"));
        }
        Ok(Self {
            predictions,
            next: 0,
            input_size,
        })
    }

    /// A classifier that always puts its full confidence on `winner`.
    pub fn always(winner: usize, classes: usize, input_size: (u32, u32)) -> Result<Self> {
        if winner >= classes {
            return Err(anyhow!(
                "stub class {} is outside a {}-class table",
                winner,
                classes
            ));
        }
        let mut scores = vec![0.0f32; classes];
        scores[winner] = 1.0;
        Self::new(vec![PredictionVector::new(scores)], input_size)
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn classify(&mut self, input: &ModelInput) -> Result<PredictionVector> {
        if (input.width, input.height) != self.input_size {
            return Err(anyhow!(
                "input {}x{} does not match stub model input {}x{}",
                input.width,
                input.height,
                self.input_size.0,
                self.input_size.1
            ));
        }
        let prediction = self.predictions[self.next].clone();
        self.next = (self.next + 1) % self.predictions.len();
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ModelInput {
        ModelInput {
            width: 2,
            height: 2,
            data: vec![0.0; 12],
        }
    }

    #[test]
    fn stub_cycles_predictions() -> Result<()> {
        let mut stub = StubClassifier::new(
            vec![
                PredictionVector::new(vec![1.0, 0.0]),
                PredictionVector::new(vec![0.0, 1.0]),
            ],
            (2, 2),
        )?;
        assert_eq!(stub.classify(&input())?.argmax(), Some(0));
        assert_eq!(stub.classify(&input())?.argmax(), Some(1));
        assert_eq!(stub.classify(&input())?.argmax(), Some(0));
        Ok(())
    }

    #[test]
    fn always_rejects_unknown_class() {
        assert!(StubClassifier::always(10, 10, (2, 2)).is_err());
        assert!(StubClassifier::always(2, 10, (2, 2)).is_ok());
    }
}
