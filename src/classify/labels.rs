use anyhow::{anyhow, Result};

/// Classes of the bundled animal model, in output order.
pub const DEFAULT_LABELS: [&str; 10] = [
    "dog",
    "horse",
    "elephant",
    "butterfly",
    "chicken",
    "cat",
    "cow",
    "sheep",
    "spider",
    "squirrel",
];

pub const DEFAULT_TARGET_SPECIES: &str = "elephant";

/// Per-class confidence scores from one inference.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionVector(Vec<f32>);

impl PredictionVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    pub fn scores(&self) -> &[f32] {
        &self.0
    }

    /// Index of the highest score. Ties go to the lowest index; NaN never wins.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &score) in self.0.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((index, score)),
            }
        }
        best.map(|(index, _)| index)
    }
}

/// Fixed mapping from model output index to species name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("label table must not be empty"));
        }
        if labels.iter().any(|label| label.trim().is_empty()) {
            return Err(anyhow!("label table contains an empty label"));
        }
        Ok(Self { labels })
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Outcome of reducing a prediction to a species.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub index: usize,
    pub species: Option<String>,
    /// True when the species is the one the trap reports.
    pub matched: bool,
}

/// Decides whether a prediction names the target species.
#[derive(Clone, Debug)]
pub struct SpeciesGate {
    table: LabelTable,
    target: String,
}

impl SpeciesGate {
    pub fn new(table: LabelTable, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        if !table.contains(&target) {
            return Err(anyhow!(
                "target species '{}' is not in the label table",
                target
            ));
        }
        Ok(Self { table, target })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn evaluate(&self, prediction: &PredictionVector) -> Option<Verdict> {
        let index = prediction.argmax()?;
        let species = self.table.label(index).map(str::to_string);
        let matched = species.as_deref() == Some(self.target.as_str());
        Some(Verdict {
            index,
            species,
            matched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELEPHANT_SCORES: [f32; 10] = [0.1, 0.05, 0.7, 0.05, 0.02, 0.03, 0.02, 0.01, 0.01, 0.01];

    fn gate() -> SpeciesGate {
        SpeciesGate::new(LabelTable::default(), DEFAULT_TARGET_SPECIES).expect("gate")
    }

    #[test]
    fn elephant_prediction_matches() {
        let verdict = gate()
            .evaluate(&PredictionVector::new(ELEPHANT_SCORES.to_vec()))
            .expect("verdict");
        assert_eq!(verdict.index, 2);
        assert_eq!(verdict.species.as_deref(), Some("elephant"));
        assert!(verdict.matched);
    }

    #[test]
    fn other_species_do_not_match() {
        let gate = gate();
        for winner in (0..10).filter(|i| *i != 2) {
            let mut scores = vec![0.01f32; 10];
            scores[winner] = 0.9;
            let verdict = gate
                .evaluate(&PredictionVector::new(scores))
                .expect("verdict");
            assert_eq!(verdict.index, winner);
            assert!(!verdict.matched, "class {} must not match", winner);
        }
    }

    #[test]
    fn argmax_prefers_first_of_ties_and_skips_nan() {
        assert_eq!(PredictionVector::new(vec![0.5, 0.5]).argmax(), Some(0));
        assert_eq!(PredictionVector::new(vec![f32::NAN, 0.2]).argmax(), Some(1));
        assert_eq!(PredictionVector::new(vec![]).argmax(), None);
    }

    #[test]
    fn out_of_table_index_has_no_species() {
        let verdict = gate()
            .evaluate(&PredictionVector::new(vec![0.0; 11].into_iter().chain([1.0]).collect()))
            .expect("verdict");
        assert_eq!(verdict.index, 11);
        assert_eq!(verdict.species, None);
        assert!(!verdict.matched);
    }

    #[test]
    fn target_must_be_known() {
        assert!(SpeciesGate::new(LabelTable::default(), "zebra").is_err());
        assert!(LabelTable::new(vec![]).is_err());
    }
}
