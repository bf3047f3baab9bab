//! Frame-differencing motion detection.
//!
//! Per frame the detector runs:
//! 1. `preprocess`: resize, grayscale, blur
//! 2. `reference`: establish or refresh the baseline, or let the frame through
//! 3. `difference`: delta frame, threshold mask, dilation, external contours
//! 4. `tracker`: size filter, per-frame status, transition detection
//!
//! `session` records the transitions and exports them as intervals.

pub mod difference;
pub mod preprocess;
pub mod reference;
pub mod session;
pub mod tracker;

use anyhow::Result;
use image::RgbImage;

pub use difference::{BoundingBox, Difference, DifferenceExtractor, Region};
pub use preprocess::{Preprocessed, Preprocessor, DEFAULT_FRAME_WIDTH};
pub use reference::{ReferenceFrameManager, ReferenceStep};
pub use session::{DetectionInterval, SessionRecorder, Timestamp};
pub use tracker::{assess, FrameAssessment, MotionStatus, StatusHistory, Transition};

/// Tunables of the motion detector.
#[derive(Clone, Debug)]
pub struct MotionSettings {
    pub frame_width: u32,
    /// Compared frames between baseline refreshes.
    pub reference_frame_reset: u32,
    /// Minimum contour area for a region to count as an object.
    pub object_size: f64,
}

/// Result of a cycle that was compared against the baseline.
pub struct MotionDecision {
    pub frame: Preprocessed,
    pub difference: Difference,
    pub assessment: FrameAssessment,
    pub transition: Option<Transition>,
}

pub enum MotionOutcome {
    /// The cycle only (re)established the baseline.
    Baseline(ReferenceStep),
    Decision(MotionDecision),
}

pub struct MotionDetector {
    preprocessor: Preprocessor,
    reference: ReferenceFrameManager,
    extractor: DifferenceExtractor,
    history: StatusHistory,
    object_size: f64,
}

impl MotionDetector {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            preprocessor: Preprocessor::new(settings.frame_width),
            reference: ReferenceFrameManager::new(settings.reference_frame_reset),
            extractor: DifferenceExtractor::default(),
            history: StatusHistory::new(),
            object_size: settings.object_size,
        }
    }

    /// Process one frame. `Ok(None)` means the frame was empty (end of stream).
    pub fn process(&mut self, frame: &RgbImage) -> Result<Option<MotionOutcome>> {
        let Some(prepared) = self.preprocessor.process(frame) else {
            return Ok(None);
        };

        let step = self.reference.offer(&prepared.gray);
        if step != ReferenceStep::Compare {
            log::debug!("motion: baseline {:?}", step);
            return Ok(Some(MotionOutcome::Baseline(step)));
        }

        let Some(reference) = self.reference.reference() else {
            return Ok(Some(MotionOutcome::Baseline(step)));
        };
        let difference = self.extractor.extract(reference, &prepared.gray)?;
        let assessment = assess(&difference.regions, self.object_size);
        let transition = self.history.push(assessment.status);
        log::trace!(
            "motion: {} regions, {} qualifying, status={:?}",
            difference.regions.len(),
            assessment.boxes.len(),
            assessment.status
        );

        Ok(Some(MotionOutcome::Decision(MotionDecision {
            frame: prepared,
            difference,
            assessment,
            transition,
        })))
    }

    /// Status of the most recent decision, if any.
    pub fn last_status(&self) -> Option<MotionStatus> {
        self.history.current()
    }
}
