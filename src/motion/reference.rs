use image::GrayImage;

/// What the manager did with the frame it was offered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceStep {
    /// No baseline existed; the frame became the first one.
    Established,
    /// The reset interval elapsed (or the frame size changed); the frame replaced the baseline.
    Refreshed,
    /// The baseline is current; the frame should be compared against it.
    Compare,
}

/// Holds the grayscale baseline that later frames are differenced against.
///
/// The baseline is replaced after `reset_interval` compared frames, so slow
/// lighting drift does not accumulate into false motion. A cycle that
/// establishes or refreshes the baseline yields no motion decision.
#[derive(Clone, Debug)]
pub struct ReferenceFrameManager {
    reference: Option<GrayImage>,
    reset_interval: u32,
    compared_since_reset: u32,
}

impl ReferenceFrameManager {
    pub fn new(reset_interval: u32) -> Self {
        Self {
            reference: None,
            reset_interval: reset_interval.max(1),
            compared_since_reset: 0,
        }
    }

    pub fn offer(&mut self, gray: &GrayImage) -> ReferenceStep {
        let step = match &self.reference {
            None => ReferenceStep::Established,
            Some(reference) if reference.dimensions() != gray.dimensions() => {
                ReferenceStep::Refreshed
            }
            Some(_) if self.compared_since_reset >= self.reset_interval => {
                ReferenceStep::Refreshed
            }
            Some(_) => ReferenceStep::Compare,
        };

        match step {
            ReferenceStep::Compare => self.compared_since_reset += 1,
            ReferenceStep::Established | ReferenceStep::Refreshed => {
                self.reference = Some(gray.clone());
                self.compared_since_reset = 0;
            }
        }
        step
    }

    pub fn reference(&self) -> Option<&GrayImage> {
        self.reference.as_ref()
    }
}
