use super::difference::{BoundingBox, Region};

/// Per-frame motion status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionStatus {
    Absent,
    Present,
}

impl MotionStatus {
    /// Overlay text for the status.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "No Movement Detected",
            Self::Present => "Motion Detected",
        }
    }
}

/// A change of status between two consecutive decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Exited,
}

/// Aggregate status of one frame plus the boxes that justified it.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAssessment {
    pub status: MotionStatus,
    pub boxes: Vec<BoundingBox>,
}

/// Discard regions smaller than `min_area`; any survivor marks the frame present.
///
/// The number of surviving regions does not matter, only whether there is one.
pub fn assess(regions: &[Region], min_area: f64) -> FrameAssessment {
    let boxes: Vec<BoundingBox> = regions
        .iter()
        .filter(|region| region.area >= min_area)
        .map(|region| region.bounds)
        .collect();
    let status = if boxes.is_empty() {
        MotionStatus::Absent
    } else {
        MotionStatus::Present
    };
    FrameAssessment { status, boxes }
}

/// The two most recent statuses.
///
/// The baseline frame is the empty scene, so before the first push the older
/// slot reads as absent: a subject already in view on the first decision is
/// an entry. Entries and exits therefore always alternate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusHistory {
    previous: Option<MotionStatus>,
    current: Option<MotionStatus>,
}

impl StatusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: MotionStatus) -> Option<Transition> {
        self.previous = self.current.replace(status);
        match (self.previous.unwrap_or(MotionStatus::Absent), status) {
            (MotionStatus::Absent, MotionStatus::Present) => Some(Transition::Entered),
            (MotionStatus::Present, MotionStatus::Absent) => Some(Transition::Exited),
            _ => None,
        }
    }

    pub fn previous(&self) -> Option<MotionStatus> {
        self.previous
    }

    pub fn current(&self) -> Option<MotionStatus> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(area: f64) -> Region {
        Region {
            bounds: BoundingBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            },
            area,
        }
    }

    #[test]
    fn regions_below_min_area_are_ignored() {
        let assessment = assess(&[region(10.0), region(499.0)], 500.0);
        assert_eq!(assessment.status, MotionStatus::Absent);
        assert!(assessment.boxes.is_empty());
    }

    #[test]
    fn several_qualifying_regions_give_one_present_status() {
        let assessment = assess(&[region(600.0), region(10.0), region(900.0)], 500.0);
        assert_eq!(assessment.status, MotionStatus::Present);
        assert_eq!(assessment.boxes.len(), 2);
    }

    #[test]
    fn absent_then_present_is_entered() {
        let mut history = StatusHistory::new();
        assert_eq!(history.push(MotionStatus::Absent), None);
        assert_eq!(history.push(MotionStatus::Present), Some(Transition::Entered));
        assert_eq!(history.push(MotionStatus::Present), None);
    }

    #[test]
    fn present_then_absent_is_exited() {
        let mut history = StatusHistory::new();
        history.push(MotionStatus::Present);
        assert_eq!(history.push(MotionStatus::Absent), Some(Transition::Exited));
        assert_eq!(history.previous(), Some(MotionStatus::Present));
        assert_eq!(history.current(), Some(MotionStatus::Absent));
    }

    #[test]
    fn present_on_first_decision_is_entered() {
        let mut history = StatusHistory::new();
        assert_eq!(history.push(MotionStatus::Present), Some(Transition::Entered));
        assert_eq!(history.push(MotionStatus::Absent), Some(Transition::Exited));
    }

    #[test]
    fn absent_on_first_decision_is_quiet() {
        let mut history = StatusHistory::new();
        assert_eq!(history.push(MotionStatus::Absent), None);
        assert_eq!(history.previous(), None);
    }
}
