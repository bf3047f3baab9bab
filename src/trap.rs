//! Detection loops.
//!
//! A `Trap` consumes one frame per cycle and decides whether to notify the
//! telemetry sink. `run` drives a trap from a `FrameSource` until the stream
//! ends or the stop flag is raised. Sink failures are logged and counted; the
//! loop carries on without retrying. Any other error ends the loop.

use anyhow::{Context, Result};
use chrono::Local;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::classify::{Classifier, ModelInput, SpeciesGate, Verdict};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::motion::{
    BoundingBox, MotionDetector, MotionOutcome, MotionSettings, SessionRecorder, Transition,
};
use crate::telemetry::{GeoPoint, TelemetrySink};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const BOX_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

/// What a cycle amounted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cycle {
    /// The frame was empty; the stream is over.
    Ended,
    /// Nothing to report (baseline refresh, skipped frame, steady status).
    Idle,
    Transition(Transition),
    Verdict(Verdict),
}

/// Counters of a finished (or running) session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrapSummary {
    pub frames: u64,
    /// Cycles that compared against the baseline or ran the model.
    pub decisions: u64,
    pub entered: u64,
    pub exited: u64,
    pub notifications: u64,
    pub failed_notifications: u64,
    pub intervals: usize,
}

pub trait Trap {
    fn name(&self) -> &'static str;

    fn step(&mut self, frame: &Frame, sink: &mut dyn TelemetrySink) -> Result<Cycle>;

    fn summary(&self) -> &TrapSummary;
}

/// Drive `trap` until end of stream or until `stop` is set.
///
/// The source must already be connected.
pub fn run(
    trap: &mut dyn Trap,
    source: &mut dyn FrameSource,
    sink: &mut dyn TelemetrySink,
    stop: &AtomicBool,
) -> Result<()> {
    let mut last_health_log = Instant::now();
    log::info!("{} trap running (sink: {})", trap.name(), sink.name());

    loop {
        if stop.load(Ordering::SeqCst) {
            log::info!("stop requested");
            break;
        }
        let Some(frame) = source.next_frame()? else {
            log::info!("end of stream");
            break;
        };
        if trap.step(&frame, sink)? == Cycle::Ended {
            log::info!("empty frame; end of stream");
            break;
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            let summary = trap.summary();
            log::info!(
                "source health={} frames={} source={} decisions={} notifications={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.source,
                summary.decisions,
                summary.notifications
            );
            last_health_log = Instant::now();
        }
    }
    Ok(())
}

fn deliver(
    sink: &mut dyn TelemetrySink,
    position: GeoPoint,
    animal: Option<&str>,
    summary: &mut TrapSummary,
) {
    match sink.notify(position, animal) {
        Ok(()) => summary.notifications += 1,
        Err(err) => {
            summary.failed_notifications += 1;
            log::warn!("telemetry via {} failed: {:#}", sink.name(), err);
        }
    }
}

/// Frame-differencing trap.
pub struct MotionTrap {
    detector: MotionDetector,
    recorder: SessionRecorder,
    position: GeoPoint,
    snapshot_dir: Option<PathBuf>,
    summary: TrapSummary,
}

impl MotionTrap {
    pub fn new(settings: &MotionSettings, position: GeoPoint) -> Self {
        Self {
            detector: MotionDetector::new(settings),
            recorder: SessionRecorder::new(),
            position,
            snapshot_dir: None,
            summary: TrapSummary::default(),
        }
    }

    /// Write an annotated still into `dir` on every entered transition.
    pub fn with_snapshots(mut self, dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        self.snapshot_dir = Some(dir);
        Ok(self)
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    /// Close an open interval and write the session export.
    pub fn finish(&mut self, export_path: &Path) -> Result<TrapSummary> {
        if let Some(at) = self.recorder.close(self.detector.last_status(), Local::now()) {
            self.summary.exited += 1;
            log::info!("session ended while present; closing interval at {}", at);
        }
        self.summary.intervals = self.recorder.export_to_path(export_path)?;
        Ok(self.summary.clone())
    }

    fn save_snapshot(&self, dir: &Path, sequence: u64, frame: &RgbImage, boxes: &[BoundingBox]) {
        let mut annotated = frame.clone();
        for bounds in boxes {
            let rect = Rect::at(bounds.x as i32, bounds.y as i32)
                .of_size(bounds.width.max(1), bounds.height.max(1));
            draw_hollow_rect_mut(&mut annotated, rect, BOX_COLOUR);
        }
        let path = dir.join(format!("entered_{}.png", sequence));
        match annotated.save(&path) {
            Ok(()) => log::debug!("snapshot written to {}", path.display()),
            Err(err) => log::warn!("failed to write snapshot {}: {}", path.display(), err),
        }
    }
}

impl Trap for MotionTrap {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn step(&mut self, frame: &Frame, sink: &mut dyn TelemetrySink) -> Result<Cycle> {
        let Some(outcome) = self.detector.process(frame.image())? else {
            return Ok(Cycle::Ended);
        };
        self.summary.frames += 1;
        let decision = match outcome {
            MotionOutcome::Baseline(_) => return Ok(Cycle::Idle),
            MotionOutcome::Decision(decision) => decision,
        };
        self.summary.decisions += 1;

        let Some(transition) = decision.transition else {
            return Ok(Cycle::Idle);
        };
        self.recorder.record(transition, frame.captured_at);
        log::info!(
            "frame {}: {}",
            frame.sequence,
            decision.assessment.status.label()
        );
        match transition {
            Transition::Entered => {
                self.summary.entered += 1;
                if let Some(dir) = &self.snapshot_dir {
                    self.save_snapshot(
                        dir,
                        frame.sequence,
                        &decision.frame.color,
                        &decision.assessment.boxes,
                    );
                }
                deliver(sink, self.position, None, &mut self.summary);
            }
            Transition::Exited => self.summary.exited += 1,
        }
        Ok(Cycle::Transition(transition))
    }

    fn summary(&self) -> &TrapSummary {
        &self.summary
    }
}

/// Model-driven trap.
pub struct ClassificationTrap {
    classifier: Box<dyn Classifier>,
    gate: SpeciesGate,
    check_rate: u64,
    position: GeoPoint,
    since_check: u64,
    summary: TrapSummary,
}

impl ClassificationTrap {
    /// Run the model on every `check_rate`-th frame (the first check is frame
    /// `check_rate`).
    pub fn new(
        classifier: Box<dyn Classifier>,
        gate: SpeciesGate,
        check_rate: u64,
        position: GeoPoint,
    ) -> Self {
        Self {
            classifier,
            gate,
            check_rate: check_rate.max(1),
            position,
            since_check: 0,
            summary: TrapSummary::default(),
        }
    }

    pub fn finish(&self) -> TrapSummary {
        self.summary.clone()
    }
}

impl Trap for ClassificationTrap {
    fn name(&self) -> &'static str {
        "classification"
    }

    fn step(&mut self, frame: &Frame, sink: &mut dyn TelemetrySink) -> Result<Cycle> {
        if frame.is_empty() {
            return Ok(Cycle::Ended);
        }
        self.summary.frames += 1;
        self.since_check += 1;
        if self.since_check < self.check_rate {
            return Ok(Cycle::Idle);
        }
        self.since_check = 0;
        self.summary.decisions += 1;

        let (width, height) = self.classifier.input_size();
        let input = ModelInput::from_frame(frame.image(), width, height);
        let prediction = self
            .classifier
            .classify(&input)
            .with_context(|| format!("classify frame {}", frame.sequence))?;
        let Some(verdict) = self.gate.evaluate(&prediction) else {
            log::warn!("frame {}: model returned no scores", frame.sequence);
            return Ok(Cycle::Idle);
        };
        log::debug!(
            "frame {}: class {} ({})",
            frame.sequence,
            verdict.index,
            verdict.species.as_deref().unwrap_or("unlabelled")
        );

        if verdict.matched {
            self.summary.entered += 1;
            log::info!("frame {}: {} detected", frame.sequence, self.gate.target());
            deliver(
                sink,
                self.position,
                verdict.species.as_deref(),
                &mut self.summary,
            );
        }
        Ok(Cycle::Verdict(verdict))
    }

    fn summary(&self) -> &TrapSummary {
        &self.summary
    }
}
