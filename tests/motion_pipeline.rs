use anyhow::Result;
use std::sync::atomic::AtomicBool;

use camera_trap::{
    open_source, run, GeoPoint, MotionSettings, MotionTrap, SourceSettings, TelemetrySink, Trap,
};

#[derive(Default)]
struct RecordingSink {
    notified: Vec<(GeoPoint, Option<String>)>,
}

impl TelemetrySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&mut self, position: GeoPoint, animal: Option<&str>) -> Result<()> {
        self.notified.push((position, animal.map(str::to_string)));
        Ok(())
    }
}

fn yard() -> GeoPoint {
    GeoPoint::new(36.2833, -18.8333).unwrap()
}

fn default_settings() -> MotionSettings {
    MotionSettings {
        frame_width: 500,
        reference_frame_reset: 100,
        object_size: 500.0,
    }
}

#[test]
fn animal_crossing_yields_one_alert_and_one_interval() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let export = dir.path().join("Times.csv");

    let mut source = open_source(
        Some("stub://yard?frames=120&enter=30&leave=60"),
        &SourceSettings::default(),
    )?;
    source.connect()?;
    let mut trap = MotionTrap::new(&default_settings(), yard());
    let mut sink = RecordingSink::default();
    run(&mut trap, source.as_mut(), &mut sink, &AtomicBool::new(false))?;

    assert_eq!(sink.notified.len(), 1);
    assert_eq!(sink.notified[0], (yard(), None));
    assert_eq!(trap.summary().frames, 120);

    let summary = trap.finish(&export)?;
    assert_eq!((summary.entered, summary.exited), (1, 1));
    assert_eq!(summary.intervals, 1);

    let exported = std::fs::read_to_string(&export)?;
    let lines: Vec<&str> = exported.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], ",Start,End");
    assert!(lines[1].starts_with("0,"));
    Ok(())
}

#[test]
fn stream_ending_mid_visit_still_closes_the_interval() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let export = dir.path().join("Times.csv");

    let mut source = open_source(
        Some("stub://yard?frames=50&enter=30&leave=60"),
        &SourceSettings::default(),
    )?;
    source.connect()?;
    let mut trap = MotionTrap::new(&default_settings(), yard());
    let mut sink = RecordingSink::default();
    run(&mut trap, source.as_mut(), &mut sink, &AtomicBool::new(false))?;

    assert_eq!(sink.notified.len(), 1);
    assert_eq!(trap.recorder().events().len(), 1);

    let summary = trap.finish(&export)?;
    assert_eq!(summary.exited, 1);
    assert_eq!(summary.intervals, 1);
    let events = trap.recorder().events();
    assert!(events[1] > events[0]);
    Ok(())
}

#[test]
fn quiet_scene_exports_header_only() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let export = dir.path().join("Times.csv");

    let mut source = open_source(
        Some("stub://empty?frames=40&enter=40&leave=40"),
        &SourceSettings::default(),
    )?;
    source.connect()?;
    let mut trap = MotionTrap::new(&default_settings(), yard());
    let mut sink = RecordingSink::default();
    run(&mut trap, source.as_mut(), &mut sink, &AtomicBool::new(false))?;

    assert!(sink.notified.is_empty());
    let summary = trap.finish(&export)?;
    assert_eq!(summary.intervals, 0);
    assert_eq!(std::fs::read_to_string(&export)?.trim(), ",Start,End");
    Ok(())
}
