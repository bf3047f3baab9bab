//! camera_trap - camera trap simulator
//!
//! Without a model the motion pipeline runs, on the live device or on the
//! given video. With a model every `model_check_rate`-th frame is
//! classified instead. Detections are sent to the configured telemetry sink;
//! the motion pipeline writes its entry/exit intervals on exit.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camera_trap::{
    open_classifier, open_sink, open_source, run, select_mode, ClassificationTrap, GeoPoint,
    MotionTrap, TrapConfig, TrapMode, TrapSummary,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Simulate a camera trap: detect animals and send geotagged alerts"
)]
struct Args {
    /// Video file, image directory, stream URL or stub:// scene (live device when absent).
    #[arg(short = 'v', long)]
    video: Option<String>,

    /// Classification model (ONNX); selects the classification pipeline.
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Configuration file (JSON, or TOML by extension).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mode = select_mode(args.video.as_deref(), args.model.as_deref())?;
    let config = TrapConfig::load(args.config.as_deref())?;
    let position = config.position()?;
    log::info!(
        "camera_trap: {} pipeline at ({}, {})",
        mode.name(),
        position.longitude,
        position.latitude
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .expect("error setting Ctrl-C handler");
    }

    match &mode {
        TrapMode::Motion { video } => run_motion(&config, video.as_deref(), position, &stop),
        TrapMode::Classification { model, video } => {
            run_classification(&config, model, video.as_deref(), position, &stop)
        }
    }
}

fn run_motion(
    config: &TrapConfig,
    video: Option<&str>,
    position: GeoPoint,
    stop: &AtomicBool,
) -> Result<()> {
    let mut trap = MotionTrap::new(&config.motion_settings(), position);
    if let Some(dir) = &config.snapshot_dir {
        trap = trap.with_snapshots(dir.clone())?;
    }
    let mut sink = open_sink(&config.telemetry_settings())?;
    let mut source = open_source(video, &config.source)?;
    source.connect()?;

    let outcome = run(&mut trap, source.as_mut(), sink.as_mut(), stop);
    drop(source);

    let exported = trap.finish(&config.export_path);
    if let Err(err) = sink.shutdown() {
        log::warn!("telemetry shutdown failed: {:#}", err);
    }
    if let (Err(_), Err(export_err)) = (&outcome, &exported) {
        log::error!("session export failed: {:#}", export_err);
    }
    outcome?;
    log_summary(&exported?);
    Ok(())
}

fn run_classification(
    config: &TrapConfig,
    model: &str,
    video: Option<&str>,
    position: GeoPoint,
    stop: &AtomicBool,
) -> Result<()> {
    let labels = config.label_table()?;
    let classifier = open_classifier(model, &config.model, &labels)?;
    let mut trap = ClassificationTrap::new(
        classifier,
        config.species_gate()?,
        config.model_check_rate,
        position,
    );
    let mut sink = open_sink(&config.telemetry_settings())?;
    let mut source = open_source(video, &config.source)?;
    source.connect()?;

    let outcome = run(&mut trap, source.as_mut(), sink.as_mut(), stop);
    drop(source);

    if let Err(err) = sink.shutdown() {
        log::warn!("telemetry shutdown failed: {:#}", err);
    }
    outcome?;
    log_summary(&trap.finish());
    Ok(())
}

fn log_summary(summary: &TrapSummary) {
    log::info!(
        "session: frames={} decisions={} entered={} exited={} notified={} failed={} intervals={}",
        summary.frames,
        summary.decisions,
        summary.entered,
        summary.exited,
        summary.notifications,
        summary.failed_notifications,
        summary.intervals
    );
}
