//! video_indexer - index a stored clip and report confident labels.
//!
//! 1. Downloads the clip from Azure Blob Storage
//! 2. Uploads it to Video Indexer and waits for processing
//! 3. Prints labels whose instances exceed the confidence threshold as JSON

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use camera_trap::indexer::{filter_labels, BlobClient, VideoIndexerClient};
use camera_trap::ui::{Ui, UiMode};
use camera_trap::IndexerConfig;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Index a stored clip with Video Indexer and filter labels by confidence"
)]
struct Args {
    /// Configuration file (JSON, or TOML by extension).
    #[arg(long, env = "VIDEO_INDEXER_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Progress display.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal() && args.output.is_none(),
    );

    let config = IndexerConfig::load(&args.config)?;
    log::info!(
        "blob storage: account {}, container {}",
        config.storage_account_name,
        config.storage_container_name
    );

    let clip = {
        let stage = ui.stage("Download clip from blob storage");
        let blobs = BlobClient::new(&config.storage_account_name, &config.storage_account_key);
        let clip = blobs.download(&config.storage_container_name, &config.file_name)?;
        stage.update(&format!("{} bytes", clip.len()));
        stage.complete();
        clip
    };

    let indexer = VideoIndexerClient::new(
        &config.video_indexer_api_region,
        &config.video_indexer_account_id,
        &config.video_indexer_api_key,
    );
    let token = {
        let stage = ui.stage("Authorize with Video Indexer");
        let token = indexer.access_token()?;
        stage.complete();
        token
    };

    let video_id = {
        let stage = ui.stage(&format!("Upload {}", config.file_name));
        let id = indexer.upload(&token, &config.file_name, &clip)?;
        stage.update(&format!("video id {}", id));
        stage.complete();
        id
    };
    drop(clip);

    let index = {
        let stage = ui.stage("Wait for indexing");
        let index = indexer.wait_for_index(
            &token,
            &video_id,
            Duration::from_secs(config.poll_interval_secs),
            |state| stage.update(state),
        )?;
        stage.complete();
        index
    };

    let labels = filter_labels(&index, config.confidence_threshold)?;
    let report = serde_json::to_string_pretty(&labels)?;
    match &args.output {
        Some(path) => std::fs::write(path, report + "\n")
            .with_context(|| format!("failed to write report {}", path.display()))?,
        None => println!("{}", report),
    }
    Ok(())
}
