//! docket-ingest - Headless uploader
//!
//! Stages local files into a collection's upload queue, drives the
//! queue against the ingestion backend, reports progress from the event
//! bus, and exits once the queue drains. Exit status is non-zero when
//! any file was dropped or any job ended badly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docket_common::api::types::{
    CollectionId, DEFAULT_VISION_MODEL, JobState, SUPPORTED_EXTENSIONS,
};
use docket_common::config::BackendUrlResolver;
use docket_common::events::{DocketEvent, EventBus};

use docket_ingest::{HttpIngestApi, IngestConfig, IngestOrchestrator, UploadTask};

/// Command-line arguments for docket-ingest
#[derive(Parser, Debug)]
#[command(name = "docket-ingest")]
#[command(about = "Headless uploader for the docket ingestion backend")]
#[command(version)]
struct Args {
    /// Backend base URL (falls back to the config file, then the
    /// compiled default)
    #[arg(short, long, env = "DOCKET_BACKEND_URL")]
    backend_url: Option<String>,

    /// Collection to ingest into
    #[arg(short, long, env = "DOCKET_COLLECTION")]
    collection: String,

    /// Vision model to run on extracted figures
    #[arg(short = 'm', long, default_value = DEFAULT_VISION_MODEL)]
    vision_model: String,

    /// Files to upload, in submission order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docket_ingest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let backend_url = BackendUrlResolver::new().resolve(args.backend_url.as_deref());
    let collection = CollectionId::new(args.collection.clone());

    info!("Starting docket uploader");
    info!("Backend: {}", backend_url);
    info!("Collection: {}", collection);

    let tasks = stage_files(&args.files, &args.vision_model)?;
    if tasks.is_empty() {
        anyhow::bail!(
            "No uploadable files (supported: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }
    let staged = tasks.len();

    let api = Arc::new(HttpIngestApi::new(&backend_url).context("Failed to build HTTP client")?);
    let bus = EventBus::new(256);
    let mut events = bus.subscribe();

    let orchestrator = IngestOrchestrator::new(collection, api, IngestConfig::default(), bus)
        .context("Invalid ingest configuration")?;

    orchestrator.clone().enqueue(tasks).await;

    // Follow the run on the bus until the queue drains
    let mut dropped: Vec<String> = Vec::new();
    let mut failed_jobs = 0u32;

    loop {
        match events.recv().await {
            Ok(DocketEvent::StatusUpdated { status, .. }) => {
                info!(
                    state = %status.state,
                    progress = status.progress,
                    step = status.step.as_deref().unwrap_or(""),
                    "Job status"
                );
            }
            Ok(DocketEvent::UploadFailed {
                filename, reason, ..
            }) => {
                warn!(file = %filename, reason = %reason, "Upload dropped");
                dropped.push(filename);
            }
            Ok(DocketEvent::JobFinished { state, .. }) => {
                info!(state = %state, "Ingestion job finished");
                if state == JobState::Error {
                    failed_jobs += 1;
                }
            }
            Ok(DocketEvent::JobStalled { waited_secs, .. }) => {
                warn!(waited_secs, "Ingestion job stalled, gave up waiting");
                failed_jobs += 1;
            }
            Ok(DocketEvent::CacheInvalidated { key, .. }) => {
                info!(key = %key, "View invalidated");
            }
            Ok(DocketEvent::QueueDrained { .. }) => break,
            Ok(DocketEvent::TaskEnqueued { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    if dropped.is_empty() && failed_jobs == 0 {
        info!(uploaded = staged, "All uploads ingested");
        Ok(())
    } else {
        warn!(
            staged,
            dropped = dropped.len(),
            failed_jobs,
            "Finished with failures"
        );
        std::process::exit(1);
    }
}

/// Read the given paths into upload tasks, skipping files the backend
/// parser would reject.
fn stage_files(paths: &[PathBuf], vision_model: &str) -> Result<Vec<UploadTask>> {
    let mut tasks = Vec::new();

    for path in paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            warn!("Skipping {}: no file extension", path.display());
            continue;
        };

        if !SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            warn!(
                "Skipping {}: unsupported type .{} (supported: {})",
                path.display(),
                ext,
                SUPPORTED_EXTENSIONS.join(", ")
            );
            continue;
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid filename: {}", path.display()))?;

        let payload = std::fs::read(path).map_err(|e| docket_ingest::Error::InvalidFile {
            filename: filename.clone(),
            reason: e.to_string(),
        })?;

        tasks.push(UploadTask::new(
            filename,
            Bytes::from(payload),
            vision_model.to_string(),
        ));
    }

    Ok(tasks)
}
