//! docket-ingest library interface
//!
//! Client-side ingestion queue orchestration for a document backend
//! that runs at most one ingestion job per collection at a time: the
//! upload queue, the single-flight submission latch, the polling
//! completion watcher, and the HTTP adapter they drive.

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod status;

pub use client::{HttpIngestApi, HttpSettings, IngestApi};
pub use config::{BusyRetryPolicy, IngestConfig};
pub use error::{Error, Result};
pub use orchestrator::{IngestOrchestrator, JobTicket};
pub use queue::{SubmitGuard, UploadQueue, UploadTask};
pub use status::StatusCache;
