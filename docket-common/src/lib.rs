//! # Docket Common Library
//!
//! Shared code for the docket ingestion client including:
//! - API request/response types (job status, submit outcomes)
//! - Event types (DocketEvent enum) and the event bus
//! - Configuration loading
//! - Common error types

pub mod api;
pub mod config;
pub mod error;
pub mod events;

pub use api::types::{CollectionId, DocumentId, JobState, JobStatus, SubmitOutcome};
pub use error::{Error, Result};
pub use events::{DocketEvent, EventBus};
