//! Backend API seam
//!
//! The orchestrator talks to the ingestion backend only through the
//! `IngestApi` trait, so tests can script submission and polling
//! behavior without a server.

pub mod http;

use async_trait::async_trait;

use docket_common::api::types::{
    CollectionId, CollectionInfo, DocumentId, DocumentInfo, JobStatus, SubmitOutcome,
};

use crate::error::Result;
use crate::queue::UploadTask;

pub use http::{HttpIngestApi, HttpSettings};

/// Client-side view of the ingestion backend.
///
/// The backend runs at most one ingestion job per collection; all of
/// these calls are cheap except `submit_upload`, which carries the file
/// payload.
#[async_trait]
pub trait IngestApi: Send + Sync {
    /// Submit one file for ingestion into `collection`.
    ///
    /// `Accepted` means the backend took the file and started a job.
    /// `AlreadyQueued` means another job currently holds the collection
    /// and nothing was uploaded.
    async fn submit_upload(
        &self,
        collection: &CollectionId,
        task: &UploadTask,
    ) -> Result<SubmitOutcome>;

    /// Current ingestion job status for `collection`.
    async fn job_status(&self, collection: &CollectionId) -> Result<JobStatus>;

    /// Delete an ingested document and its derived artifacts.
    async fn delete_document(&self, document: &DocumentId) -> Result<()>;

    /// Ingested documents of `collection`.
    async fn list_documents(&self, collection: &CollectionId) -> Result<Vec<DocumentInfo>>;

    /// All collections known to the backend.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
}
