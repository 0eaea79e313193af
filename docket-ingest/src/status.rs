//! Latest-observation cache of per-collection job status
//!
//! Written optimistically at submission time and overwritten by every
//! poll result, so observers never render a blank state in the window
//! between the user's action and the first poll response.

use std::collections::HashMap;

use tokio::sync::RwLock;

use docket_common::api::types::{CollectionId, JobDetails, JobState, JobStatus};

/// Most recent job status per collection. Each write replaces the
/// previous observation; there is no history.
#[derive(Debug, Default)]
pub struct StatusCache {
    inner: RwLock<HashMap<CollectionId, JobStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Record a status observation.
    pub async fn record(&self, collection: &CollectionId, status: JobStatus) {
        self.inner.write().await.insert(collection.clone(), status);
    }

    /// Write the synthetic record shown while `filename` is being
    /// submitted, before the backend has reported anything.
    pub async fn record_optimistic(&self, collection: &CollectionId, filename: &str) -> JobStatus {
        let status = JobStatus {
            state: JobState::Parsing,
            stage: Some("parsing".to_string()),
            step: Some(format!("Initializing upload for {}", filename)),
            progress: 0.0,
            details: Some(JobDetails {
                current_file: Some(filename.to_string()),
                logs: None,
            }),
        };
        self.record(collection, status.clone()).await;
        status
    }

    /// Latest observation for a collection, if any was ever recorded.
    pub async fn get(&self, collection: &CollectionId) -> Option<JobStatus> {
        self.inner.read().await.get(collection).cloned()
    }
}
