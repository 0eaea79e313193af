//! Ingestion queue orchestrator
//!
//! Sequences user file uploads against a backend that runs at most one
//! ingestion job per collection at a time. Local queue state and the
//! remote job (observed only through polling) can desynchronize; the
//! orchestrator reconciles the two and keeps the queue draining.
//!
//! One orchestrator instance is scoped to one collection. Submission
//! rules, per pass through `drive`:
//! - head accepted: mark the job active, resolve the head, watch the
//!   job to completion
//! - backend answers `already_queued`: keep the head, adopt the remote
//!   job as the active one and watch it; the head retries after it ends
//! - submission error or timeout: drop the head, report it, continue
//!   with the next file so one bad file never blocks the batch

pub mod watcher;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use docket_common::api::types::{CollectionId, JobStatus, SubmitOutcome};
use docket_common::events::{DocketEvent, EventBus};

use crate::client::IngestApi;
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::queue::{SubmitGuard, UploadQueue, UploadTask};
use crate::status::StatusCache;

/// Marker for the ingestion job currently being watched.
///
/// Minted locally when a submission is accepted, or when an
/// `already_queued` answer reveals a job this client did not start.
/// The id exists only for exactly-once completion handling; the backend
/// never sees it.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl JobTicket {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

/// Per-collection upload queue orchestrator.
///
/// Owns the queue, the single-flight latch, the active-job marker and
/// the status cache; publishes everything observers need on the
/// [`EventBus`]. All entry points are safe to invoke redundantly.
pub struct IngestOrchestrator {
    pub(crate) collection: CollectionId,
    pub(crate) api: Arc<dyn IngestApi>,
    pub(crate) config: IngestConfig,
    pub(crate) bus: EventBus,
    pub(crate) queue: UploadQueue,
    pub(crate) guard: SubmitGuard,
    pub(crate) status: StatusCache,
    /// Some while a submitted or adopted job is outstanding; cleared by
    /// the watcher once the job concludes. Clearing is the sole signal
    /// that the queue may submit again.
    pub(crate) active_job: RwLock<Option<JobTicket>>,
    /// Ticket id whose terminal handling already ran, so invalidations
    /// fire exactly once per job
    pub(crate) completion_guard: RwLock<Option<Uuid>>,
    /// Consecutive `already_queued` answers for the current head
    busy_attempts: AtomicU32,
}

impl IngestOrchestrator {
    pub fn new(
        collection: CollectionId,
        api: Arc<dyn IngestApi>,
        config: IngestConfig,
        bus: EventBus,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            collection,
            api,
            config,
            bus,
            queue: UploadQueue::new(),
            guard: SubmitGuard::new(),
            status: StatusCache::new(),
            active_job: RwLock::new(None),
            completion_guard: RwLock::new(None),
            busy_attempts: AtomicU32::new(0),
        }))
    }

    pub fn collection(&self) -> &CollectionId {
        &self.collection
    }

    /// Bus carrying queue, status and invalidation events.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Job currently being watched, if any.
    pub async fn active_job(&self) -> Option<JobTicket> {
        self.active_job.read().await.clone()
    }

    /// Latest status observation for this collection (optimistic record
    /// or poll result).
    pub async fn latest_status(&self) -> Option<JobStatus> {
        self.status.get(&self.collection).await
    }

    /// True when nothing is staged and no job is outstanding.
    pub async fn is_drained(&self) -> bool {
        self.queue.is_empty().await && self.active_job.read().await.is_none()
    }

    /// Stage a batch of files and start driving the queue.
    ///
    /// Returns the queue length after the append. Submission happens on
    /// a background task; progress and failures arrive on the bus.
    pub async fn enqueue(self: Arc<Self>, tasks: Vec<UploadTask>) -> usize {
        if tasks.is_empty() {
            return self.queue.len().await;
        }

        let filenames: Vec<String> = tasks.iter().map(|t| t.filename.clone()).collect();
        let queue_len = self.queue.enqueue(tasks).await;

        tracing::info!(
            collection = %self.collection,
            staged = filenames.len(),
            queue_len,
            "Files staged for upload"
        );

        self.bus.emit_lossy(DocketEvent::TaskEnqueued {
            collection: self.collection.clone(),
            filenames,
            queue_len,
            timestamp: Utc::now(),
        });

        tokio::spawn(self.clone().drive());
        queue_len
    }

    /// Drive the submission state machine.
    ///
    /// Safe to invoke redundantly: returns without effect while a
    /// submission pass is in flight, a job is outstanding, or nothing
    /// is staged. Otherwise runs until a submission is accepted, the
    /// collection turns out to be busy, or the queue empties.
    pub async fn drive(self: Arc<Self>) {
        loop {
            let Some(permit) = self.guard.try_enter() else {
                return;
            };

            // The marker is checked only while holding the permit. An
            // accepting pass sets the marker before its permit drops,
            // so a redundant drive that enters here afterwards always
            // sees it and backs off instead of submitting early.
            if self.active_job.read().await.is_some() {
                // The watcher re-drives once the job concludes
                return;
            }

            let Some(task) = self.queue.peek_head().await else {
                tracing::debug!(collection = %self.collection, "Upload queue drained");
                self.bus.emit_lossy(DocketEvent::QueueDrained {
                    collection: self.collection.clone(),
                    timestamp: Utc::now(),
                });
                return;
            };

            // Resubmission of a head the backend answered busy for
            // waits out the policy's backoff first.
            let prior_busy = self.busy_attempts.load(Ordering::Acquire);
            if prior_busy > 0 {
                tokio::time::sleep(self.config.busy_retry.backoff(prior_busy)).await;
            }

            // Observers see a submission record before the first poll
            // can possibly land.
            let optimistic = self
                .status
                .record_optimistic(&self.collection, &task.filename)
                .await;
            self.bus.emit_lossy(DocketEvent::StatusUpdated {
                collection: self.collection.clone(),
                status: optimistic,
                timestamp: Utc::now(),
            });

            let outcome = tokio::time::timeout(
                self.config.submit_timeout(),
                self.api.submit_upload(&self.collection, &task),
            )
            .await
            .map_err(|_| Error::Timeout(self.config.submit_timeout()))
            .and_then(|result| result);

            match outcome {
                Ok(SubmitOutcome::Accepted) => {
                    self.busy_attempts.store(0, Ordering::Release);
                    let ticket = JobTicket::new();

                    tracing::info!(
                        collection = %self.collection,
                        file = %task.filename,
                        job = %ticket.id,
                        "Upload accepted, job started"
                    );

                    *self.active_job.write().await = Some(ticket.clone());
                    self.queue.resolve_head().await;

                    drop(permit);
                    watcher::spawn(self.clone(), ticket);
                    return;
                }

                Ok(SubmitOutcome::AlreadyQueued) => {
                    let attempts = self.busy_attempts.fetch_add(1, Ordering::AcqRel) + 1;

                    if attempts >= self.config.busy_retry.max_attempts {
                        // The collection has been busy across every
                        // allowed attempt; give this file up and move on.
                        self.busy_attempts.store(0, Ordering::Release);
                        self.queue.resolve_head().await;

                        tracing::warn!(
                            collection = %self.collection,
                            file = %task.filename,
                            attempts,
                            "Collection still busy after final attempt, dropping file"
                        );
                        self.bus.emit_lossy(DocketEvent::UploadFailed {
                            collection: self.collection.clone(),
                            filename: task.filename.clone(),
                            reason: format!(
                                "collection busy after {} submission attempts",
                                attempts
                            ),
                            timestamp: Utc::now(),
                        });

                        continue;
                    }

                    // A job is in fact running remotely. Keep the head
                    // where it is, adopt the job, and resubmit once it
                    // ends.
                    let ticket = JobTicket::new();

                    tracing::info!(
                        collection = %self.collection,
                        file = %task.filename,
                        attempt = attempts,
                        job = %ticket.id,
                        "Collection busy, watching remote job before retrying"
                    );

                    *self.active_job.write().await = Some(ticket.clone());

                    drop(permit);
                    watcher::spawn(self.clone(), ticket);
                    return;
                }

                Err(e) => {
                    // Fail fast: this file is done for, the rest of the
                    // batch keeps going.
                    self.busy_attempts.store(0, Ordering::Release);
                    self.queue.resolve_head().await;

                    tracing::warn!(
                        collection = %self.collection,
                        file = %task.filename,
                        error = %e,
                        "Upload failed (non-fatal, continuing with next file)"
                    );
                    self.bus.emit_lossy(DocketEvent::UploadFailed {
                        collection: self.collection.clone(),
                        filename: task.filename.clone(),
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });

                    continue;
                }
            }
        }
    }
}
