//! Orchestrator state machine tests
//!
//! Drives the upload queue against a scripted in-memory backend under
//! paused tokio time, covering submission ordering, single-flight
//! exclusion, busy retries, completion handling, stall detection and
//! failure recovery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use docket_common::api::types::{
    CollectionId, CollectionInfo, DocumentId, DocumentInfo, JobState, JobStatus, SubmitOutcome,
};
use docket_common::events::{CacheKey, DocketEvent, EventBus};
use docket_ingest::client::IngestApi;
use docket_ingest::error::{Error, Result as IngestResult};
use docket_ingest::{BusyRetryPolicy, IngestConfig, IngestOrchestrator, UploadTask};

/// One scripted answer for a submit call.
enum FakeSubmit {
    /// Accept the upload and start a job that climbs `rungs` (one per
    /// poll) and then reports `final_state` forever
    Accept {
        rungs: Vec<JobState>,
        final_state: JobState,
    },
    /// Answer `already_queued` and install a short foreign job the
    /// watcher can observe to completion
    Busy,
    /// Fail the submission outright
    Fail(String),
}

fn accept() -> FakeSubmit {
    FakeSubmit::Accept {
        rungs: vec![JobState::Processing],
        final_state: JobState::Completed,
    }
}

fn accept_with(rungs: Vec<JobState>, final_state: JobState) -> FakeSubmit {
    FakeSubmit::Accept { rungs, final_state }
}

/// The job a poll observes: remaining ladder rungs, then the final
/// state repeated forever.
struct FakeJob {
    rungs: VecDeque<JobState>,
    final_state: JobState,
}

/// Scripted in-memory backend. Submit answers come from a script (and
/// default to plain acceptance once it runs dry); polls walk the
/// current job's status ladder.
struct FakeBackend {
    submit_script: Mutex<VecDeque<FakeSubmit>>,
    job: Mutex<Option<FakeJob>>,
    /// Filenames in the order the backend received them
    submissions: Mutex<Vec<String>>,
    polls: Mutex<u32>,
    /// Number of leading polls to fail with a transport-style error
    failing_polls: Mutex<u32>,
}

impl FakeBackend {
    fn new(script: Vec<FakeSubmit>) -> Arc<Self> {
        Arc::new(Self {
            submit_script: Mutex::new(script.into()),
            job: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
            polls: Mutex::new(0),
            failing_polls: Mutex::new(0),
        })
    }

    fn with_failing_polls(self: Arc<Self>, count: u32) -> Arc<Self> {
        *self.failing_polls.lock().unwrap() = count;
        self
    }

    fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    fn poll_count(&self) -> u32 {
        *self.polls.lock().unwrap()
    }
}

fn status_of(state: JobState) -> JobStatus {
    JobStatus {
        state,
        stage: None,
        step: None,
        progress: if state.is_terminal() { 100.0 } else { 50.0 },
        details: None,
    }
}

#[async_trait]
impl IngestApi for FakeBackend {
    async fn submit_upload(
        &self,
        _collection: &CollectionId,
        task: &UploadTask,
    ) -> IngestResult<SubmitOutcome> {
        self.submissions
            .lock()
            .unwrap()
            .push(task.filename.clone());

        let answer = self
            .submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(accept);

        match answer {
            FakeSubmit::Accept { rungs, final_state } => {
                *self.job.lock().unwrap() = Some(FakeJob {
                    rungs: rungs.into(),
                    final_state,
                });
                Ok(SubmitOutcome::Accepted)
            }
            FakeSubmit::Busy => {
                // A foreign job really is running; let the watcher see
                // it finish.
                *self.job.lock().unwrap() = Some(FakeJob {
                    rungs: VecDeque::from(vec![JobState::Processing]),
                    final_state: JobState::Completed,
                });
                Ok(SubmitOutcome::AlreadyQueued)
            }
            FakeSubmit::Fail(reason) => Err(Error::Api {
                status: 500,
                message: reason,
            }),
        }
    }

    async fn job_status(&self, _collection: &CollectionId) -> IngestResult<JobStatus> {
        *self.polls.lock().unwrap() += 1;

        {
            let mut failing = self.failing_polls.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Api {
                    status: 503,
                    message: "status endpoint unavailable".to_string(),
                });
            }
        }

        let mut job = self.job.lock().unwrap();
        match job.as_mut() {
            Some(j) => match j.rungs.pop_front() {
                Some(state) => Ok(status_of(state)),
                None => Ok(status_of(j.final_state)),
            },
            None => Ok(JobStatus::idle()),
        }
    }

    async fn delete_document(&self, _document: &DocumentId) -> IngestResult<()> {
        Ok(())
    }

    async fn list_documents(&self, _collection: &CollectionId) -> IngestResult<Vec<DocumentInfo>> {
        Ok(Vec::new())
    }

    async fn list_collections(&self) -> IngestResult<Vec<CollectionInfo>> {
        Ok(Vec::new())
    }
}

fn test_config() -> IngestConfig {
    IngestConfig {
        poll_interval_ms: 1_000,
        completion_grace_ms: 500,
        submit_timeout_ms: 5_000,
        status_timeout_ms: 2_000,
        job_deadline_ms: 60_000,
        busy_retry: BusyRetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        },
    }
}

fn setup(
    api: Arc<FakeBackend>,
    config: IngestConfig,
) -> (Arc<IngestOrchestrator>, broadcast::Receiver<DocketEvent>) {
    let bus = EventBus::new(1024);
    let rx = bus.subscribe();
    let orchestrator =
        IngestOrchestrator::new(CollectionId::new("c1"), api, config, bus).unwrap();
    (orchestrator, rx)
}

fn task(name: &str) -> UploadTask {
    UploadTask::new(name, Bytes::from_static(b"%PDF-1.4"), "Moondream2")
}

/// Collect bus events until the queue reports drained. The timeout is
/// virtual time; a run that never drains fails the test.
async fn collect_until_drained(rx: &mut broadcast::Receiver<DocketEvent>) -> Vec<DocketEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(3600), rx.recv())
            .await
            .expect("queue never drained")
            .expect("event bus closed");

        let drained = matches!(event, DocketEvent::QueueDrained { .. });
        events.push(event);
        if drained {
            return events;
        }
    }
}

fn invalidated_keys(events: &[DocketEvent]) -> Vec<CacheKey> {
    events
        .iter()
        .filter_map(|e| match e {
            DocketEvent::CacheInvalidated { key, .. } => Some(key.clone()),
            _ => None,
        })
        .collect()
}

fn failed_uploads(events: &[DocketEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            DocketEvent::UploadFailed { filename, .. } => Some(filename.clone()),
            _ => None,
        })
        .collect()
}

fn observed_states(events: &[DocketEvent]) -> Vec<JobState> {
    events
        .iter()
        .filter_map(|e| match e {
            DocketEvent::StatusUpdated { status, .. } => Some(status.state),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_submissions_follow_enqueue_order() {
    let api = FakeBackend::new(vec![]);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator
        .clone()
        .enqueue(vec![task("a.pdf"), task("b.docx"), task("c.pptx")])
        .await;
    orchestrator.clone().enqueue(vec![task("d.pdf")]).await;

    collect_until_drained(&mut rx).await;

    assert_eq!(api.submissions(), vec!["a.pdf", "b.docx", "c.pptx", "d.pdf"]);
    assert!(orchestrator.is_drained().await);
}

#[tokio::test(start_paused = true)]
async fn test_no_second_submission_while_job_outstanding() {
    // Job that never terminates: every poll reports processing
    let api = FakeBackend::new(vec![accept_with(vec![], JobState::Processing)]);
    let (orchestrator, _rx) = setup(api.clone(), test_config());

    orchestrator
        .clone()
        .enqueue(vec![task("a.pdf"), task("b.pdf")])
        .await;

    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;

    // Redundant drives and a second enqueue must not slip past the
    // marker or the latch
    orchestrator.clone().drive().await;
    orchestrator.clone().enqueue(vec![task("c.pdf")]).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    tokio::task::yield_now().await;

    assert_eq!(api.submissions(), vec!["a.pdf"]);
    assert!(orchestrator.active_job().await.is_some());
    assert_eq!(orchestrator.queue_len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_busy_answer_retries_same_head_without_removal() {
    // Three busy answers, then acceptance: four submissions of the
    // same file, and the next file only after the acceptance
    let api = FakeBackend::new(vec![
        FakeSubmit::Busy,
        FakeSubmit::Busy,
        FakeSubmit::Busy,
        accept(),
    ]);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator
        .clone()
        .enqueue(vec![task("a.pdf"), task("b.pdf")])
        .await;

    let events = collect_until_drained(&mut rx).await;

    assert_eq!(
        api.submissions(),
        vec!["a.pdf", "a.pdf", "a.pdf", "a.pdf", "b.pdf"]
    );
    // The busy answers dropped nothing
    assert!(failed_uploads(&events).is_empty());
    assert!(orchestrator.is_drained().await);
}

#[tokio::test(start_paused = true)]
async fn test_busy_exhaustion_drops_head_and_continues() {
    let mut config = test_config();
    config.busy_retry.max_attempts = 2;

    let api = FakeBackend::new(vec![FakeSubmit::Busy, FakeSubmit::Busy, accept()]);
    let (orchestrator, mut rx) = setup(api.clone(), config);

    orchestrator
        .clone()
        .enqueue(vec![task("blocked.pdf"), task("next.pdf")])
        .await;

    let events = collect_until_drained(&mut rx).await;

    // blocked.pdf was submitted twice, then given up on
    assert_eq!(api.submissions(), vec!["blocked.pdf", "blocked.pdf", "next.pdf"]);
    assert_eq!(failed_uploads(&events), vec!["blocked.pdf"]);
    assert!(orchestrator.is_drained().await);
}

#[tokio::test(start_paused = true)]
async fn test_completion_invalidates_each_view_exactly_once() {
    // The backend reports completed on every poll after the job ends;
    // the invalidation pass must still run only once
    let api = FakeBackend::new(vec![accept()]);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator.clone().enqueue(vec![task("a.pdf")]).await;
    let events = collect_until_drained(&mut rx).await;

    let keys = invalidated_keys(&events);
    assert_eq!(keys.len(), 4);

    let collection = CollectionId::new("c1");
    for expected in CacheKey::invalidation_keys(&collection) {
        assert_eq!(
            keys.iter().filter(|k| **k == expected).count(),
            1,
            "expected exactly one invalidation of {}",
            expected
        );
    }

    assert!(orchestrator.active_job().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_drops_file_and_continues() {
    let api = FakeBackend::new(vec![
        FakeSubmit::Fail("document parser rejected payload".to_string()),
        accept(),
    ]);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator
        .clone()
        .enqueue(vec![task("bad.pdf"), task("good.pdf")])
        .await;

    let events = collect_until_drained(&mut rx).await;

    assert_eq!(api.submissions(), vec!["bad.pdf", "good.pdf"]);
    assert_eq!(failed_uploads(&events), vec!["bad.pdf"]);

    // The failure reason names the backend's complaint
    let reason = events
        .iter()
        .find_map(|e| match e {
            DocketEvent::UploadFailed { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .unwrap();
    assert!(reason.contains("document parser rejected payload"));

    assert!(orchestrator.is_drained().await);
}

#[tokio::test(start_paused = true)]
async fn test_remote_job_error_still_releases_queue() {
    // First job ends in error; the queue must proceed to the next file
    let api = FakeBackend::new(vec![
        accept_with(vec![JobState::Parsing], JobState::Error),
        accept(),
    ]);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator
        .clone()
        .enqueue(vec![task("corrupt.pdf"), task("fine.pdf")])
        .await;

    let events = collect_until_drained(&mut rx).await;

    assert_eq!(api.submissions(), vec!["corrupt.pdf", "fine.pdf"]);

    // The failed job still invalidates views (partial artifacts may
    // exist) and reports its terminal state
    let finished: Vec<JobState> = events
        .iter()
        .filter_map(|e| match e {
            DocketEvent::JobFinished { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![JobState::Error, JobState::Completed]);
    assert_eq!(invalidated_keys(&events).len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_job_reported_and_queue_proceeds() {
    let mut config = test_config();
    config.job_deadline_ms = 5_000;

    // Job that never reaches a terminal state
    let api = FakeBackend::new(vec![accept_with(vec![], JobState::Processing), accept()]);
    let (orchestrator, mut rx) = setup(api.clone(), config);

    orchestrator
        .clone()
        .enqueue(vec![task("stuck.pdf"), task("next.pdf")])
        .await;

    let events = collect_until_drained(&mut rx).await;

    let stalls = events
        .iter()
        .filter(|e| matches!(e, DocketEvent::JobStalled { .. }))
        .count();
    assert_eq!(stalls, 1);

    // The stall invalidates views like a terminal state would, then
    // the second file gets its turn
    assert_eq!(invalidated_keys(&events).len(), 8);
    assert_eq!(api.submissions(), vec!["stuck.pdf", "next.pdf"]);
    assert!(orchestrator.is_drained().await);
}

#[tokio::test(start_paused = true)]
async fn test_poll_errors_are_tolerated_until_terminal() {
    let api = FakeBackend::new(vec![accept()]).with_failing_polls(2);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator.clone().enqueue(vec![task("a.pdf")]).await;
    collect_until_drained(&mut rx).await;

    // Two failed polls, then the ladder: processing, completed
    assert!(api.poll_count() >= 4);
    assert!(orchestrator.is_drained().await);
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_record_lands_before_first_poll() {
    let api = FakeBackend::new(vec![accept_with(vec![], JobState::Processing)]);
    let (orchestrator, _rx) = setup(api.clone(), test_config());

    orchestrator.clone().enqueue(vec![task("report.pdf")]).await;

    // Let the submission run but stay short of the first poll tick
    tokio::time::advance(Duration::from_millis(10)).await;
    tokio::task::yield_now().await;

    assert_eq!(api.poll_count(), 0);

    let status = orchestrator.latest_status().await.unwrap();
    assert_eq!(status.state, JobState::Parsing);
    assert_eq!(status.progress, 0.0);
    assert_eq!(
        status.step.as_deref(),
        Some("Initializing upload for report.pdf")
    );
    assert_eq!(status.current_file(), Some("report.pdf"));
}

#[tokio::test(start_paused = true)]
async fn test_two_file_batch_end_to_end() {
    // report.pdf walks the full ladder; slides.pptx follows without any
    // further user action
    let api = FakeBackend::new(vec![
        accept_with(
            vec![JobState::Queued, JobState::Parsing, JobState::Processing],
            JobState::Completed,
        ),
        accept(),
    ]);
    let (orchestrator, mut rx) = setup(api.clone(), test_config());

    orchestrator
        .clone()
        .enqueue(vec![task("report.pdf"), task("slides.pptx")])
        .await;

    let events = collect_until_drained(&mut rx).await;

    assert_eq!(api.submissions(), vec!["report.pdf", "slides.pptx"]);

    // First job's observations: optimistic parsing record, then the
    // polled ladder up to completed
    let states = observed_states(&events);
    assert_eq!(
        &states[..5],
        &[
            JobState::Parsing, // optimistic record at submission
            JobState::Queued,
            JobState::Parsing,
            JobState::Processing,
            JobState::Completed,
        ]
    );

    // Both jobs completed and both fired a full invalidation pass
    assert_eq!(invalidated_keys(&events).len(), 8);
    assert!(failed_uploads(&events).is_empty());
    assert!(orchestrator.is_drained().await);
    assert_eq!(orchestrator.queue_len().await, 0);
}
