//! Completion watcher
//!
//! One polling task per outstanding ingestion job. Observations land in
//! the status cache and on the bus; the first terminal observation
//! fires the cache invalidations exactly once, waits out a short grace
//! period so subscribers can react before the queue moves on, then
//! clears the active-job marker and re-drives the queue. A job that
//! never reports a terminal state is abandoned at the configured
//! deadline and reported as stalled.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};

use docket_common::api::types::JobState;
use docket_common::events::{CacheKey, DocketEvent};

use crate::orchestrator::{IngestOrchestrator, JobTicket};

/// How a watched job ended.
enum Conclusion {
    /// Backend reported `completed` or `error`
    Terminal(JobState),
    /// No terminal state before the job deadline
    Stalled,
}

/// Spawn the polling task for `ticket`.
pub(crate) fn spawn(orchestrator: Arc<IngestOrchestrator>, ticket: JobTicket) {
    tokio::spawn(watch_job(orchestrator, ticket));
}

/// Poll the collection's job status until the job concludes.
async fn watch_job(orc: Arc<IngestOrchestrator>, ticket: JobTicket) {
    let deadline = Instant::now() + orc.config.job_deadline();

    let mut tick = interval(orc.config.poll_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // An interval fires immediately; consume that so the first real
    // poll lands one full interval after submission.
    tick.tick().await;

    tracing::debug!(
        collection = %orc.collection,
        job = %ticket.id,
        started_at = %ticket.started_at,
        "Watching ingestion job"
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = sleep_until(deadline) => {
                tracing::warn!(
                    collection = %orc.collection,
                    job = %ticket.id,
                    waited_secs = orc.config.job_deadline().as_secs(),
                    "Job never reached a terminal state, giving up"
                );
                conclude(&orc, &ticket, Conclusion::Stalled).await;
                return;
            }
        }

        let status = match timeout(
            orc.config.status_timeout(),
            orc.api.job_status(&orc.collection),
        )
        .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!(
                    collection = %orc.collection,
                    job = %ticket.id,
                    error = %e,
                    "Status poll failed (non-fatal, continuing)"
                );
                continue;
            }
            Err(_) => {
                tracing::warn!(
                    collection = %orc.collection,
                    job = %ticket.id,
                    "Status poll timed out (non-fatal, continuing)"
                );
                continue;
            }
        };

        orc.status.record(&orc.collection, status.clone()).await;
        orc.bus.emit_lossy(DocketEvent::StatusUpdated {
            collection: orc.collection.clone(),
            status: status.clone(),
            timestamp: Utc::now(),
        });

        if status.state.is_terminal() {
            conclude(&orc, &ticket, Conclusion::Terminal(status.state)).await;
            return;
        }
    }
}

/// Run the end-of-job sequence: report, invalidate stale views, wait
/// out the grace period, release the queue, drive the next head.
///
/// Guarded so the sequence runs at most once per ticket even if a
/// duplicate terminal observation slips in.
async fn conclude(orc: &Arc<IngestOrchestrator>, ticket: &JobTicket, conclusion: Conclusion) {
    {
        let mut handled = orc.completion_guard.write().await;
        if *handled == Some(ticket.id) {
            return;
        }
        *handled = Some(ticket.id);
    }

    match conclusion {
        Conclusion::Terminal(state) => {
            tracing::info!(
                collection = %orc.collection,
                job = %ticket.id,
                state = %state,
                "Ingestion job finished"
            );
            orc.bus.emit_lossy(DocketEvent::JobFinished {
                collection: orc.collection.clone(),
                state,
                timestamp: Utc::now(),
            });
        }
        Conclusion::Stalled => {
            orc.bus.emit_lossy(DocketEvent::JobStalled {
                collection: orc.collection.clone(),
                waited_secs: orc.config.job_deadline().as_secs(),
                timestamp: Utc::now(),
            });
        }
    }

    // Either way the collection's content may have changed; observers
    // must refetch every derived view.
    for key in CacheKey::invalidation_keys(&orc.collection) {
        orc.bus.emit_lossy(DocketEvent::CacheInvalidated {
            key,
            timestamp: Utc::now(),
        });
    }

    // Give subscribers a moment to begin refetching before the marker
    // disappears and the next submission starts.
    tokio::time::sleep(orc.config.completion_grace()).await;

    {
        let mut active = orc.active_job.write().await;
        *active = None;
        *orc.completion_guard.write().await = None;
    }

    tracing::debug!(
        collection = %orc.collection,
        job = %ticket.id,
        "Queue released for next submission"
    );

    orc.clone().drive().await;
}
