//! Tuning configuration for the ingestion orchestrator

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Retry policy for `already_queued` submission answers.
///
/// The backend answers `already_queued` while another job holds the
/// collection. The same file is resubmitted after a growing delay; a
/// file that stays blocked past `max_attempts` is dropped and reported
/// like any other failed upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusyRetryPolicy {
    /// Consecutive `already_queued` answers tolerated for one file
    pub max_attempts: u32,
    /// Delay before the first resubmission, grows linearly per attempt
    pub initial_backoff_ms: u64,
    /// Ceiling for the resubmission delay
    pub max_backoff_ms: u64,
}

impl BusyRetryPolicy {
    /// Delay before resubmitting after `attempt` consecutive busy
    /// answers (1-based). Linear growth, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(attempt as u64)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for BusyRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Orchestrator tuning knobs.
///
/// Durations are plain millisecond fields so the struct deserializes
/// straight from a TOML `[ingest]` table; accessors convert to
/// `Duration` for the tokio timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Job status poll cadence
    pub poll_interval_ms: u64,
    /// Pause between terminal-state cache invalidations and releasing
    /// the queue for the next file
    pub completion_grace_ms: u64,
    /// Ceiling for one submission call
    pub submit_timeout_ms: u64,
    /// Ceiling for one status poll
    pub status_timeout_ms: u64,
    /// Ceiling for a whole job before it is declared stalled
    pub job_deadline_ms: u64,
    /// Handling of `already_queued` answers
    pub busy_retry: BusyRetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            completion_grace_ms: 500,
            submit_timeout_ms: 60_000,
            status_timeout_ms: 10_000,
            job_deadline_ms: 900_000,
            busy_retry: BusyRetryPolicy::default(),
        }
    }
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn job_deadline(&self) -> Duration {
        Duration::from_millis(self.job_deadline_ms)
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be > 0".to_string()));
        }
        if self.submit_timeout_ms == 0 || self.status_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be > 0".to_string()));
        }
        if self.job_deadline_ms < self.poll_interval_ms {
            return Err(Error::Config(
                "job_deadline_ms must be at least one poll interval".to_string(),
            ));
        }
        if self.busy_retry.max_attempts == 0 {
            return Err(Error::Config(
                "busy_retry.max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
