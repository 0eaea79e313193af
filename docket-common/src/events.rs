//! Event types for the docket ingestion client
//!
//! Provides shared event definitions and the EventBus the orchestrator
//! publishes on. Observers (a UI shell, the headless uploader, tests)
//! subscribe instead of sharing mutable state with the queue machinery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::api::types::{CollectionId, JobState, JobStatus};

/// Cache key an observer must refetch after invalidation.
///
/// Keyed per collection so one collection's ingestion never evicts
/// another's cached views.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "collection", rename_all = "snake_case")]
pub enum CacheKey {
    /// Document list of one collection
    Documents(CollectionId),
    /// Extracted chart/figure gallery of one collection
    Charts(CollectionId),
    /// Knowledge graph view of one collection
    Graph(CollectionId),
    /// The collection list itself (document counts change)
    Collections,
}

impl CacheKey {
    /// The four keys left stale by a finished ingestion job for
    /// `collection`: its documents, charts and graph views, plus the
    /// global collection list.
    pub fn invalidation_keys(collection: &CollectionId) -> [CacheKey; 4] {
        [
            CacheKey::Documents(collection.clone()),
            CacheKey::Charts(collection.clone()),
            CacheKey::Graph(collection.clone()),
            CacheKey::Collections,
        ]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Documents(c) => write!(f, "documents[{}]", c),
            CacheKey::Charts(c) => write!(f, "charts[{}]", c),
            CacheKey::Graph(c) => write!(f, "graph[{}]", c),
            CacheKey::Collections => write!(f, "collections"),
        }
    }
}

/// Docket event types
///
/// Events are broadcast via EventBus; every variant carries the moment
/// it was observed so subscribers can order and display them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DocketEvent {
    /// Files staged into a collection's upload queue
    ///
    /// Triggers:
    /// - UI: show pending uploads
    /// - Uploader: track expected completions
    TaskEnqueued {
        collection: CollectionId,
        /// Filenames in enqueue (= submission) order
        filenames: Vec<String>,
        /// Queue length after the append
        queue_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// New job status observation, either the optimistic record written
    /// at submission or a poll result
    ///
    /// Triggers:
    /// - UI: progress bar / stage label refresh
    StatusUpdated {
        collection: CollectionId,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },

    /// A staged file was dropped without being ingested
    ///
    /// Triggers:
    /// - UI: toast naming the file
    /// - Uploader: non-zero exit
    UploadFailed {
        collection: CollectionId,
        filename: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The watched job reached a terminal state
    ///
    /// Triggers:
    /// - UI: final toast (success or failure)
    JobFinished {
        collection: CollectionId,
        /// `Completed` or `Error`
        state: JobState,
        timestamp: DateTime<Utc>,
    },

    /// The watched job exceeded its deadline without reaching a
    /// terminal state; the client gave up waiting
    ///
    /// Triggers:
    /// - UI: warning toast, suggest checking the backend
    JobStalled {
        collection: CollectionId,
        /// How long the job was watched before giving up
        waited_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// A cached view is stale and must be refetched
    ///
    /// Triggers:
    /// - UI: refetch the named view
    CacheInvalidated {
        key: CacheKey,
        timestamp: DateTime<Utc>,
    },

    /// The upload queue emptied with no job outstanding
    ///
    /// Triggers:
    /// - Uploader: exit
    QueueDrained {
        collection: CollectionId,
        timestamp: DateTime<Utc>,
    },
}

/// Event bus for broadcasting docket events
///
/// Wraps a tokio broadcast channel. Emitters never block; slow
/// subscribers lose old events once the buffer wraps.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DocketEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use docket_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DocketEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DocketEvent,
    ) -> Result<usize, broadcast::error::SendError<DocketEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for events where it's acceptable if no component is
    /// currently listening (progress updates, queue bookkeeping).
    pub fn emit_lossy(&self, event: DocketEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
