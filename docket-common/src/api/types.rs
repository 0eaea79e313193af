//! Wire types for the ingestion backend API
//!
//! The backend runs at most one ingestion job per collection at a time.
//! Submissions are answered with `ok` or `already_queued`, and job
//! progress is observed by polling the per-collection status endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vision models the ingestion pipeline can run on extracted figures.
/// The first entry is the default offered to users.
pub const VISION_MODELS: &[&str] = &[
    "Moondream2",
    "Qwen3-VL-2B",
    "InternVL3.5-1B",
    "Ollama-Gemma3",
    "Ollama-Granite3.2-Vision",
];

/// Default vision model when none is selected.
pub const DEFAULT_VISION_MODEL: &str = "Moondream2";

/// File extensions the backend parser accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "pptx"];

/// Opaque backend identifier for a document collection.
///
/// Exactly one upload queue and at most one running ingestion job exist
/// per collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque backend identifier for an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ingestion job lifecycle state as reported by the status endpoint
///
/// `completed` and `error` are terminal: the backend emits no further
/// updates for that job afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job running for the collection
    Idle,
    /// Job accepted, not yet started
    Queued,
    /// Document parsing and figure extraction
    Parsing,
    /// Chunking, embedding, graph extraction
    Processing,
    /// Job finished successfully
    Completed,
    /// Job failed
    Error,
}

impl JobState {
    /// True for states after which no further progress updates occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Queued => "queued",
            JobState::Parsing => "parsing",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Free-form progress detail attached to a status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    /// File currently being processed, when the backend knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,

    /// Recent pipeline log lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

/// One observation of a collection's ingestion job, polled from
/// `GET /collections/{id}/status`.
///
/// Ephemeral: only the latest observation matters, each poll replaces
/// the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Lifecycle state (wire field `status`)
    #[serde(rename = "status")]
    pub state: JobState,

    /// Coarse pipeline stage label, e.g. `"parsing"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Human-readable step within the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Percentage complete (0.0 - 100.0)
    #[serde(default)]
    pub progress: f32,

    /// Optional detail block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JobDetails>,
}

impl JobStatus {
    /// Status reported when no job is running.
    pub fn idle() -> Self {
        Self {
            state: JobState::Idle,
            stage: None,
            step: None,
            progress: 0.0,
            details: None,
        }
    }

    /// File named in the detail block, if any.
    pub fn current_file(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.current_file.as_deref())
    }
}

/// Backend's answer to an upload submission (wire field `status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    /// `"ok"`: job accepted and started
    #[serde(rename = "ok")]
    Accepted,
    /// `"already_queued"`: a job is already running for this collection
    #[serde(rename = "already_queued")]
    AlreadyQueued,
}

/// Response envelope for `POST /collections/{id}/documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: SubmitOutcome,
}

/// One ingested document, from `GET /collections/{id}/documents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub filename: String,
    /// Vision model the document was processed with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

/// One collection, from `GET /collections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: CollectionId,
    pub name: String,
    /// Number of ingested documents
    #[serde(default)]
    pub docs: u32,
}
