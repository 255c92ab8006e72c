//! Core data models shared by the sync coordinator, the query path, and
//! the notification hub.
//!
//! These types describe documents and their chunk generations as they flow
//! from a connector through chunking and embedding into the index store,
//! and the events and results that leave the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The committed state of one source document.
///
/// Written only by the sync coordinator. The `version` bump is the commit
/// point of a re-index cycle: only chunks carrying the committed version
/// are visible to search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    /// Stable document key (connector-relative path).
    pub id: String,
    /// SHA-256 of the raw content that produced this version.
    pub content_hash: String,
    /// Monotonic generation number, starting at 1.
    pub version: u64,
    /// Access tier; a role sees this document iff `role.level >= permission_level`.
    pub permission_level: u32,
    /// Number of chunks written for this version.
    pub chunk_count: usize,
    /// When this version was committed.
    pub last_indexed_at: DateTime<Utc>,
    /// Source modification time (falls back to indexing time).
    pub updated_at: DateTime<Utc>,
}

/// One embedded chunk of a document generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Deterministic id derived from `document_id`, `version`, and `offset`.
    pub id: String,
    pub document_id: String,
    pub version: u64,
    pub text: String,
    pub vector: Vec<f32>,
    /// Byte offset of `text` within the document content.
    pub offset: usize,
    /// Inherited from the document at index time.
    pub permission_level: u32,
    pub updated_at: DateTime<Utc>,
}

/// Per-document synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    PendingDebounce,
    Indexing,
    Failed,
}

impl SyncState {
    /// True while work for the document is scheduled or running.
    pub fn is_active(self) -> bool {
        matches!(self, SyncState::PendingDebounce | SyncState::Indexing)
    }
}

/// Kind of mutation reported by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change notification for a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub doc_id: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, doc_id: impl Into<String>) -> Self {
        Self {
            kind,
            doc_id: doc_id.into(),
        }
    }
}

/// Pipeline lifecycle event broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A debounced change is about to be processed.
    DocumentUpdated { doc_id: String, change: ChangeKind },
    /// A new version was committed.
    ReindexComplete {
        doc_id: String,
        version: u64,
        elapsed_ms: f64,
        chunks: usize,
    },
    /// A cycle failed; the previous version is still served.
    ReindexFailed { doc_id: String, reason: String },
    /// The document and all of its chunks were retired.
    DocumentRemoved { doc_id: String },
}

impl PipelineEvent {
    pub fn doc_id(&self) -> &str {
        match self {
            PipelineEvent::DocumentUpdated { doc_id, .. }
            | PipelineEvent::ReindexComplete { doc_id, .. }
            | PipelineEvent::ReindexFailed { doc_id, .. }
            | PipelineEvent::DocumentRemoved { doc_id } => doc_id,
        }
    }
}

/// A caller's access role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub level: u32,
}

impl Role {
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

/// A cited chunk in a [`QueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub score: f64,
    pub offset: usize,
    pub updated_at: DateTime<Utc>,
}

/// Outcome classification of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryStatus {
    Answered,
    /// Nothing the caller may see matched.
    NoAccessibleResults,
    /// Embedding or search failed; distinct from an empty result.
    Degraded { reason: String },
}

/// Answer with citations and timing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub latency_ms: f64,
    pub status: QueryStatus,
}

/// Per-document line in a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    /// Committed version, `None` if nothing has been committed yet.
    pub version: Option<u64>,
    pub state: SyncState,
    pub permission_level: Option<u32>,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the index, sent to new observers first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub documents: Vec<DocumentSummary>,
    pub watcher_active: bool,
    pub last_sync: Option<DateTime<Utc>>,
    /// Cycles reported as `Indexing` that still wait for a free slot.
    pub queued_cycles: usize,
}
