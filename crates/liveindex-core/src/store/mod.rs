//! Index store abstraction for LiveIndex.
//!
//! The [`IndexStore`] trait is the boundary to the vector index engine:
//! upsert-by-id, delete-by-document, and similarity search with an
//! optional metadata filter. The sync coordinator relies on each upsert
//! and delete being individually atomic per chunk id; no cross-record
//! transaction is assumed.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::ChunkRecord;

/// Metadata filter applied by the store during search, before the `k`
/// cut-off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    /// Restrict results to a single document.
    pub document_id: Option<String>,
    /// Restrict results to one version per document. Documents missing from
    /// the map are excluded entirely.
    pub versions: Option<HashMap<String, u64>>,
}

impl ChunkFilter {
    /// Filter that admits only the given committed versions.
    pub fn committed(versions: HashMap<String, u64>) -> Self {
        Self {
            document_id: None,
            versions: Some(versions),
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn matches(&self, chunk: &ChunkRecord) -> bool {
        if let Some(id) = &self.document_id {
            if &chunk.document_id != id {
                return false;
            }
        }
        match &self.versions {
            Some(versions) => versions.get(&chunk.document_id) == Some(&chunk.version),
            None => true,
        }
    }
}

/// A search hit: chunk metadata plus its similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub version: u64,
    pub text: String,
    pub offset: usize,
    pub permission_level: u32,
    pub updated_at: DateTime<Utc>,
    /// Cosine similarity to the query.
    pub score: f64,
}

impl ScoredChunk {
    pub fn from_record(record: &ChunkRecord, score: f64) -> Self {
        Self {
            chunk_id: record.id.clone(),
            document_id: record.document_id.clone(),
            version: record.version,
            text: record.text.clone(),
            offset: record.offset,
            permission_level: record.permission_level,
            updated_at: record.updated_at,
            score,
        }
    }
}

/// Abstract vector index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](IndexStore::upsert) | Insert or replace one chunk by id |
/// | [`delete_by_document`](IndexStore::delete_by_document) | Retire one version (or all) of a document |
/// | [`search`](IndexStore::search) | Nearest-neighbour search, best first |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or replace a chunk (vector and metadata) by its id.
    async fn upsert(&self, chunk: &ChunkRecord) -> Result<()>;

    /// Delete the chunks of `document_id` at `version`, or every version
    /// when `version` is `None`. Returns the number of chunks removed.
    async fn delete_by_document(&self, document_id: &str, version: Option<u64>) -> Result<usize>;

    /// Return up to `k` chunks ranked by descending similarity.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>>;
}
