//! In-memory [`IndexStore`] implementation.
//!
//! Uses a `HashMap` keyed by chunk id behind `std::sync::RwLock`, so every
//! upsert and delete is atomic with respect to concurrent searches.
//! Vector search is brute-force cosine similarity over all stored vectors.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::ChunkRecord;

use super::{ChunkFilter, IndexStore, ScoredChunk};

/// In-memory vector index for tests, demos, and single-process deployments.
pub struct InMemoryIndexStore {
    chunks: RwLock<HashMap<String, ChunkRecord>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of stored chunks, across all versions.
    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Versions of `document_id` currently present in the store.
    pub fn versions_of(&self, document_id: &str) -> BTreeSet<u64> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.version)
            .collect()
    }
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn upsert(&self, chunk: &ChunkRecord) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.insert(chunk.id.clone(), chunk.clone());
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str, version: Option<u64>) -> Result<usize> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let before = chunks.len();
        chunks.retain(|_, c| {
            let same_doc = c.document_id == document_id;
            let same_version = version.map_or(true, |v| c.version == v);
            !(same_doc && same_version)
        });
        Ok(before - chunks.len())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidates: Vec<ScoredChunk> = chunks
            .values()
            .filter(|c| filter.map_or(true, |f| f.matches(c)))
            .map(|c| ScoredChunk::from_record(c, cosine_similarity(query, &c.vector) as f64))
            .collect();
        drop(chunks);

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }
}
