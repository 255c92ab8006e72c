//! Committed document records.
//!
//! The catalog is the source of truth for which chunk generation of each
//! document is visible. Writes come only from the sync coordinator; reads
//! come from queries and status snapshots.
//!
//! Queries [`pin`](Catalog::pin) the committed versions for the duration
//! of a search. Before deleting a superseded generation the coordinator
//! calls [`wait_for_readers`](Catalog::wait_for_readers), so no search
//! that still considers the old version current can lose its chunks
//! mid-flight.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::{RwLock as AsyncRwLock, RwLockReadGuard as AsyncReadGuard};

use liveindex_core::models::DocumentRecord;
use liveindex_core::store::ChunkFilter;

#[derive(Default)]
pub struct Catalog {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    readers: AsyncRwLock<()>,
}

/// Committed versions as seen by one in-flight search.
pub struct CatalogPin<'a> {
    versions: HashMap<String, u64>,
    _reader: AsyncReadGuard<'a, ()>,
}

impl CatalogPin<'_> {
    pub fn committed_version(&self, doc_id: &str) -> Option<u64> {
        self.versions.get(doc_id).copied()
    }

    /// Store filter admitting exactly the pinned versions.
    pub fn filter(&self) -> ChunkFilter {
        ChunkFilter::committed(self.versions.clone())
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, doc_id: &str) -> Option<DocumentRecord> {
        self.read().get(doc_id).cloned()
    }

    /// Replace the record for `record.id`. This is the commit point of a
    /// re-index cycle.
    pub fn commit(&self, record: DocumentRecord) {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    pub fn remove(&self, doc_id: &str) -> Option<DocumentRecord> {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(doc_id)
    }

    /// Register as a reader and snapshot the committed versions.
    pub async fn pin(&self) -> CatalogPin<'_> {
        let reader = self.readers.read().await;
        CatalogPin {
            versions: self.versions(),
            _reader: reader,
        }
    }

    /// Wait until every pin taken before this call has been released.
    pub async fn wait_for_readers(&self) {
        drop(self.readers.write().await);
    }

    /// Committed version of every document, taken atomically.
    pub fn versions(&self) -> HashMap<String, u64> {
        self.read()
            .iter()
            .map(|(id, rec)| (id.clone(), rec.version))
            .collect()
    }

    /// All records, sorted by id.
    pub fn records(&self) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of `chunk_count` over committed records.
    pub fn chunk_total(&self) -> usize {
        self.read().values().map(|r| r.chunk_count).sum()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, DocumentRecord>> {
        self.docs.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, version: u64, chunks: usize) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            content_hash: format!("hash-{}", version),
            version,
            permission_level: 1,
            chunk_count: chunks,
            last_indexed_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_commit_replaces_and_versions_snapshot() {
        let catalog = Catalog::new();
        catalog.commit(record("b.md", 1, 2));
        catalog.commit(record("a.md", 1, 1));
        catalog.commit(record("a.md", 2, 3));

        let versions = catalog.versions();
        assert_eq!(versions.get("a.md"), Some(&2));
        assert_eq!(versions.get("b.md"), Some(&1));
        assert_eq!(catalog.chunk_total(), 5);
        let ids: Vec<String> = catalog.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn test_pin_is_a_stable_snapshot() {
        let catalog = Catalog::new();
        catalog.commit(record("a.md", 1, 1));
        let pin = catalog.pin().await;
        catalog.commit(record("a.md", 2, 1));
        assert_eq!(pin.committed_version("a.md"), Some(1));
        assert_eq!(pin.committed_version("b.md"), None);
        assert_eq!(
            pin.filter().versions,
            Some(HashMap::from([("a.md".to_string(), 1)]))
        );
    }

    #[tokio::test]
    async fn test_wait_for_readers_blocks_until_pin_released() {
        use std::sync::Arc;
        use std::time::Duration;

        let catalog = Arc::new(Catalog::new());
        let pin = catalog.pin().await;

        let waiter = {
            let catalog = catalog.clone();
            tokio::spawn(async move { catalog.wait_for_readers().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(pin);
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_remove() {
        let catalog = Catalog::new();
        catalog.commit(record("a.md", 1, 1));
        assert!(catalog.remove("a.md").is_some());
        assert!(catalog.remove("a.md").is_none());
        assert!(catalog.is_empty());
    }
}
