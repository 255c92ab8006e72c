//! Sync coordinator: keeps the index consistent with the connector.
//!
//! Each document has one entry in an arena keyed by document id, holding
//! its [`SyncState`], a cancellable debounce timer, and a `dirty_again`
//! flag. Transitions:
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | `Idle` / `Failed` | change event | `PendingDebounce` (timer started) |
//! | `PendingDebounce` | change event | `PendingDebounce` (timer reset) |
//! | `PendingDebounce` | timer fires | `Indexing` |
//! | `Indexing` | change event | `Indexing`, `dirty_again` set |
//! | `Indexing` | cycle ends, `dirty_again` | `PendingDebounce` |
//! | `Indexing` | cycle ends | `Idle` or `Failed` |
//! | any but `Indexing` | delete event | `Indexing` (no debounce) |
//!
//! A cycle upserts the complete new generation, commits the new
//! [`DocumentRecord`] to the [`Catalog`], waits for searches pinned to the
//! old version, and only then deletes the old generation. Queries only
//! return chunks of the committed version, so readers see either the old
//! set or the new set in full.
//!
//! An entry is dropped once its document is gone and every chunk of it
//! has been deleted from the store.
//!
//! The arena mutex is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Notify, Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;

use liveindex_core::chunk::{chunk_id, chunk_text, content_hash, ChunkParams};
use liveindex_core::embedding::Embedder;
use liveindex_core::models::{
    ChangeEvent, ChangeKind, ChunkRecord, DocumentRecord, DocumentSummary, PipelineEvent,
    StatusSnapshot, SyncState,
};
use liveindex_core::store::IndexStore;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::connector::Connector;
use crate::error::SyncError;
use crate::hub::Hub;
use crate::metrics::Metrics;
use crate::permissions::Permissions;

/// Tunables for the coordinator, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub debounce: Duration,
    pub chunking: ChunkParams,
    pub embed_batch_size: usize,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
    pub read_timeout: Duration,
    pub max_concurrent_cycles: usize,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.sync.debounce(),
            chunking: config.chunking.params(),
            embed_batch_size: config.embedding.batch_size,
            embed_timeout: config.embedding.timeout(),
            store_timeout: config.store.timeout(),
            read_timeout: config.sync.read_timeout(),
            max_concurrent_cycles: config.sync.max_concurrent_cycles,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Shared services the coordinator drives.
#[derive(Clone)]
pub struct SyncComponents {
    pub connector: Arc<dyn Connector>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn IndexStore>,
    pub catalog: Arc<Catalog>,
    pub permissions: Arc<Permissions>,
    pub hub: Arc<Hub>,
    pub metrics: Arc<Metrics>,
}

/// Result of a full scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents_found: usize,
    pub enqueued: usize,
    /// Indexed documents no longer present in the source.
    pub removed: usize,
    pub elapsed_ms: f64,
}

#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    parts: SyncComponents,
    settings: SyncSettings,
    docs: Mutex<HashMap<String, DocEntry>>,
    cycles: Semaphore,
    queued: AtomicUsize,
    settled: Notify,
    watcher_active: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

struct DocEntry {
    state: SyncState,
    /// Bumped whenever the debounce timer is replaced; a firing timer with
    /// a stale generation does nothing.
    generation: u64,
    timer: Option<JoinHandle<()>>,
    dirty_again: bool,
    pending: ChangeKind,
    /// Highest version any cycle has written chunks under. Versions are
    /// not reused while chunks of any version may remain in the store.
    max_version: u64,
    last_error: Option<String>,
}

impl DocEntry {
    fn new() -> Self {
        Self {
            state: SyncState::Idle,
            generation: 0,
            timer: None,
            dirty_again: false,
            pending: ChangeKind::Modified,
            max_version: 0,
            last_error: None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }
}

enum Outcome {
    Unchanged,
    Committed { version: u64, chunks: usize },
    /// `purged` is true when the store holds no chunks of the document.
    Removed { purged: bool },
    /// Gone from the source and never indexed.
    Absent { purged: bool },
    Failed(SyncError),
}

impl Outcome {
    /// The document is gone and no chunk of any version remains, so its
    /// arena entry (and version counter) can be dropped.
    fn leaves_nothing(&self) -> bool {
        matches!(
            self,
            Outcome::Removed { purged: true } | Outcome::Absent { purged: true }
        )
    }
}

impl SyncCoordinator {
    pub fn new(parts: SyncComponents, settings: SyncSettings) -> Self {
        let permits = settings.max_concurrent_cycles.max(1);
        Self {
            inner: Arc::new(Inner {
                parts,
                settings,
                docs: Mutex::new(HashMap::new()),
                cycles: Semaphore::new(permits),
                queued: AtomicUsize::new(0),
                settled: Notify::new(),
                watcher_active: AtomicBool::new(false),
                last_sync: Mutex::new(None),
            }),
        }
    }

    /// Consume change events until the channel closes.
    pub async fn run(self, mut events: UnboundedReceiver<ChangeEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("change event channel closed");
    }

    /// Apply one change event. Must be called within a Tokio runtime.
    pub fn handle_event(&self, event: ChangeEvent) {
        tracing::debug!(doc_id = %event.doc_id, kind = ?event.kind, "change event");
        match event.kind {
            ChangeKind::Deleted => self.on_delete(event.doc_id),
            kind => self.on_change(event.doc_id, kind),
        }
    }

    fn on_change(&self, doc_id: String, kind: ChangeKind) {
        let mut docs = self.docs();
        let entry = docs.entry(doc_id.clone()).or_insert_with(DocEntry::new);
        if entry.state == SyncState::Indexing {
            entry.dirty_again = true;
            entry.pending = kind;
            return;
        }
        if entry.state != SyncState::PendingDebounce || entry.pending != ChangeKind::Created {
            entry.pending = kind;
        }
        self.arm_timer(doc_id, entry);
    }

    fn on_delete(&self, doc_id: String) {
        let mut docs = self.docs();
        let entry = docs.entry(doc_id.clone()).or_insert_with(DocEntry::new);
        entry.pending = ChangeKind::Deleted;
        if entry.state == SyncState::Indexing {
            entry.dirty_again = true;
            return;
        }
        entry.cancel_timer();
        self.begin_cycle(doc_id, entry);
    }

    /// (Re)start the debounce timer; the caller holds the arena lock.
    fn arm_timer(&self, doc_id: String, entry: &mut DocEntry) {
        entry.cancel_timer();
        entry.state = SyncState::PendingDebounce;
        let generation = entry.generation;
        let this = self.clone();
        let delay = self.inner.settings.debounce;
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.on_timer(doc_id, generation);
        }));
    }

    fn on_timer(&self, doc_id: String, generation: u64) {
        let mut docs = self.docs();
        let Some(entry) = docs.get_mut(&doc_id) else {
            return;
        };
        if entry.generation != generation || entry.state != SyncState::PendingDebounce {
            return;
        }
        entry.timer = None;
        self.begin_cycle(doc_id, entry);
    }

    /// Move to `Indexing` and spawn the cycle; the caller holds the arena lock.
    fn begin_cycle(&self, doc_id: String, entry: &mut DocEntry) {
        entry.state = SyncState::Indexing;
        entry.dirty_again = false;
        let change = entry.pending;

        // Publishing happens off the arena lock: hub subscribers snapshot
        // the arena while holding the hub's registry lock.
        let this = self.clone();
        let started = Instant::now();
        tokio::spawn(async move {
            this.inner.parts.hub.publish(PipelineEvent::DocumentUpdated {
                doc_id: doc_id.clone(),
                change,
            });
            let outcome = {
                let _slot = this.acquire_slot(&doc_id).await;
                this.reindex(&doc_id).await
            };
            this.finish(doc_id, outcome, started);
        });
    }

    /// Wait for one of the `max_concurrent_cycles` slots.
    async fn acquire_slot(&self, doc_id: &str) -> Option<SemaphorePermit<'_>> {
        if let Ok(permit) = self.inner.cycles.try_acquire() {
            return Some(permit);
        }
        let queued = self.inner.queued.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(doc_id, queued, "all indexing slots busy, cycle queued");
        let permit = self.inner.cycles.acquire().await.ok();
        self.inner.queued.fetch_sub(1, Ordering::SeqCst);
        permit
    }

    fn finish(&self, doc_id: String, outcome: Outcome, started: Instant) {
        let elapsed_ms = round2(started.elapsed().as_secs_f64() * 1000.0);

        let event = match &outcome {
            Outcome::Committed { version, chunks } => {
                tracing::info!(doc_id = %doc_id, version, chunks, elapsed_ms, "reindex complete");
                self.inner.parts.metrics.record_reindex(true);
                self.touch_last_sync();
                Some(PipelineEvent::ReindexComplete {
                    doc_id: doc_id.clone(),
                    version: *version,
                    elapsed_ms,
                    chunks: *chunks,
                })
            }
            Outcome::Removed { .. } => {
                tracing::info!(doc_id = %doc_id, "document removed");
                self.touch_last_sync();
                Some(PipelineEvent::DocumentRemoved {
                    doc_id: doc_id.clone(),
                })
            }
            Outcome::Failed(err) => {
                tracing::warn!(doc_id = %doc_id, kind = err.kind(), error = %err, "reindex failed");
                self.inner.parts.metrics.record_reindex(false);
                Some(PipelineEvent::ReindexFailed {
                    doc_id: doc_id.clone(),
                    reason: err.reason(),
                })
            }
            Outcome::Unchanged => {
                tracing::debug!(doc_id = %doc_id, "content unchanged");
                None
            }
            Outcome::Absent { .. } => None,
        };

        {
            let mut docs = self.docs();
            let mut prune = false;
            if let Some(entry) = docs.get_mut(&doc_id) {
                match &outcome {
                    Outcome::Failed(err) => {
                        entry.state = SyncState::Failed;
                        entry.last_error = Some(err.reason());
                    }
                    _ => {
                        entry.state = SyncState::Idle;
                        entry.last_error = None;
                    }
                }

                if entry.dirty_again {
                    entry.dirty_again = false;
                    if entry.pending == ChangeKind::Deleted {
                        entry.cancel_timer();
                        self.begin_cycle(doc_id.clone(), entry);
                    } else {
                        self.arm_timer(doc_id.clone(), entry);
                    }
                }
                prune = entry.state == SyncState::Idle && outcome.leaves_nothing();
            }
            if prune {
                docs.remove(&doc_id);
            }
        }

        if let Some(event) = event {
            self.inner.parts.hub.publish(event);
        }
        self.inner.settled.notify_waiters();
    }

    /// One indexing pass. Never leaves the committed version partially
    /// replaced.
    async fn reindex(&self, doc_id: &str) -> Outcome {
        let parts = &self.inner.parts;
        let settings = &self.inner.settings;

        let source = match bounded(
            settings.read_timeout,
            "read",
            parts.connector.get_content(doc_id),
        )
        .await
        {
            Ok(source) => source,
            Err(msg) => return Outcome::Failed(SyncError::TransientIo(msg)),
        };

        let Some(source) = source else {
            return self.retire_document(doc_id).await;
        };

        let hash = content_hash(&source.bytes);
        let previous = parts.catalog.get(doc_id);
        if previous.as_ref().map(|p| p.content_hash.as_str()) == Some(hash.as_str()) {
            return Outcome::Unchanged;
        }

        let permission_level = parts
            .permissions
            .resolve_or_restrict(doc_id, source.permission_level);
        let text = String::from_utf8_lossy(&source.bytes);
        let segments = chunk_text(&text, &settings.chunking);

        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let vectors = match self.embed_all(&texts).await {
            Ok(vectors) => vectors,
            Err(err) => return Outcome::Failed(err),
        };

        let version = {
            let mut docs = self.docs();
            let entry = docs.entry(doc_id.to_string()).or_insert_with(DocEntry::new);
            let committed = previous.as_ref().map_or(0, |p| p.version);
            entry.max_version = entry.max_version.max(committed) + 1;
            entry.max_version
        };

        let now = Utc::now();
        let updated_at = source.updated_at.unwrap_or(now);

        for (segment, vector) in segments.iter().zip(vectors) {
            let record = ChunkRecord {
                id: chunk_id(doc_id, version, segment.offset),
                document_id: doc_id.to_string(),
                version,
                text: segment.text.clone(),
                vector,
                offset: segment.offset,
                permission_level,
                updated_at,
            };
            if let Err(msg) = bounded(settings.store_timeout, "upsert", parts.store.upsert(&record)).await
            {
                self.discard_version(doc_id, version).await;
                return Outcome::Failed(SyncError::IndexStore(msg));
            }
        }

        // Commit point: searches pinned after this see the new version.
        parts.catalog.commit(DocumentRecord {
            id: doc_id.to_string(),
            content_hash: hash,
            version,
            permission_level,
            chunk_count: segments.len(),
            last_indexed_at: now,
            updated_at,
        });

        if let Some(previous) = previous {
            parts.catalog.wait_for_readers().await;
            if let Err(msg) = bounded(
                settings.store_timeout,
                "retire",
                parts.store.delete_by_document(doc_id, Some(previous.version)),
            )
            .await
            {
                // Already invisible to search; only storage is wasted.
                tracing::warn!(doc_id, version = previous.version, error = %msg, "failed to retire superseded chunks");
            }
        }

        Outcome::Committed {
            version,
            chunks: segments.len(),
        }
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SyncError> {
        let embedder = &self.inner.parts.embedder;
        let settings = &self.inner.settings;
        let dims = embedder.dims();

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(settings.embed_batch_size.max(1)) {
            let out = bounded(settings.embed_timeout, "embed", embedder.embed_batch(batch))
                .await
                .map_err(SyncError::Embedding)?;
            if out.len() != batch.len() {
                return Err(SyncError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    out.len()
                )));
            }
            if let Some(bad) = out.iter().find(|v| v.len() != dims) {
                return Err(SyncError::Embedding(format!(
                    "expected {} dimensions, got {}",
                    dims,
                    bad.len()
                )));
            }
            vectors.extend(out);
        }
        Ok(vectors)
    }

    /// Best-effort removal of an uncommitted generation.
    async fn discard_version(&self, doc_id: &str, version: u64) {
        let parts = &self.inner.parts;
        if let Err(msg) = bounded(
            self.inner.settings.store_timeout,
            "discard",
            parts.store.delete_by_document(doc_id, Some(version)),
        )
        .await
        {
            tracing::warn!(doc_id, version, error = %msg, "failed to discard uncommitted chunks");
        }
    }

    async fn retire_document(&self, doc_id: &str) -> Outcome {
        let parts = &self.inner.parts;
        if parts.catalog.remove(doc_id).is_none() {
            // A failed cycle may have left uncommitted chunks behind.
            let written = self.docs().get(doc_id).map_or(0, |e| e.max_version);
            let purged = written == 0 || self.purge(doc_id).await;
            return Outcome::Absent { purged };
        }
        parts.catalog.wait_for_readers().await;
        let purged = self.purge(doc_id).await;
        Outcome::Removed { purged }
    }

    /// Delete every version of `doc_id`; false if the store refused.
    async fn purge(&self, doc_id: &str) -> bool {
        match bounded(
            self.inner.settings.store_timeout,
            "retire",
            self.inner.parts.store.delete_by_document(doc_id, None),
        )
        .await
        {
            Ok(_) => true,
            Err(msg) => {
                tracing::warn!(doc_id, error = %msg, "failed to delete chunks of removed document");
                false
            }
        }
    }

    /// Enqueue every document the connector lists and retire indexed
    /// documents it no longer lists.
    pub async fn ingest_all(&self) -> Result<IngestReport> {
        let started = Instant::now();
        let ids = self.inner.parts.connector.list_documents().await?;
        let listed: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let stale: Vec<String> = self
            .inner
            .parts
            .catalog
            .records()
            .into_iter()
            .map(|r| r.id)
            .filter(|id| !listed.contains(id.as_str()))
            .collect();

        for id in &ids {
            self.handle_event(ChangeEvent::new(ChangeKind::Modified, id.clone()));
        }
        for id in &stale {
            self.handle_event(ChangeEvent::new(ChangeKind::Deleted, id.clone()));
        }

        let report = IngestReport {
            documents_found: ids.len(),
            enqueued: ids.len(),
            removed: stale.len(),
            elapsed_ms: round2(started.elapsed().as_secs_f64() * 1000.0),
        };
        tracing::info!(
            connector = self.inner.parts.connector.name(),
            found = report.documents_found,
            removed = report.removed,
            "ingest scan complete"
        );
        Ok(report)
    }

    /// Wait until no document is pending or indexing. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_settled() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_settled();
            }
        }
    }

    /// True when no document is pending or indexing.
    pub fn is_settled(&self) -> bool {
        self.docs().values().all(|e| !e.state.is_active())
    }

    pub fn state_of(&self, doc_id: &str) -> Option<SyncState> {
        self.docs().get(doc_id).map(|e| e.state)
    }

    /// Reason of the last failed cycle, cleared by a successful one.
    pub fn last_error(&self, doc_id: &str) -> Option<String> {
        self.docs().get(doc_id).and_then(|e| e.last_error.clone())
    }

    pub fn set_watcher_active(&self, active: bool) {
        self.inner.watcher_active.store(active, Ordering::Relaxed);
    }

    pub fn watcher_active(&self) -> bool {
        self.inner.watcher_active.load(Ordering::Relaxed)
    }

    /// Committed documents plus any with pending work or a failure.
    pub fn documents(&self) -> Vec<DocumentSummary> {
        let records = self.inner.parts.catalog.records();
        let docs = self.docs();

        let mut out: Vec<DocumentSummary> = records
            .iter()
            .map(|r| DocumentSummary {
                id: r.id.clone(),
                version: Some(r.version),
                state: docs.get(&r.id).map_or(SyncState::Idle, |e| e.state),
                permission_level: Some(r.permission_level),
                last_indexed_at: Some(r.last_indexed_at),
            })
            .collect();

        let committed: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        out.extend(
            docs.iter()
                .filter(|(id, e)| !committed.contains(id.as_str()) && e.state != SyncState::Idle)
                .map(|(id, e)| DocumentSummary {
                    id: id.clone(),
                    version: None,
                    state: e.state,
                    permission_level: None,
                    last_indexed_at: None,
                }),
        );
        drop(docs);

        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn status(&self) -> StatusSnapshot {
        let catalog = &self.inner.parts.catalog;
        StatusSnapshot {
            documents_indexed: catalog.len(),
            chunks_indexed: catalog.chunk_total(),
            documents: self.documents(),
            watcher_active: self.watcher_active(),
            last_sync: *self
                .inner
                .last_sync
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            queued_cycles: self.inner.queued.load(Ordering::SeqCst),
        }
    }

    fn touch_last_sync(&self) {
        *self
            .inner
            .last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    fn docs(&self) -> MutexGuard<'_, HashMap<String, DocEntry>> {
        self.inner.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run `fut` with a deadline, flattening both failure modes into a message.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{} failed: {:#}", what, e)),
        Err(_) => Err(format!("{} timed out after {}ms", what, limit.as_millis())),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionsConfig;
    use crate::connector::InMemoryConnector;
    use crate::embedding::HashEmbedder;
    use liveindex_core::store::memory::InMemoryIndexStore;

    struct Fixture {
        coordinator: SyncCoordinator,
        connector: InMemoryConnector,
        store: Arc<InMemoryIndexStore>,
        catalog: Arc<Catalog>,
    }

    fn fixture() -> Fixture {
        let connector = InMemoryConnector::new();
        let store = Arc::new(InMemoryIndexStore::new());
        let catalog = Arc::new(Catalog::new());
        let parts = SyncComponents {
            connector: Arc::new(connector.clone()),
            embedder: Arc::new(HashEmbedder::new(32)),
            store: store.clone(),
            catalog: catalog.clone(),
            permissions: Arc::new(Permissions::from_config(&PermissionsConfig::default()).unwrap()),
            hub: Hub::new(16),
            metrics: Arc::new(Metrics::new(20)),
        };
        let settings = SyncSettings {
            debounce: Duration::from_millis(20),
            ..SyncSettings::default()
        };
        Fixture {
            coordinator: SyncCoordinator::new(parts, settings),
            connector,
            store,
            catalog,
        }
    }

    #[tokio::test]
    async fn test_change_moves_to_pending_then_indexes() {
        let f = fixture();
        f.connector.set_text("a.md", "alpha document");
        f.coordinator
            .handle_event(ChangeEvent::new(ChangeKind::Created, "a.md"));
        assert_eq!(
            f.coordinator.state_of("a.md"),
            Some(SyncState::PendingDebounce)
        );
        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(f.coordinator.state_of("a.md"), Some(SyncState::Idle));
        assert_eq!(f.catalog.get("a.md").unwrap().version, 1);
        assert_eq!(f.store.versions_of("a.md"), [1].into());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_inside_debounce_window_indexes_once() {
        let f = fixture();
        for i in 0..5 {
            f.connector.set_text("a.md", &format!("draft {}", i));
            f.coordinator
                .handle_event(ChangeEvent::new(ChangeKind::Modified, "a.md"));
            tokio::time::advance(Duration::from_millis(15)).await;
            assert_eq!(
                f.coordinator.state_of("a.md"),
                Some(SyncState::PendingDebounce)
            );
        }
        assert!(f.catalog.get("a.md").is_none());

        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
        let record = f.catalog.get("a.md").unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.content_hash, content_hash(b"draft 4"));
    }

    #[tokio::test]
    async fn test_delete_bypasses_debounce() {
        let f = fixture();
        f.connector.set_text("a.md", "alpha");
        f.coordinator
            .handle_event(ChangeEvent::new(ChangeKind::Created, "a.md"));
        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);

        f.connector.remove("a.md");
        f.coordinator
            .handle_event(ChangeEvent::new(ChangeKind::Deleted, "a.md"));
        assert_eq!(f.coordinator.state_of("a.md"), Some(SyncState::Indexing));
        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
        assert!(f.catalog.get("a.md").is_none());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_unknown_document_is_quiet() {
        let f = fixture();
        f.coordinator
            .handle_event(ChangeEvent::new(ChangeKind::Deleted, "never.md"));
        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
        assert!(f.coordinator.documents().is_empty());
        assert_eq!(f.coordinator.state_of("never.md"), None);
    }

    #[tokio::test]
    async fn test_removed_document_leaves_the_arena() {
        let f = fixture();
        for i in 0..5 {
            let id = format!("renamed-{}.md", i);
            f.connector.set_text(&id, "moving around");
            f.coordinator
                .handle_event(ChangeEvent::new(ChangeKind::Created, id.as_str()));
            assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
            f.connector.remove(&id);
            f.coordinator
                .handle_event(ChangeEvent::new(ChangeKind::Deleted, id.as_str()));
            assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
        }
        assert!(f.coordinator.docs().is_empty());
        assert!(f.store.is_empty());

        // With nothing left in the store the version counter starts over.
        f.connector.set_text("renamed-0.md", "back again");
        f.coordinator
            .handle_event(ChangeEvent::new(ChangeKind::Created, "renamed-0.md"));
        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(f.catalog.get("renamed-0.md").unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let f = fixture();
        f.connector.set_text("a.md", "alpha");
        f.connector.set_text("b.md", "beta");
        f.coordinator.ingest_all().await.unwrap();
        assert!(f.coordinator.wait_idle(Duration::from_secs(5)).await);

        let status = f.coordinator.status();
        assert_eq!(status.documents_indexed, 2);
        assert_eq!(status.chunks_indexed, 2);
        assert!(status.last_sync.is_some());
        assert!(!status.watcher_active);
    }

    #[tokio::test]
    async fn test_bounded_reports_timeout() {
        let err = bounded(Duration::from_millis(10), "embed", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(err.contains("embed timed out"));
    }
}
