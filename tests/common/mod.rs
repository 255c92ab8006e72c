//! Shared fixtures for integration tests: instrumented embedder and index
//! store wrappers plus helpers for building a `LiveIndex` over an
//! in-memory connector.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use liveindex::app::{Backends, LiveIndex};
use liveindex::config::{Config, PermissionRule};
use liveindex::connector::InMemoryConnector;
use liveindex::embedding::HashEmbedder;
use liveindex::hub::{HubMessage, Subscription};
use liveindex_core::embedding::Embedder;
use liveindex_core::models::{ChunkRecord, PipelineEvent};
use liveindex_core::store::memory::InMemoryIndexStore;
use liveindex_core::store::{ChunkFilter, IndexStore, ScoredChunk};

pub const WAIT: Duration = Duration::from_secs(10);

/// Hash embedder that counts calls and can be made to fail, stall, or
/// wait on a gate.
pub struct TestEmbedder {
    inner: HashEmbedder,
    pub calls: AtomicUsize,
    pub entered: AtomicUsize,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
    gate: Option<Arc<Semaphore>>,
}

impl TestEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Every call waits for one permit on the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Arc::new(Self::build(Some(gate.clone()))), gate)
    }

    fn build(gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            inner: HashEmbedder::new(64),
            calls: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            gate,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for TestEmbedder {
    fn model_name(&self) -> &str {
        "test"
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("provider unavailable");
        }
        self.inner.embed_batch(texts).await
    }
}

/// In-memory store that counts mutations and can slow down, gate, or fail
/// writes.
pub struct TestStore {
    pub inner: InMemoryIndexStore,
    pub upserts: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Upserts allowed before every further upsert fails; `usize::MAX` = never.
    pub upserts_before_failure: AtomicUsize,
    pub upsert_delay_ms: AtomicU64,
    pub fail_deletes: AtomicBool,
    /// Upserts that pass before every further upsert waits on the gate.
    ungated_upserts: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(usize::MAX, None))
    }

    /// The first `free` upserts pass; each later one waits for a permit.
    pub fn gated_after(free: usize) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Arc::new(Self::build(free, Some(gate.clone()))), gate)
    }

    fn build(free: usize, gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            inner: InMemoryIndexStore::new(),
            upserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            upserts_before_failure: AtomicUsize::new(usize::MAX),
            upsert_delay_ms: AtomicU64::new(0),
            fail_deletes: AtomicBool::new(false),
            ungated_upserts: AtomicUsize::new(free),
            gate,
        }
    }

    pub fn mutations(&self) -> usize {
        self.upserts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexStore for TestStore {
    async fn upsert(&self, chunk: &ChunkRecord) -> Result<()> {
        if let Some(gate) = &self.gate {
            let passed = self
                .ungated_upserts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !passed {
                gate.acquire().await?.forget();
            }
        }
        let delay = self.upsert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let remaining = self.upserts_before_failure.load(Ordering::SeqCst);
        if remaining == 0 {
            bail!("disk full");
        }
        if remaining != usize::MAX {
            self.upserts_before_failure.fetch_sub(1, Ordering::SeqCst);
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(chunk).await
    }

    async fn delete_by_document(&self, document_id: &str, version: Option<u64>) -> Result<usize> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_by_document(document_id, version).await
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner.search(query, k, filter).await
    }
}

/// Defaults with a short debounce and the rule set used across tests:
/// `hr/**` → 3, `management/**` → 2, everything else → 1.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.sync.debounce_ms = 30;
    config.permissions.default_level = Some(1);
    config.permissions.rules = vec![
        PermissionRule {
            pattern: "hr/**".to_string(),
            level: 3,
        },
        PermissionRule {
            pattern: "management/**".to_string(),
            level: 2,
        },
    ];
    config
}

pub fn build(
    config: Config,
    connector: &InMemoryConnector,
    embedder: Arc<TestEmbedder>,
    store: Arc<TestStore>,
) -> Arc<LiveIndex> {
    LiveIndex::with_backends(
        config,
        Backends::new(Arc::new(connector.clone()), embedder, store),
    )
    .unwrap()
}

/// Next event matching `pred`, skipping everything else.
pub async fn next_event<F>(sub: &Subscription, pred: F) -> PipelineEvent
where
    F: Fn(&PipelineEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match sub.recv().await {
                Some(HubMessage::Event(event)) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("hub closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `cond` every few milliseconds until it holds.
pub async fn eventually<F>(cond: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}
