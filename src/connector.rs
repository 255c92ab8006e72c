//! Source connectors.
//!
//! A [`Connector`] enumerates documents, reads their raw content, and
//! reports changes as [`ChangeEvent`]s on a channel. The filesystem
//! implementation lives in [`crate::connector_fs`]; [`InMemoryConnector`]
//! backs tests and embedded uses where documents are pushed from code.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use liveindex_core::models::{ChangeEvent, ChangeKind};

/// Raw content of one document as read from its source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub bytes: Vec<u8>,
    /// Access level asserted by the source itself. When set it overrides
    /// configured permission rules.
    pub permission_level: Option<u32>,
    /// Source modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceDocument {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            permission_level: None,
            updated_at: None,
        }
    }

    pub fn with_permission_level(mut self, level: u32) -> Self {
        self.permission_level = Some(level);
        self
    }
}

/// Keeps a watch alive. Dropping it stops change delivery.
pub struct WatchHandle {
    _guard: Box<dyn Any + Send>,
}

impl WatchHandle {
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

/// A source of documents and change notifications.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short identifier used in logs (e.g. `"filesystem"`).
    fn name(&self) -> &str;

    /// Every document id currently present in the source.
    async fn list_documents(&self) -> Result<Vec<String>>;

    /// Read one document. `Ok(None)` means it no longer exists.
    async fn get_content(&self, doc_id: &str) -> Result<Option<SourceDocument>>;

    /// Start delivering change events to `sink` until the returned handle
    /// is dropped.
    fn watch(&self, sink: UnboundedSender<ChangeEvent>) -> Result<WatchHandle>;
}

/// Documents held in memory. `set` and `remove` notify the active watch.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Default)]
struct InMemoryState {
    docs: BTreeMap<String, SourceDocument>,
    sink: Option<UnboundedSender<ChangeEvent>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document and emit `Created` or `Modified`.
    pub fn set(&self, doc_id: &str, doc: SourceDocument) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let kind = if state.docs.insert(doc_id.to_string(), doc).is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Created
        };
        state.notify(ChangeEvent::new(kind, doc_id));
    }

    /// Shorthand for [`set`](Self::set) with plain text content.
    pub fn set_text(&self, doc_id: &str, text: &str) {
        self.set(doc_id, SourceDocument::new(text.as_bytes().to_vec()));
    }

    /// Remove a document and emit `Deleted`. Returns false if it was absent.
    pub fn remove(&self, doc_id: &str) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let existed = state.docs.remove(doc_id).is_some();
        if existed {
            state.notify(ChangeEvent::new(ChangeKind::Deleted, doc_id));
        }
        existed
    }
}

impl InMemoryState {
    fn notify(&mut self, event: ChangeEvent) {
        if let Some(sink) = &self.sink {
            if sink.send(event).is_err() {
                self.sink = None;
            }
        }
    }
}

/// Clears the sink when the watch handle is dropped.
struct InMemoryWatch {
    inner: Arc<Mutex<InMemoryState>>,
}

impl Drop for InMemoryWatch {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink = None;
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_documents(&self) -> Result<Vec<String>> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.docs.keys().cloned().collect())
    }

    async fn get_content(&self, doc_id: &str) -> Result<Option<SourceDocument>> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.docs.get(doc_id).cloned())
    }

    fn watch(&self, sink: UnboundedSender<ChangeEvent>) -> Result<WatchHandle> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink = Some(sink);
        Ok(WatchHandle::new(InMemoryWatch {
            inner: self.inner.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_set_and_get() {
        let conn = InMemoryConnector::new();
        conn.set_text("a.md", "hello");
        let doc = conn.get_content("a.md").await.unwrap().unwrap();
        assert_eq!(doc.bytes, b"hello");
        assert!(conn.get_content("missing.md").await.unwrap().is_none());
        assert_eq!(conn.list_documents().await.unwrap(), vec!["a.md"]);
    }

    #[tokio::test]
    async fn test_watch_emits_kinds() {
        let conn = InMemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = conn.watch(tx).unwrap();

        conn.set_text("a.md", "one");
        conn.set_text("a.md", "two");
        assert!(conn.remove("a.md"));
        assert!(!conn.remove("a.md"));

        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Created);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Modified);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Deleted);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_events() {
        let conn = InMemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = conn.watch(tx).unwrap();
        drop(handle);

        conn.set_text("a.md", "one");
        // The only sender was owned by the watch, so the channel is closed.
        assert!(rx.recv().await.is_none());
    }
}
