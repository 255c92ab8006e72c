//! Application wiring.
//!
//! [`LiveIndex`] owns one instance of every component, runs the change
//! event loop, and controls the connector watch. The HTTP server and the
//! CLI both drive it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::{self, UnboundedSender};

use liveindex_core::embedding::Embedder;
use liveindex_core::models::{ChangeEvent, DocumentSummary, QueryResult, Role, StatusSnapshot};
use liveindex_core::store::memory::InMemoryIndexStore;
use liveindex_core::store::IndexStore;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::connector::{Connector, WatchHandle};
use crate::connector_fs::FilesystemConnector;
use crate::embedding::create_embedder;
use crate::error::QueryError;
use crate::hub::{Hub, Subscription};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::permissions::Permissions;
use crate::query::{
    AnswerGenerator, ExtractiveAnswer, QueryOrchestrator, QueryRequest, QuerySettings,
};
use crate::sync::{IngestReport, SyncComponents, SyncCoordinator, SyncSettings};

/// Pluggable backends for [`LiveIndex::with_backends`].
pub struct Backends {
    pub connector: Arc<dyn Connector>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn IndexStore>,
    pub generator: Arc<dyn AnswerGenerator>,
}

impl Backends {
    pub fn new(
        connector: Arc<dyn Connector>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        Self {
            connector,
            embedder,
            store,
            generator: Arc::new(ExtractiveAnswer),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = generator;
        self
    }
}

pub struct LiveIndex {
    config: Config,
    connector: Arc<dyn Connector>,
    coordinator: SyncCoordinator,
    orchestrator: QueryOrchestrator,
    permissions: Arc<Permissions>,
    hub: Arc<Hub>,
    metrics: Arc<Metrics>,
    events: UnboundedSender<ChangeEvent>,
    watcher: Mutex<Option<WatchHandle>>,
}

impl LiveIndex {
    /// Filesystem connector, configured embedder, in-memory index store.
    /// Must be called within a Tokio runtime.
    pub fn from_config(config: Config) -> Result<Arc<Self>> {
        let backends = Backends::new(
            Arc::new(FilesystemConnector::new(&config.watch)?),
            create_embedder(&config.embedding)?,
            Arc::new(InMemoryIndexStore::new()),
        );
        Self::with_backends(config, backends)
    }

    /// Assemble from caller-supplied backends. Must be called within a
    /// Tokio runtime.
    pub fn with_backends(config: Config, backends: Backends) -> Result<Arc<Self>> {
        let Backends {
            connector,
            embedder,
            store,
            generator,
        } = backends;

        let permissions = Arc::new(Permissions::from_config(&config.permissions)?);
        let catalog = Arc::new(Catalog::new());
        let hub = Hub::new(config.hub.queue_capacity);
        let metrics = Arc::new(Metrics::new(config.metrics.window));

        let coordinator = SyncCoordinator::new(
            SyncComponents {
                connector: connector.clone(),
                embedder: embedder.clone(),
                store: store.clone(),
                catalog: catalog.clone(),
                permissions: permissions.clone(),
                hub: hub.clone(),
                metrics: metrics.clone(),
            },
            SyncSettings::from_config(&config),
        );
        let orchestrator = QueryOrchestrator::new(
            embedder,
            store,
            catalog,
            metrics.clone(),
            QuerySettings::from_config(&config),
        )
        .with_generator(generator);

        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(coordinator.clone().run(rx));

        Ok(Arc::new(Self {
            config,
            connector,
            coordinator,
            orchestrator,
            permissions,
            hub,
            metrics,
            events,
            watcher: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Scan the connector and enqueue every document.
    pub async fn ingest(&self) -> Result<IngestReport> {
        self.coordinator.ingest_all().await
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        self.orchestrator.query(request).await
    }

    /// Role for a request: a named role, an explicit level, or the least
    /// privileged configured role.
    pub fn resolve_role(&self, name: Option<&str>, level: Option<u32>) -> Result<Role, QueryError> {
        match (name, level) {
            (Some(name), _) => self.permissions.role(name),
            (None, Some(0)) => Err(QueryError::InvalidRequest(
                "role_level must be >= 1".to_string(),
            )),
            (None, Some(level)) => Ok(self.permissions.role_for_level(level)),
            (None, None) => Ok(self.permissions.default_role()),
        }
    }

    pub fn roles(&self) -> &[Role] {
        self.permissions.roles()
    }

    /// Start delivering connector change events. Returns false if already running.
    pub fn start_watcher(&self) -> Result<bool> {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.is_some() {
            return Ok(false);
        }
        *watcher = Some(self.connector.watch(self.events.clone())?);
        self.coordinator.set_watcher_active(true);
        tracing::info!(connector = self.connector.name(), "watcher started");
        Ok(true)
    }

    /// Stop the watch. Returns false if it was not running.
    pub fn stop_watcher(&self) -> bool {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let was_running = handle.is_some();
        drop(handle);
        if was_running {
            self.coordinator.set_watcher_active(false);
            tracing::info!(connector = self.connector.name(), "watcher stopped");
        }
        was_running
    }

    pub fn watcher_active(&self) -> bool {
        self.coordinator.watcher_active()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.coordinator.status()
    }

    pub fn documents(&self) -> Vec<DocumentSummary> {
        self.coordinator.documents()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Observe pipeline events, starting with a status snapshot.
    pub fn subscribe(&self) -> Subscription {
        let coordinator = self.coordinator.clone();
        self.hub.subscribe_with(move || coordinator.status())
    }

    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.coordinator.wait_idle(timeout).await
    }
}
