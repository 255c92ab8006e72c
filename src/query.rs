//! Query orchestrator.
//!
//! `embed → pin catalog → search (over-fetch) → retain committed →
//! filter by role → rank → answer`. Permission filtering is its own stage
//! after retrieval, so the store is asked for `top_k × overfetch_factor`
//! candidates to absorb what the filters drop.
//!
//! The number of chunks hidden by the role filter is logged at debug
//! level and never returned to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use liveindex_core::embedding::Embedder;
use liveindex_core::models::{QueryResult, QueryStatus, Role, Source};
use liveindex_core::rank::{filter_by_role, rank_sources, retain_committed};
use liveindex_core::store::IndexStore;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::QueryError;
use crate::metrics::Metrics;
use crate::sync::bounded;

pub const NO_ACCESSIBLE_RESULTS: &str = "No relevant documents found for your query.";
pub const DEGRADED_ANSWER: &str = "Search is temporarily unavailable. Please try again.";

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    /// Defaults to `retrieval.default_top_k`; capped at `retrieval.max_top_k`.
    pub top_k: Option<usize>,
    pub role: Role,
    /// Restrict the search to one document.
    pub document_id: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, role: Role) -> Self {
        Self {
            text: text.into(),
            top_k: None,
            role,
            document_id: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Turns ranked sources into answer text.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, sources: &[Source]) -> Result<String>;
}

/// Returns the best source verbatim plus a count of the others.
pub struct ExtractiveAnswer;

#[async_trait]
impl AnswerGenerator for ExtractiveAnswer {
    async fn generate(&self, _question: &str, sources: &[Source]) -> Result<String> {
        let Some(top) = sources.first() else {
            return Ok(NO_ACCESSIBLE_RESULTS.to_string());
        };
        let mut answer = top.text.trim().to_string();
        if sources.len() > 1 {
            answer.push_str(&format!(
                "\n\n[{} additional relevant sections found]",
                sources.len() - 1
            ));
        }
        Ok(answer)
    }
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub overfetch_factor: usize,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
}

impl QuerySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_top_k: config.retrieval.default_top_k,
            max_top_k: config.retrieval.max_top_k,
            overfetch_factor: config.retrieval.overfetch_factor,
            embed_timeout: config.embedding.timeout(),
            store_timeout: config.store.timeout(),
        }
    }
}

pub struct QueryOrchestrator {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    catalog: Arc<Catalog>,
    metrics: Arc<Metrics>,
    generator: Arc<dyn AnswerGenerator>,
    settings: QuerySettings,
}

impl QueryOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        catalog: Arc<Catalog>,
        metrics: Arc<Metrics>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            embedder,
            store,
            catalog,
            metrics,
            generator: Arc::new(ExtractiveAnswer),
            settings,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Answer `request` from chunks the caller's role may see.
    ///
    /// Backend failures produce a [`QueryStatus::Degraded`] result rather
    /// than an error; only malformed requests return `Err`.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(QueryError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        if request.top_k == Some(0) {
            return Err(QueryError::InvalidRequest("top_k must be >= 1".to_string()));
        }
        let k = request
            .top_k
            .unwrap_or(self.settings.default_top_k)
            .min(self.settings.max_top_k);

        let started = Instant::now();
        let (answer, sources, status) = match self.retrieve(text, k, &request).await {
            Ok(sources) if sources.is_empty() => (
                NO_ACCESSIBLE_RESULTS.to_string(),
                sources,
                QueryStatus::NoAccessibleResults,
            ),
            Ok(sources) => match self.generator.generate(text, &sources).await {
                Ok(answer) => (answer, sources, QueryStatus::Answered),
                Err(e) => {
                    let reason = format!("answer generation failed: {:#}", e);
                    tracing::warn!(error = %reason, "query degraded");
                    (DEGRADED_ANSWER.to_string(), sources, QueryStatus::Degraded { reason })
                }
            },
            Err(reason) => {
                tracing::warn!(error = %reason, "query degraded");
                (
                    DEGRADED_ANSWER.to_string(),
                    Vec::new(),
                    QueryStatus::Degraded { reason },
                )
            }
        };

        let latency_ms = (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
        self.metrics.record_query(latency_ms);
        tracing::info!(
            role = %request.role.name,
            results = sources.len(),
            latency_ms,
            "query served"
        );

        Ok(QueryResult {
            answer,
            sources,
            latency_ms,
            status,
        })
    }

    async fn retrieve(
        &self,
        text: &str,
        k: usize,
        request: &QueryRequest,
    ) -> Result<Vec<Source>, String> {
        let vector = bounded(self.settings.embed_timeout, "embed", self.embedder.embed(text)).await?;

        let fetch = k.saturating_mul(self.settings.overfetch_factor.max(1));

        let committed = {
            let pin = self.catalog.pin().await;
            let mut filter = pin.filter();
            filter.document_id = request.document_id.clone();
            let candidates = bounded(
                self.settings.store_timeout,
                "search",
                self.store.search(&vector, fetch, Some(&filter)),
            )
            .await?;
            // A store may ignore the version predicate.
            retain_committed(candidates, |doc| pin.committed_version(doc))
        };

        let filtered = filter_by_role(committed, &request.role);
        if filtered.hidden > 0 {
            tracing::debug!(
                role = %request.role.name,
                hidden = filtered.hidden,
                "chunks hidden by permission filter"
            );
        }
        Ok(rank_sources(filtered.visible, k))
    }
}
