//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or [`Config::default`])
//! yields a working offline setup: the `hash` embedder, the in-memory
//! index store, and a filesystem connector rooted at `./documents`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use liveindex_core::chunk::ChunkParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Start the watcher when the server starts.
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            auto_start: true,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.markdown".to_string(),
    ]
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_concurrent_cycles")]
    pub max_concurrent_cycles: usize,
    /// Upper bound on reading one document from the connector.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_concurrent_cycles: default_max_concurrent_cycles(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_debounce_ms() -> u64 {
    500
}
fn default_max_concurrent_cycles() -> usize {
    8
}
fn default_read_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target segment size in UTF-8 bytes.
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            target_size: self.target_size,
            overlap: self.overlap,
        }
    }
}

fn default_target_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_store_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Candidates fetched per requested result, absorbing filter losses.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    50
}
fn default_overfetch_factor() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PermissionsConfig {
    #[serde(default = "default_roles")]
    pub roles: Vec<RoleConfig>,
    /// First matching rule wins.
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
    /// Level for documents no rule matches. Unset by default, which
    /// restricts such documents to the highest role.
    #[serde(default)]
    pub default_level: Option<u32>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            rules: Vec::new(),
            default_level: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleConfig {
    pub name: String,
    pub level: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PermissionRule {
    pub pattern: String,
    pub level: u32,
}

fn default_roles() -> Vec<RoleConfig> {
    vec![
        RoleConfig {
            name: "employee".to_string(),
            level: 1,
        },
        RoleConfig {
            name: "manager".to_string(),
            level: 2,
        },
        RoleConfig {
            name: "admin".to_string(),
            level: 3,
        },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

fn default_window() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.target_size == 0 {
        bail!("chunking.target_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.target_size {
        bail!("chunking.overlap must be < chunking.target_size");
    }

    // Retrieval
    if config.retrieval.default_top_k < 1 {
        bail!("retrieval.default_top_k must be >= 1");
    }
    if config.retrieval.max_top_k < config.retrieval.default_top_k {
        bail!("retrieval.max_top_k must be >= retrieval.default_top_k");
    }
    if config.retrieval.overfetch_factor < 1 {
        bail!("retrieval.overfetch_factor must be >= 1");
    }

    // Sync
    if config.sync.max_concurrent_cycles < 1 {
        bail!("sync.max_concurrent_cycles must be >= 1");
    }

    // Hub and metrics
    if config.hub.queue_capacity < 1 {
        bail!("hub.queue_capacity must be >= 1");
    }
    if config.metrics.window < 1 {
        bail!("metrics.window must be >= 1");
    }

    // Permissions
    if config.permissions.roles.is_empty() {
        bail!("permissions.roles must define at least one role");
    }
    if let Some(role) = config.permissions.roles.iter().find(|r| r.level < 1) {
        bail!("permissions.roles: level of '{}' must be >= 1", role.name);
    }
    if let Some(rule) = config.permissions.rules.iter().find(|r| r.level < 1) {
        bail!("permissions.rules: level for '{}' must be >= 1", rule.pattern);
    }
    if config.permissions.default_level == Some(0) {
        bail!("permissions.default_level must be >= 1");
    }

    // Embedding
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }

    Ok(())
}
