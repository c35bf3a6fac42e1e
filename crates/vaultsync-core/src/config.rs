//! Sync configuration: closed enums for mode and execution order,
//! validated once at construction.

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Which store(s) a task must write to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Chunks + embeddings only.
    VectorOnly,
    /// Entity/relationship graph only.
    GraphOnly,
    /// Both stores must succeed for a task to complete.
    #[default]
    Hybrid,
}

impl SyncMode {
    pub fn wants_vector(&self) -> bool {
        matches!(self, Self::VectorOnly | Self::Hybrid)
    }

    pub fn wants_graph(&self) -> bool {
        matches!(self, Self::GraphOnly | Self::Hybrid)
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vector-only" | "vector" => Ok(Self::VectorOnly),
            "graph-only" | "graph" => Ok(Self::GraphOnly),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(format!("Invalid sync mode: {}", s)),
        }
    }
}

/// Order in which the two stages of a hybrid write run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionOrder {
    #[default]
    VectorFirst,
    GraphFirst,
    /// Both stages started concurrently; fails if either fails, with no
    /// ordering between their effects.
    Parallel,
}

impl std::str::FromStr for ExecutionOrder {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vector-first" => Ok(Self::VectorFirst),
            "graph-first" => Ok(Self::GraphFirst),
            "parallel" => Ok(Self::Parallel),
            _ => Err(format!("Invalid execution order: {}", s)),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}
fn default_max_concurrency() -> usize {
    defaults::MAX_CONCURRENCY
}
fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}
fn default_retry_base_delay_ms() -> u64 {
    defaults::RETRY_BASE_DELAY_MS
}
fn default_retry_max_delay_ms() -> u64 {
    defaults::RETRY_MAX_DELAY_MS
}
fn default_queue_capacity() -> usize {
    defaults::QUEUE_CAPACITY
}
fn default_graph_batch_limit() -> usize {
    defaults::GRAPH_BATCH_LIMIT
}
fn default_cache_ttl_secs() -> u64 {
    defaults::CACHE_TTL_SECS
}
fn default_cache_max_entries() -> usize {
    defaults::CACHE_MAX_ENTRIES
}
fn default_offline_capacity() -> usize {
    defaults::OFFLINE_CAPACITY
}
fn default_offline_max_retries() -> u32 {
    defaults::OFFLINE_MAX_RETRIES
}
fn default_embedding_dimension() -> usize {
    defaults::EMBED_DIMENSION
}
fn default_true() -> bool {
    true
}

/// Top-level configuration for the synchronization engine.
///
/// Deserializable from JSON/TOML with per-field defaults; call
/// [`SyncConfig::validate`] once after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default)]
    pub order: ExecutionOrder,
    /// In hybrid mode, fail immediately if either stage is unavailable
    /// instead of silently running one side only.
    #[serde(default = "default_true")]
    pub require_dual_write: bool,
    /// Project namespace scoping all store rows and graph nodes.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_graph_batch_limit")]
    pub graph_batch_limit: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_offline_capacity")]
    pub offline_capacity: usize,
    #[serde(default = "default_offline_max_retries")]
    pub offline_max_retries: u32,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config deserializes with defaults")
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VAULTSYNC_MODE` | `hybrid` | vector-only, graph-only, hybrid |
    /// | `VAULTSYNC_ORDER` | `vector-first` | vector-first, graph-first, parallel |
    /// | `VAULTSYNC_NAMESPACE` | `default` | project namespace |
    /// | `VAULTSYNC_MAX_CONCURRENCY` | `3` | worker slots |
    /// | `VAULTSYNC_MAX_RETRIES` | `3` | per-task retry budget |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("VAULTSYNC_MODE") {
            if let Ok(mode) = v.parse() {
                config.mode = mode;
            }
        }
        if let Ok(v) = std::env::var("VAULTSYNC_ORDER") {
            if let Ok(order) = v.parse() {
                config.order = order;
            }
        }
        if let Ok(v) = std::env::var("VAULTSYNC_NAMESPACE") {
            config.namespace = v;
        }
        if let Ok(v) = std::env::var("VAULTSYNC_MAX_CONCURRENCY") {
            if let Ok(n) = v.parse::<usize>() {
                config.max_concurrency = n.max(1);
            }
        }
        if let Ok(v) = std::env::var("VAULTSYNC_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                config.max_retries = n;
            }
        }
        config
    }

    /// Validate field ranges. Called once at engine construction; a config
    /// error here means no task is ever attempted.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("namespace must not be empty".into()));
        }
        if self.max_concurrency == 0 || self.max_concurrency > 16 {
            return Err(Error::Config(format!(
                "max_concurrency must be in 1..=16, got {}",
                self.max_concurrency
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be positive".into()));
        }
        if self.graph_batch_limit == 0 {
            return Err(Error::Config("graph_batch_limit must be positive".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(Error::Config("embedding_dimension must be positive".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(Error::Config(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Backoff delay in milliseconds for the given retry count:
    /// base × 2^retries, capped.
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        let factor = 2u64.saturating_pow(retry_count);
        self.retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms)
    }
}
