//! Content-addressed embedding cache with TTL expiry and bounded size.
//!
//! Entries are keyed by sha256(provider:model:sha256(text)), so identical
//! text under the same provider/model never triggers a second network call
//! while the entry is fresh. The cache persists as JSON next to the engine's
//! other local state and survives restarts; expired entries are dropped at
//! load time.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use vaultsync_core::{Error, Result};

/// One cached vector plus its creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEmbedding {
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheState {
    entries: HashMap<String, CachedEmbedding>,
    /// Insertion order for oldest-first eviction.
    order: Vec<String>,
}

/// Shared, persistent embedding cache.
///
/// Entries are content-addressed and therefore idempotent, so last-writer-
/// wins across concurrent workers is acceptable; a single async mutex guards
/// the map and the persistence file.
pub struct EmbeddingCache {
    state: Mutex<CacheState>,
    path: Option<PathBuf>,
    ttl: Duration,
    max_entries: usize,
}

impl EmbeddingCache {
    /// In-memory cache without persistence (tests, ephemeral runs).
    pub fn in_memory(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            path: None,
            ttl: Duration::seconds(ttl_secs as i64),
            max_entries,
        }
    }

    /// Cache persisted at `path`, loading any prior state. Expired entries
    /// are discarded during load. A corrupt or missing file starts empty.
    pub async fn load(path: PathBuf, ttl_secs: u64, max_entries: usize) -> Self {
        let ttl = Duration::seconds(ttl_secs as i64);
        let mut state = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<CacheState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt embedding cache, starting empty");
                    CacheState::default()
                }
            },
            Err(_) => CacheState::default(),
        };

        let cutoff = Utc::now() - ttl;
        state.entries.retain(|_, v| v.created_at > cutoff);
        state.order.retain(|k| state.entries.contains_key(k));
        debug!(
            entries = state.entries.len(),
            path = %path.display(),
            "Embedding cache loaded"
        );

        Self {
            state: Mutex::new(state),
            path: Some(path),
            ttl,
            max_entries,
        }
    }

    /// Cache key for (provider, model, text).
    pub fn key(provider: &str, model: &str, text: &str) -> String {
        let mut text_hasher = Sha256::new();
        text_hasher.update(text.as_bytes());
        let text_hash = hex::encode(text_hasher.finalize());

        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update(b":");
        hasher.update(model.as_bytes());
        hasher.update(b":");
        hasher.update(text_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fetch a non-expired vector for the key. Expired entries are removed
    /// rather than returned.
    pub async fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut state = self.state.lock().await;
        let expired = match state.entries.get(key) {
            Some(entry) if Utc::now() - entry.created_at <= self.ttl => {
                return Some(entry.vector.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
            state.order.retain(|k| k != key);
        }
        None
    }

    /// Insert a vector, evicting the oldest entry once past `max_entries`,
    /// then persist.
    pub async fn put(&self, key: String, vector: Vec<f32>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if !state.entries.contains_key(&key) {
                state.order.push(key.clone());
            }
            state.entries.insert(
                key,
                CachedEmbedding {
                    vector,
                    created_at: Utc::now(),
                },
            );

            while state.entries.len() > self.max_entries {
                if let Some(oldest) = state.order.first().cloned() {
                    state.order.remove(0);
                    state.entries.remove(&oldest);
                } else {
                    break;
                }
            }
        }
        self.persist().await
    }

    /// Current entry count.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = {
            let state = self.state.lock().await;
            serde_json::to_vec(&*state)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }
}
