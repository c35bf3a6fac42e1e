//! # vaultsync-embed
//!
//! Embedding providers and the content-addressed embedding cache for
//! vaultsync.
//!
//! This crate provides:
//! - HTTP embedding backends (Ollama primary, OpenAI fallback)
//! - [`FallbackEmbedder`], the cache-aware primary/fallback router that
//!   implements the [`vaultsync_core::Embedder`] seam
//! - [`EmbeddingCache`] with TTL expiry, bounded size, and JSON persistence
//! - [`MockBackend`] for deterministic tests
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vaultsync_embed::{EmbeddingCache, FallbackEmbedder, OllamaBackend};
//! use vaultsync_core::Embedder;
//!
//! let cache = Arc::new(EmbeddingCache::load("cache.json".into(), 604_800, 10_000).await);
//! let primary = Arc::new(OllamaBackend::new("http://localhost:11434", "nomic-embed-text", 768));
//! let embedder = FallbackEmbedder::new(primary, None, cache, 768);
//! let results = embedder.embed(&["chunk text".to_string()]).await?;
//! ```

pub mod backend;
pub mod cache;
pub mod embedder;
pub mod mock;

pub use backend::{BackendEmbedding, EmbeddingBackend, OllamaBackend, OpenAiBackend};
pub use cache::{CachedEmbedding, EmbeddingCache};
pub use embedder::{normalize_dimension, FallbackEmbedder};
pub use mock::MockBackend;
