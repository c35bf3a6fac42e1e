//! Cache-aware embedder with primary/fallback provider routing.
//!
//! For each text: a fresh cache hit returns without any network call;
//! otherwise the primary backend is tried, and on failure the secondary
//! backend only if fallback is enabled. Every vector is normalized to the
//! configured dimensionality before being cached or returned, so downstream
//! stores never receive mismatched-dimension vectors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use vaultsync_core::{Embedder, EmbeddingResult, Error, Result};

use crate::backend::EmbeddingBackend;
use crate::cache::EmbeddingCache;

/// Normalize a vector to `dimension`: truncate if longer, zero-pad if
/// shorter.
pub fn normalize_dimension(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    vector.truncate(dimension);
    vector.resize(dimension, 0.0);
    vector
}

/// Embedder backed by a primary provider, an optional fallback provider,
/// and a content-addressed cache.
pub struct FallbackEmbedder {
    primary: Arc<dyn EmbeddingBackend>,
    secondary: Option<Arc<dyn EmbeddingBackend>>,
    cache: Arc<EmbeddingCache>,
    dimension: usize,
}

impl FallbackEmbedder {
    pub fn new(
        primary: Arc<dyn EmbeddingBackend>,
        secondary: Option<Arc<dyn EmbeddingBackend>>,
        cache: Arc<EmbeddingCache>,
        dimension: usize,
    ) -> Self {
        Self {
            primary,
            secondary,
            cache,
            dimension,
        }
    }

    /// Embed one uncached text through primary-then-fallback routing.
    async fn embed_uncached(&self, text: &str) -> Result<(EmbeddingResult, String)> {
        let batch = [text.to_string()];
        match self.primary.embed_batch(&batch).await {
            Ok(mut results) => {
                let raw = results.remove(0);
                let key = EmbeddingCache::key(self.primary.id(), self.primary.model(), text);
                Ok((
                    EmbeddingResult {
                        vector: normalize_dimension(raw.vector, self.dimension),
                        tokens: raw.tokens,
                        provider_model: format!("{}:{}", self.primary.id(), self.primary.model()),
                    },
                    key,
                ))
            }
            Err(primary_err) => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_err);
                };
                warn!(
                    component = "embedder",
                    error = %primary_err,
                    fallback = secondary.id(),
                    "Primary embedding provider failed, trying fallback"
                );
                let mut results = secondary.embed_batch(&batch).await.map_err(|e| {
                    Error::Embedding(format!(
                        "primary failed ({}), fallback failed ({})",
                        primary_err, e
                    ))
                })?;
                let raw = results.remove(0);
                let key = EmbeddingCache::key(secondary.id(), secondary.model(), text);
                Ok((
                    EmbeddingResult {
                        vector: normalize_dimension(raw.vector, self.dimension),
                        tokens: raw.tokens,
                        provider_model: format!("{}:{}", secondary.id(), secondary.model()),
                    },
                    key,
                ))
            }
        }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        let mut results = Vec::with_capacity(texts.len());
        let primary_model = format!("{}:{}", self.primary.id(), self.primary.model());

        for text in texts {
            let key = EmbeddingCache::key(self.primary.id(), self.primary.model(), text);
            if let Some(vector) = self.cache.get(&key).await {
                debug!(component = "embedder", op = "embed", cache = "hit");
                results.push(EmbeddingResult {
                    vector,
                    tokens: None,
                    provider_model: primary_model.clone(),
                });
                continue;
            }

            // Vectors produced during fallback are keyed to the secondary
            // provider; they stay usable without another network round trip.
            if let Some(secondary) = &self.secondary {
                let key = EmbeddingCache::key(secondary.id(), secondary.model(), text);
                if let Some(vector) = self.cache.get(&key).await {
                    debug!(component = "embedder", op = "embed", cache = "fallback-hit");
                    results.push(EmbeddingResult {
                        vector,
                        tokens: None,
                        provider_model: format!("{}:{}", secondary.id(), secondary.model()),
                    });
                    continue;
                }
            }

            let (result, cache_key) = self.embed_uncached(text).await?;
            self.cache.put(cache_key, result.vector.clone()).await?;
            results.push(result);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn is_available(&self) -> bool {
        if self.primary.is_available().await {
            return true;
        }
        match &self.secondary {
            Some(secondary) => secondary.is_available().await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn embedder_with(
        primary: MockBackend,
        secondary: Option<MockBackend>,
        dimension: usize,
    ) -> FallbackEmbedder {
        FallbackEmbedder::new(
            Arc::new(primary),
            secondary.map(|b| Arc::new(b) as Arc<dyn EmbeddingBackend>),
            Arc::new(EmbeddingCache::in_memory(3600, 100)),
            dimension,
        )
    }

    #[test]
    fn test_normalize_truncates() {
        assert_eq!(normalize_dimension(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    }

    #[test]
    fn test_normalize_zero_pads() {
        assert_eq!(normalize_dimension(vec![1.0], 3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_exact_passthrough() {
        assert_eq!(normalize_dimension(vec![1.0, 2.0], 2), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_cache_hit_issues_one_network_call() {
        let primary = MockBackend::new(8);
        let embedder = embedder_with(primary.clone(), None, 8);

        let first = embedder.embed(&["hello".to_string()]).await.unwrap();
        let second = embedder.embed(&["hello".to_string()]).await.unwrap();

        assert_eq!(primary.call_count(), 1);
        assert_eq!(first[0].vector, second[0].vector);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_fresh_call() {
        let primary = MockBackend::new(8);
        let embedder = FallbackEmbedder::new(
            Arc::new(primary.clone()),
            None,
            Arc::new(EmbeddingCache::in_memory(0, 100)),
            8,
        );

        embedder.embed(&["hello".to_string()]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        embedder.embed(&["hello".to_string()]).await.unwrap();

        assert_eq!(primary.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_on_primary_failure() {
        let primary = MockBackend::new(8);
        primary.set_failing(true);
        let secondary = MockBackend::new(8).with_id("fallback");

        let embedder = embedder_with(primary.clone(), Some(secondary.clone()), 8);
        let results = embedder.embed(&["text".to_string()]).await.unwrap();

        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
        assert_eq!(results[0].provider_model, "fallback:mock-embed");
    }

    #[tokio::test]
    async fn test_fallback_result_served_from_cache() {
        let primary = MockBackend::new(8);
        primary.set_failing(true);
        let secondary = MockBackend::new(8).with_id("fallback");
        let embedder = embedder_with(primary.clone(), Some(secondary.clone()), 8);

        embedder.embed(&["text".to_string()]).await.unwrap();
        let second = embedder.embed(&["text".to_string()]).await.unwrap();

        // The cached fallback vector answers; neither provider is called again.
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
        assert_eq!(second[0].provider_model, "fallback:mock-embed");
    }

    #[tokio::test]
    async fn test_no_fallback_propagates_primary_error() {
        let primary = MockBackend::new(8);
        primary.set_failing(true);
        let embedder = embedder_with(primary, None, 8);

        let err = embedder.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_both_providers_failing_reports_both() {
        let primary = MockBackend::new(8);
        primary.set_failing(true);
        let secondary = MockBackend::new(8).with_id("fallback");
        secondary.set_failing(true);

        let embedder = embedder_with(primary, Some(secondary), 8);
        let err = embedder.embed(&["text".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("fallback failed"));
    }

    #[tokio::test]
    async fn test_vectors_normalized_to_dimension() {
        // Backend emits 16-dim vectors, embedder clamps to 8.
        let primary = MockBackend::new(16);
        let embedder = embedder_with(primary, None, 8);

        let results = embedder.embed(&["text".to_string()]).await.unwrap();
        assert_eq!(results[0].vector.len(), 8);
    }

    #[tokio::test]
    async fn test_order_preserved_across_mixed_hits() {
        let primary = MockBackend::new(8);
        let embedder = embedder_with(primary.clone(), None, 8);

        // Warm "b" so the second batch mixes a miss and a hit.
        embedder.embed(&["b".to_string()]).await.unwrap();
        let results = embedder
            .embed(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        // "a" and "c" were fresh calls, "b" came from cache.
        assert_eq!(primary.call_count(), 3);
    }

    #[tokio::test]
    async fn test_availability_falls_back() {
        let primary = MockBackend::new(8);
        primary.set_available(false);
        let secondary = MockBackend::new(8).with_id("fallback");

        let embedder = embedder_with(primary.clone(), Some(secondary), 8);
        assert!(embedder.is_available().await);

        let embedder_solo = embedder_with(primary, None, 8);
        assert!(!embedder_solo.is_available().await);
    }
}
