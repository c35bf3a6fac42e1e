//! HTTP embedding backends.
//!
//! Two concrete backends ship: [`OllamaBackend`] against `/api/embed` and
//! [`OpenAiBackend`] against `/v1/embeddings`. Both are thin reqwest clients
//! with bounded timeouts; fallback routing and caching live in
//! [`crate::embedder::FallbackEmbedder`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use vaultsync_core::{defaults, Error, Result};

/// A provider that turns a batch of texts into raw vectors.
///
/// Returned vectors are *not* dimension-normalized; the embedder layer
/// owns normalization so every backend can report its native size.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Provider identifier, e.g. `"ollama"`.
    fn id(&self) -> &str;

    /// Model slug this backend embeds with.
    fn model(&self) -> &str;

    /// Native output dimensionality.
    fn dimension(&self) -> usize;

    /// Embed a batch, one vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<BackendEmbedding>>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

/// One raw embedding plus provider-reported token usage.
#[derive(Debug, Clone)]
pub struct BackendEmbedding {
    pub vector: Vec<f32>,
    pub tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

/// Local Ollama embedding backend.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            timeout_secs: defaults::EMBED_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn id(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    #[instrument(skip(self, texts), fields(component = "embedder", op = "embed_batch", provider = "ollama", model = %self.model, input_count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<BackendEmbedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let request = OllamaEmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Ollama returned {} embeddings for {} inputs",
                result.embeddings.len(),
                texts.len()
            )));
        }

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = result.embeddings.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > 5000 {
            warn!(duration_ms = elapsed, slow = true, "Slow embedding operation");
        }

        let tokens = result.prompt_eval_count;
        Ok(result
            .embeddings
            .into_iter()
            .map(|vector| BackendEmbedding { vector, tokens })
            .collect())
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

/// OpenAI-compatible embedding backend, used as the fallback provider.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            timeout_secs: defaults::EMBED_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    #[instrument(skip(self, texts), fields(component = "embedder", op = "embed_batch", provider = "openai", model = %self.model, input_count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<BackendEmbedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = OpenAiEmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "OpenAI returned {}: {}",
                status, body
            )));
        }

        let result: OpenAiEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                result.data.len(),
                texts.len()
            )));
        }

        // Responses may arrive out of order; the index field is authoritative.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        let tokens = result.usage.map(|u| u.prompt_tokens);

        Ok(data
            .into_iter()
            .map(|d| BackendEmbedding {
                vector: d.embedding,
                tokens,
            })
            .collect())
    }

    async fn is_available(&self) -> bool {
        // A credentialed backend is assumed reachable; the first real call
        // surfaces authoritative errors.
        !self.api_key.is_empty()
    }
}
