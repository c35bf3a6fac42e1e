//! Mock embedding backend for deterministic testing.
//!
//! Generates vectors derived from the input hash so the same text always
//! embeds to the same vector, logs every network-equivalent call for
//! exactly-one-call assertions, and can be programmed to fail.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use vaultsync_core::{Error, Result};

use crate::backend::{BackendEmbedding, EmbeddingBackend};

/// Mock backend with a call log and programmable failure.
#[derive(Clone)]
pub struct MockBackend {
    id: &'static str,
    model: String,
    dimension: usize,
    fail: Arc<AtomicBool>,
    available: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    call_log: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            id: "mock",
            model: "mock-embed".to_string(),
            dimension,
            fail: Arc::new(AtomicBool::new(false)),
            available: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a distinct provider id (e.g. to act as the fallback backend).
    pub fn with_id(mut self, id: &'static str) -> Self {
        self.id = id;
        self
    }

    /// Make every subsequent embed call fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Toggle the availability probe.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of embed calls issued to this backend.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The batches this backend was asked to embed.
    pub fn call_log(&self) -> Vec<Vec<String>> {
        self.call_log.lock().unwrap().clone()
    }

    /// Deterministic vector for a text: bytes of sha256 cycled and scaled.
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        (0..self.dimension)
            .map(|i| digest[i % digest.len()] as f32 / 255.0)
            .collect()
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    fn id(&self) -> &str {
        self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<BackendEmbedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().unwrap().push(texts.to_vec());

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("mock backend failure".into()));
        }

        Ok(texts
            .iter()
            .map(|t| BackendEmbedding {
                vector: self.vector_for(t),
                tokens: Some(t.len() as u32),
            })
            .collect())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
