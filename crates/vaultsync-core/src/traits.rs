//! Core traits for vaultsync abstractions.
//!
//! These traits define the seams between the synchronization engine and its
//! collaborators. Store clients, embedders, chunkers, and extractors are all
//! injected as trait objects so tests can substitute fakes per test.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Chunk, ChunkText, EmbeddingResult, ExtractionResult, ItemMetadata, OfflineOperation,
    VectorizationStatus,
};

/// Options passed to the chunker collaborator.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Overlap characters between adjacent chunks.
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap: 100,
        }
    }
}

/// Text chunking collaborator. Must be deterministic for the same input
/// and options.
pub trait Chunker: Send + Sync {
    fn split(&self, content: &str, options: &ChunkOptions) -> Vec<ChunkText>;
}

/// Content loader for an item path. The change-event source supplies
/// metadata only; the pipeline pulls current content through this seam.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn load(&self, path: &str) -> Result<String>;
}

/// Entity/relationship extraction collaborator.
///
/// `None` means no extraction result is available for this item; the graph
/// write then merges only the document and chunk nodes. Relationships
/// referencing entities that were not merged must be filterable without
/// erroring.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(
        &self,
        content: &str,
        metadata: &ItemMetadata,
    ) -> Result<Option<ExtractionResult>>;
}

/// Vector store client: chunk rows plus a durable per-item status record.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Resolve or create the item's status record, replace its chunk set
    /// (delete existing rows, insert the new ones), and return the status id.
    /// Per-item writes are serialized against concurrent deletes.
    async fn upsert_chunks(&self, metadata: &ItemMetadata, chunks: &[Chunk]) -> Result<Uuid>;

    /// Delete all chunk rows for a status record, verifying convergence to
    /// zero remaining rows. Idempotent.
    async fn delete_document_chunks(&self, status_id: Uuid) -> Result<()>;

    /// Fetch the current chunk set for an item.
    async fn get_document_chunks(&self, status_id: Uuid) -> Result<Vec<Chunk>>;

    /// Look up the durable status-record id for an item path, if present.
    async fn get_file_status_id_by_path(&self, path: &str) -> Result<Option<Uuid>>;

    /// Record the item's vectorization state on its status row.
    async fn update_vectorization_status(
        &self,
        metadata: &ItemMetadata,
        status: VectorizationStatus,
    ) -> Result<()>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

/// Graph store client: document/chunk/entity nodes and their edges, scoped
/// by project namespace.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge the document node, its chunk nodes/edges (in bounded batches),
    /// remove orphaned chunk nodes, and merge extraction results if present.
    async fn upsert_document_graph(
        &self,
        metadata: &ItemMetadata,
        chunks: &[Chunk],
        extraction: Option<&ExtractionResult>,
    ) -> Result<()>;

    /// Cascade-delete the document node and its solely-owned chunk edges.
    async fn delete_document(&self, path: &str) -> Result<()>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

/// Embedding provider seam: batch text → vectors plus usage metadata.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate one embedding per input text, in input order. All vectors
    /// are normalized to [`Embedder::dimension`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>>;

    /// Fixed dimensionality of returned vectors.
    fn dimension(&self) -> usize;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

/// Replay target for the offline durability queue: applies a persisted
/// operation against the relevant store(s).
#[async_trait]
pub trait OfflineReplay: Send + Sync {
    async fn replay(&self, op: &OfflineOperation) -> Result<()>;

    /// Connectivity judgment gating replay.
    async fn is_connected(&self) -> bool;
}
