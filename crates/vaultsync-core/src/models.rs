//! Core data model: tasks, chunks, graph entities, offline operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::defaults;

/// The kind of change a task applies to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Create,
    Update,
    Delete,
    Rename,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Rename => write!(f, "rename"),
        }
    }
}

impl TaskKind {
    /// Default queue priority for this kind. Deletes outrank upserts.
    pub fn default_priority(&self) -> i32 {
        match self {
            Self::Delete => defaults::PRIORITY_DELETE,
            _ => defaults::PRIORITY_UPSERT,
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

/// Content-item attributes carried by every task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// External identifier assigned by the change-event source.
    pub external_id: Option<String>,
    /// Stable item path (the logical identity).
    pub path: String,
    /// Human-readable name.
    pub name: String,
    /// Last modification time (unix millis).
    pub mtime: i64,
    /// Creation time (unix millis).
    pub ctime: i64,
    /// Content size in bytes.
    pub size: u64,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
    pub links: Vec<String>,
    /// Hex sha256 of content, used for idempotence.
    pub content_hash: String,
    /// Previous path, set only on rename events.
    pub old_path: Option<String>,
}

impl ItemMetadata {
    /// Compute the hex sha256 content hash used for idempotence checks.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A unit of ingestion work. One task per logical item identity may be
/// queued at a time; supersede rules live in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Stable item identity; the dedup key.
    pub item_path: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: ItemMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task for the given kind and metadata.
    pub fn new(kind: TaskKind, metadata: ItemMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            item_path: metadata.path.clone(),
            kind,
            status: TaskStatus::Pending,
            priority: kind.default_priority(),
            retry_count: 0,
            max_retries: defaults::MAX_RETRIES,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining retry budget.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Raw text chunk produced by the chunker, before embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkText {
    pub index: usize,
    pub text: String,
}

/// A chunk ready to be written: sequence index, text, optional vector.
/// The owning item's durable status record is resolved by the vector store
/// at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequence index within the owning item.
    pub index: usize,
    pub text: String,
    /// Embedding vector, absent in graph-only mode.
    pub vector: Option<Vec<f32>>,
}

impl Chunk {
    /// Stable chunk identifier within the graph store, derived from the
    /// owning document path and the sequence index.
    pub fn graph_id(&self, doc_path: &str) -> String {
        format!("{}#{}", doc_path, self.index)
    }
}

/// Vectorization state recorded on the item's durable status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorizationStatus {
    Pending,
    Vectorized,
    Deleted,
    Error,
}

impl VectorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Vectorized => "vectorized",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

/// An extracted entity, scoped to a project namespace by the graph client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable id within the namespace.
    pub id: String,
    pub entity_type: String,
    pub name: String,
    pub importance: f32,
}

/// A directed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub rel_type: String,
    pub description: String,
}

/// Output of the entity extractor collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// One embedding produced for one input text.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    /// Token usage reported by the provider, when available.
    pub tokens: Option<u32>,
    /// Provider-qualified model that produced this vector, e.g.
    /// `"ollama:nomic-embed-text"`.
    pub provider_model: String,
}

/// Replay status of an offline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineStatus {
    Pending,
    Processing,
    Error,
}

/// A durable record of a write that could not be applied immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineOperation {
    pub item_path: String,
    pub kind: TaskKind,
    pub metadata: ItemMetadata,
    pub status: OfflineStatus,
    pub retry_count: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Deterministic signature used to suppress re-application of an
    /// operation already known to have succeeded.
    pub signature: String,
}

impl OfflineOperation {
    /// Build an operation with its deterministic signature.
    pub fn new(kind: TaskKind, metadata: ItemMetadata) -> Self {
        let signature = Self::signature_for(&metadata.path, kind, &metadata);
        Self {
            item_path: metadata.path.clone(),
            kind,
            metadata,
            status: OfflineStatus::Pending,
            retry_count: 0,
            last_attempt: None,
            signature,
        }
    }

    /// Signature over the fields that make two operations "the same change".
    pub fn signature_for(path: &str, kind: TaskKind, metadata: &ItemMetadata) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(kind.to_string().as_bytes());
        hasher.update(metadata.content_hash.as_bytes());
        hasher.update(metadata.mtime.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Structured record handed to the telemetry sink after a hybrid partial
/// failure, whether or not the compensating rollback succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackRecord {
    pub file_path: String,
    pub rolled_back: bool,
    pub error_code: String,
}
