//! Engine facade tying the queue, pipeline, and worker together.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use vaultsync_core::{
    EventBus, ItemMetadata, Result, SyncConfig, SyncEvent, Task, TaskKind,
};
use vaultsync_embed::FallbackEmbedder;
use vaultsync_store::{Neo4jGraphStore, PgVectorStore};

use crate::collaborators::{FileContentSource, TagExtractor, WindowChunker};
use crate::offline::OfflineQueue;
use crate::pipeline::IngestPipeline;
use crate::queue::{AddOutcome, IngestQueue};
use crate::worker::{SyncWorker, WorkerConfig, WorkerHandle};

/// Top-level synchronization engine.
///
/// Owns the ingestion queue and the execution pipeline; [`SyncEngine::start`]
/// spawns the worker that drains the queue.
pub struct SyncEngine {
    queue: Arc<IngestQueue>,
    pipeline: Arc<IngestPipeline>,
}

impl SyncEngine {
    /// Assemble an engine around an already-built pipeline. The queue is
    /// sized from the pipeline's configuration.
    pub fn new(pipeline: IngestPipeline) -> Self {
        let queue = Arc::new(IngestQueue::new(pipeline.config().queue_capacity));
        Self {
            queue,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Production wiring: Postgres/pgvector, Neo4j, the fallback embedder,
    /// and the default collaborators reading content from `vault_root`.
    /// Offline operations persist next to the vault in `offline_path`.
    pub async fn with_stores(
        config: SyncConfig,
        vector: PgVectorStore,
        graph: Neo4jGraphStore,
        embedder: FallbackEmbedder,
        vault_root: PathBuf,
        offline_path: Option<PathBuf>,
    ) -> Result<Self> {
        let offline = match offline_path {
            Some(path) => {
                OfflineQueue::load(path, config.offline_capacity, config.offline_max_retries).await
            }
            None => OfflineQueue::in_memory(config.offline_capacity, config.offline_max_retries),
        };

        let pipeline = IngestPipeline::builder(config)
            .vector_store(Arc::new(vector))
            .graph_store(Arc::new(graph))
            .embedder(Arc::new(embedder))
            .chunker(Arc::new(WindowChunker))
            .extractor(Arc::new(TagExtractor))
            .content_source(Arc::new(FileContentSource::new(vault_root)))
            .offline_queue(Arc::new(offline))
            .events(EventBus::default())
            .build()?;

        Ok(Self::new(pipeline))
    }

    /// Submit a change event for the given item.
    pub async fn submit(&self, kind: TaskKind, metadata: ItemMetadata) -> Result<AddOutcome> {
        self.queue.add_task(Task::new(kind, metadata)).await
    }

    /// Subscribe to sync lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.pipeline.events().subscribe()
    }

    /// Spawn the worker pool; the handle controls shutdown.
    pub fn start(&self, worker_config: WorkerConfig) -> WorkerHandle {
        SyncWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            worker_config,
        )
        .start()
    }

    /// Number of pending tasks.
    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }

    pub fn queue(&self) -> &Arc<IngestQueue> {
        &self.queue
    }

    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }
}
