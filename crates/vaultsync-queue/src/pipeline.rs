//! Task execution pipeline.
//!
//! Takes a claimed task through content loading, chunking, embedding, and
//! the dual-store write, then reports an explicit [`TaskOutcome`] back to
//! the worker. Lifecycle events go out on the event bus for observers only;
//! control flow never depends on them.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use vaultsync_core::{
    Chunk, ChunkOptions, Chunker, ContentSource, Embedder, EntityExtractor, Error, EventBus,
    ExtractionResult, GraphStore, ItemMetadata, OfflineReplay, OfflineOperation, Result,
    RollbackRecord, SyncConfig, SyncEvent, SyncMode, Task, TaskKind, VectorStore,
    VectorizationStatus,
};

use crate::hybrid::{HybridExecutor, HybridWrite, Stage};
use crate::offline::OfflineQueue;

/// What processing a task produced. The worker acts on this; events on the
/// bus mirror it for observers.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Task succeeded; item leaves the queue.
    Completed,
    /// Required backends unreachable; task goes to the back of its priority
    /// band without consuming retry budget.
    Deferred,
    /// Recoverable failure; re-enqueue at the front after the delay.
    Retrying { delay_ms: u64 },
    /// Terminal failure.
    Failed { error: Error },
}

/// Builder for [`IngestPipeline`]. Store clients are optional so single-mode
/// deployments carry only the backend they use.
pub struct PipelineBuilder {
    config: SyncConfig,
    vector: Option<Arc<dyn VectorStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    chunker: Option<Arc<dyn Chunker>>,
    content: Option<Arc<dyn ContentSource>>,
    offline: Option<Arc<OfflineQueue>>,
    events: Option<EventBus>,
    chunk_options: ChunkOptions,
}

impl PipelineBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            vector: None,
            graph: None,
            embedder: None,
            extractor: None,
            chunker: None,
            content: None,
            offline: None,
            events: None,
            chunk_options: ChunkOptions::default(),
        }
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector = Some(store);
        self
    }

    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(store);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn content_source(mut self, content: Arc<dyn ContentSource>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn offline_queue(mut self, offline: Arc<OfflineQueue>) -> Self {
        self.offline = Some(offline);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn chunk_options(mut self, options: ChunkOptions) -> Self {
        self.chunk_options = options;
        self
    }

    /// Validate configuration against the wired backends and build.
    ///
    /// In hybrid mode with dual-write required, both store clients must be
    /// present; this fails here so no task is ever attempted against a
    /// half-wired engine.
    pub fn build(self) -> Result<IngestPipeline> {
        self.config.validate()?;

        let mode = self.config.mode;
        if mode.wants_vector() && self.vector.is_none() {
            if mode == SyncMode::Hybrid && !self.config.require_dual_write {
                warn!(component = "pipeline", "No vector store wired, hybrid degrades to graph writes");
            } else {
                return Err(Error::Config(format!(
                    "sync mode {:?} requires a vector store",
                    mode
                )));
            }
        }
        if mode.wants_graph() && self.graph.is_none() {
            if mode == SyncMode::Hybrid && !self.config.require_dual_write {
                warn!(component = "pipeline", "No graph store wired, hybrid degrades to vector writes");
            } else {
                return Err(Error::Config(format!(
                    "sync mode {:?} requires a graph store",
                    mode
                )));
            }
        }
        if mode.wants_vector() && self.vector.is_some() && self.embedder.is_none() {
            return Err(Error::Config(
                "vector writes require an embedder".into(),
            ));
        }

        let chunker = self
            .chunker
            .ok_or_else(|| Error::Config("pipeline requires a chunker".into()))?;
        let content = self
            .content
            .ok_or_else(|| Error::Config("pipeline requires a content source".into()))?;

        let executor = HybridExecutor::new(self.config.order, self.config.require_dual_write);
        let offline = self.offline.unwrap_or_else(|| {
            Arc::new(OfflineQueue::in_memory(
                self.config.offline_capacity,
                self.config.offline_max_retries,
            ))
        });

        Ok(IngestPipeline {
            config: self.config,
            vector: self.vector,
            graph: self.graph,
            embedder: self.embedder,
            extractor: self.extractor,
            chunker,
            content,
            offline,
            events: self.events.unwrap_or_default(),
            chunk_options: self.chunk_options,
            executor,
        })
    }
}

/// Executes claimed tasks against the configured store(s).
pub struct IngestPipeline {
    config: SyncConfig,
    vector: Option<Arc<dyn VectorStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    chunker: Arc<dyn Chunker>,
    content: Arc<dyn ContentSource>,
    offline: Arc<OfflineQueue>,
    events: EventBus,
    chunk_options: ChunkOptions,
    executor: HybridExecutor,
}

impl IngestPipeline {
    pub fn builder(config: SyncConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn offline(&self) -> &Arc<OfflineQueue> {
        &self.offline
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Process one claimed task to an outcome.
    ///
    /// Unreachable backends defer rather than fail: the change is captured
    /// in the offline queue and the task reports [`TaskOutcome::Deferred`]
    /// without touching its retry budget.
    #[instrument(skip(self, task), fields(component = "pipeline", op = "process_task", task_id = %task.id, item_path = %task.item_path, task_kind = %task.kind, retry_count = task.retry_count))]
    pub async fn process_task(&self, task: &Task) -> TaskOutcome {
        if !self.backends_reachable().await {
            debug!("Backends unreachable, deferring task");
            if let Err(e) = self
                .offline
                .capture(task.kind, task.metadata.clone())
                .await
            {
                warn!(error = %e, "Failed to capture deferred task offline");
            }
            return TaskOutcome::Deferred;
        }

        let result = match task.kind {
            TaskKind::Create | TaskKind::Update => self.apply_upsert(&task.metadata).await,
            TaskKind::Delete => self.apply_delete(&task.metadata).await,
            TaskKind::Rename => Err(Error::Internal(
                "rename tasks are expanded before execution".into(),
            )),
        };

        match result {
            Ok(()) => {
                info!("Task completed");
                self.events.emit(SyncEvent::TaskCompleted { task: task.clone() });
                TaskOutcome::Completed
            }
            Err(e) if e.is_retryable() && task.can_retry() => {
                // Backoff is keyed to the attempt about to happen, so the
                // count is bumped before the delay is computed and the event
                // mirrors the task as it will be requeued.
                let mut retrying = task.clone();
                retrying.retry_count += 1;
                let delay_ms = self.config.backoff_delay_ms(retrying.retry_count);
                warn!(error = %e, delay_ms, "Task failed, will retry");
                self.events.emit(SyncEvent::TaskRetrying {
                    task: retrying,
                    delay_ms,
                });
                TaskOutcome::Retrying { delay_ms }
            }
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), "Task failed terminally");
                self.events.emit(SyncEvent::TaskFailed {
                    task: task.clone(),
                    error: e.to_string(),
                });
                TaskOutcome::Failed { error: e }
            }
        }
    }

    /// Whether every backend the mode requires answers its probe.
    async fn backends_reachable(&self) -> bool {
        let mode = self.config.mode;
        if mode.wants_vector() {
            if let Some(vector) = &self.vector {
                if !vector.is_available().await {
                    return false;
                }
            }
            if let Some(embedder) = &self.embedder {
                if !embedder.is_available().await {
                    return false;
                }
            }
        }
        if mode.wants_graph() {
            if let Some(graph) = &self.graph {
                if !graph.is_available().await {
                    return false;
                }
            }
        }
        true
    }

    /// Chunk, embed, and write the item to the active store(s).
    async fn apply_upsert(&self, metadata: &ItemMetadata) -> Result<()> {
        let mode = self.config.mode;
        let content = self.content.load(&metadata.path).await?;

        let texts = self.chunker.split(&content, &self.chunk_options);
        debug!(chunk_count = texts.len(), "Content chunked");

        let chunks = if mode.wants_vector() && self.vector.is_some() {
            let embedder = self
                .embedder
                .as_ref()
                .ok_or_else(|| Error::Config("vector writes require an embedder".into()))?;
            let inputs: Vec<String> = texts.iter().map(|t| t.text.clone()).collect();
            let embeddings = embedder.embed(&inputs).await?;
            if embeddings.len() != texts.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    texts.len()
                )));
            }
            texts
                .into_iter()
                .zip(embeddings)
                .map(|(t, e)| Chunk {
                    index: t.index,
                    text: t.text,
                    vector: Some(e.vector),
                })
                .collect::<Vec<_>>()
        } else {
            texts
                .into_iter()
                .map(|t| Chunk {
                    index: t.index,
                    text: t.text,
                    vector: None,
                })
                .collect()
        };

        let extraction: Option<ExtractionResult> =
            if mode.wants_graph() && self.graph.is_some() {
                match &self.extractor {
                    Some(extractor) => extractor.extract(&content, metadata).await?,
                    None => None,
                }
            } else {
                None
            };

        let vector_stage: Option<Stage> = self.vector.as_ref().map(|store| {
            let store = Arc::clone(store);
            let metadata = metadata.clone();
            let chunks = chunks.clone();
            Box::pin(async move {
                store.upsert_chunks(&metadata, &chunks).await?;
                store
                    .update_vectorization_status(&metadata, VectorizationStatus::Vectorized)
                    .await
            }) as Stage
        });

        let graph_stage: Option<Stage> = self.graph.as_ref().map(|store| {
            let store = Arc::clone(store);
            let metadata = metadata.clone();
            let chunks = chunks.clone();
            let extraction = extraction.clone();
            Box::pin(async move {
                store
                    .upsert_document_graph(&metadata, &chunks, extraction.as_ref())
                    .await
            }) as Stage
        });

        let failure = match self
            .executor
            .execute(HybridWrite {
                mode,
                vector_stage,
                graph_stage,
            })
            .await
        {
            Ok(_) => return Ok(()),
            Err(failure) => failure,
        };

        // Partial hybrid failure: compensate the vector side if it already
        // committed (graph merges are idempotent and need no compensation),
        // then surface the dual-write error with the rollback record.
        if mode == SyncMode::Hybrid
            && (failure.committed.vector_committed || failure.committed.graph_committed)
        {
            let rolled_back = if failure.committed.vector_committed {
                self.rollback_vector(metadata).await
            } else {
                false
            };
            let record = RollbackRecord {
                file_path: metadata.path.clone(),
                rolled_back,
                error_code: "dual-write-failed".to_string(),
            };
            warn!(
                item_path = %metadata.path,
                rolled_back,
                error = %failure.error,
                "Hybrid write partially failed"
            );
            self.events.emit(SyncEvent::HybridRollback(record));
            return Err(Error::DualWriteFailed {
                file_path: metadata.path.clone(),
                rolled_back,
                source_message: failure.error.to_string(),
            });
        }

        Err(failure.error)
    }

    /// Undo a committed vector write after the graph side failed. Returns
    /// whether compensation fully succeeded.
    async fn rollback_vector(&self, metadata: &ItemMetadata) -> bool {
        let Some(vector) = &self.vector else {
            return false;
        };
        let status_id = match vector.get_file_status_id_by_path(&metadata.path).await {
            Ok(Some(id)) => id,
            Ok(None) => return false,
            Err(e) => {
                error!(error = %e, "Rollback failed to resolve status record");
                return false;
            }
        };
        if let Err(e) = vector.delete_document_chunks(status_id).await {
            error!(error = %e, "Rollback failed to delete chunks");
            return false;
        }
        if let Err(e) = vector
            .update_vectorization_status(metadata, VectorizationStatus::Pending)
            .await
        {
            error!(error = %e, "Rollback failed to reset status");
            return false;
        }
        true
    }

    /// Remove the item from the active store(s). Deletes are idempotent on
    /// both sides, so no compensation runs; a partial failure just retries.
    async fn apply_delete(&self, metadata: &ItemMetadata) -> Result<()> {
        let mode = self.config.mode;

        if mode.wants_vector() {
            if let Some(vector) = &self.vector {
                if let Some(status_id) =
                    vector.get_file_status_id_by_path(&metadata.path).await?
                {
                    let chunks = vector.get_document_chunks(status_id).await?;
                    debug!(
                        item_path = %metadata.path,
                        chunk_count = chunks.len(),
                        "Removing item chunk set"
                    );
                    vector.delete_document_chunks(status_id).await?;
                    vector
                        .update_vectorization_status(metadata, VectorizationStatus::Deleted)
                        .await?;
                } else {
                    debug!(item_path = %metadata.path, "Delete for unknown item, vector side no-op");
                }
            }
        }

        if mode.wants_graph() {
            if let Some(graph) = &self.graph {
                graph.delete_document(&metadata.path).await?;
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl OfflineReplay for IngestPipeline {
    async fn replay(&self, op: &OfflineOperation) -> Result<()> {
        match op.kind {
            TaskKind::Delete => self.apply_delete(&op.metadata).await,
            _ => self.apply_upsert(&op.metadata).await,
        }
    }

    async fn is_connected(&self) -> bool {
        self.backends_reachable().await
    }
}
