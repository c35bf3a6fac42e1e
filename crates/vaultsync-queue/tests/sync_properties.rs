//! End-to-end behavior of the ingestion pipeline against fake backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use vaultsync_core::{
    Chunk, ContentSource, Embedder, EmbeddingResult, Error, EventBus, ExtractionResult,
    GraphStore, ItemMetadata, Result, SyncConfig, SyncEvent, SyncMode, Task, TaskKind,
    VectorStore, VectorizationStatus,
};
use vaultsync_queue::{
    IngestPipeline, IngestQueue, SyncWorker, TaskOutcome, TagExtractor, WindowChunker,
    WorkerConfig,
};

type CallLog = Arc<Mutex<Vec<String>>>;

struct FakeVectorStore {
    log: CallLog,
    available: AtomicBool,
    fail_upsert: AtomicBool,
    fail_delete: AtomicBool,
    status_ids: Mutex<HashMap<String, Uuid>>,
    statuses: Mutex<HashMap<String, VectorizationStatus>>,
}

impl FakeVectorStore {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            available: AtomicBool::new(true),
            fail_upsert: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            status_ids: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    fn status_of(&self, path: &str) -> Option<VectorizationStatus> {
        self.statuses.lock().unwrap().get(path).copied()
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn upsert_chunks(&self, metadata: &ItemMetadata, chunks: &[Chunk]) -> Result<Uuid> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(Error::Timeout("write lock contention".into()));
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("vector.upsert:{}:{}", metadata.path, chunks.len()));
        let mut ids = self.status_ids.lock().unwrap();
        let id = *ids
            .entry(metadata.path.clone())
            .or_insert_with(Uuid::new_v4);
        Ok(id)
    }

    async fn delete_document_chunks(&self, status_id: Uuid) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Timeout("delete timed out".into()));
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("vector.delete:{}", status_id));
        Ok(())
    }

    async fn get_document_chunks(&self, status_id: Uuid) -> Result<Vec<Chunk>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("vector.get_chunks:{}", status_id));
        Ok(Vec::new())
    }

    async fn get_file_status_id_by_path(&self, path: &str) -> Result<Option<Uuid>> {
        Ok(self.status_ids.lock().unwrap().get(path).copied())
    }

    async fn update_vectorization_status(
        &self,
        metadata: &ItemMetadata,
        status: VectorizationStatus,
    ) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("vector.status:{}:{}", metadata.path, status.as_str()));
        self.statuses
            .lock()
            .unwrap()
            .insert(metadata.path.clone(), status);
        self.status_ids
            .lock()
            .unwrap()
            .entry(metadata.path.clone())
            .or_insert_with(Uuid::new_v4);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

struct FakeGraphStore {
    log: CallLog,
    available: AtomicBool,
    fail_upsert: AtomicBool,
}

impl FakeGraphStore {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            available: AtomicBool::new(true),
            fail_upsert: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn upsert_document_graph(
        &self,
        metadata: &ItemMetadata,
        chunks: &[Chunk],
        extraction: Option<&ExtractionResult>,
    ) -> Result<()> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(Error::Graph("connection refused".into()));
        }
        self.log.lock().unwrap().push(format!(
            "graph.upsert:{}:{}:{}",
            metadata.path,
            chunks.len(),
            extraction.map(|e| e.entities.len()).unwrap_or(0)
        ));
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("graph.delete:{}", path));
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

struct FakeEmbedder {
    log: CallLog,
    available: AtomicBool,
}

impl FakeEmbedder {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            available: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("embed:{}", texts.len()));
        Ok(texts
            .iter()
            .map(|_| EmbeddingResult {
                vector: vec![0.1; 8],
                tokens: None,
                provider_model: "fake:model".into(),
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        8
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

struct MapContentSource {
    items: HashMap<String, String>,
}

#[async_trait]
impl ContentSource for MapContentSource {
    async fn load(&self, path: &str) -> Result<String> {
        self.items
            .get(path)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("no content for {}", path)))
    }
}

struct Harness {
    log: CallLog,
    vector: Arc<FakeVectorStore>,
    graph: Arc<FakeGraphStore>,
    embedder: Arc<FakeEmbedder>,
    pipeline: Arc<IngestPipeline>,
}

fn config(mode: SyncMode) -> SyncConfig {
    SyncConfig {
        mode,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 100,
        ..Default::default()
    }
}

fn harness(config: SyncConfig) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();

    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let vector = Arc::new(FakeVectorStore::new(log.clone()));
    let graph = Arc::new(FakeGraphStore::new(log.clone()));
    let embedder = Arc::new(FakeEmbedder::new(log.clone()));

    let mut items = HashMap::new();
    items.insert("Note.md".to_string(), "some note content".to_string());
    items.insert("Other.md".to_string(), "other content".to_string());

    let pipeline = IngestPipeline::builder(config)
        .vector_store(vector.clone())
        .graph_store(graph.clone())
        .embedder(embedder.clone())
        .chunker(Arc::new(WindowChunker))
        .extractor(Arc::new(TagExtractor))
        .content_source(Arc::new(MapContentSource { items }))
        .events(EventBus::default())
        .build()
        .unwrap();

    Harness {
        log,
        vector,
        graph,
        embedder,
        pipeline: Arc::new(pipeline),
    }
}

fn note_task(kind: TaskKind) -> Task {
    Task::new(
        kind,
        ItemMetadata {
            path: "Note.md".into(),
            name: "Note.md".into(),
            tags: vec!["rust".into()],
            content_hash: "abc".into(),
            mtime: 1,
            ..Default::default()
        },
    )
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn vector_only_never_touches_graph() {
    let h = harness(config(SyncMode::VectorOnly));
    let outcome = h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    assert!(matches!(outcome, TaskOutcome::Completed));
    let log = calls(&h.log);
    assert!(log.iter().any(|c| c.starts_with("embed:")));
    assert!(log.iter().any(|c| c.starts_with("vector.upsert:Note.md")));
    assert!(log
        .iter()
        .any(|c| c == "vector.status:Note.md:vectorized"));
    assert!(!log.iter().any(|c| c.starts_with("graph.")));
}

#[tokio::test]
async fn graph_only_never_embeds() {
    let h = harness(config(SyncMode::GraphOnly));
    let outcome = h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    assert!(matches!(outcome, TaskOutcome::Completed));
    let log = calls(&h.log);
    assert!(log.iter().any(|c| c.starts_with("graph.upsert:Note.md")));
    assert!(!log.iter().any(|c| c.starts_with("embed:")));
    assert!(!log.iter().any(|c| c.starts_with("vector.")));
}

#[tokio::test]
async fn hybrid_writes_vector_before_graph() {
    let h = harness(config(SyncMode::Hybrid));
    let outcome = h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    assert!(matches!(outcome, TaskOutcome::Completed));
    let log = calls(&h.log);
    let vector_pos = log
        .iter()
        .position(|c| c.starts_with("vector.upsert"))
        .unwrap();
    let graph_pos = log
        .iter()
        .position(|c| c.starts_with("graph.upsert"))
        .unwrap();
    assert!(vector_pos < graph_pos);
}

#[tokio::test]
async fn hybrid_graph_first_reverses_order() {
    let mut cfg = config(SyncMode::Hybrid);
    cfg.order = "graph-first".parse().unwrap();
    let h = harness(cfg);
    h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    let log = calls(&h.log);
    let vector_pos = log
        .iter()
        .position(|c| c.starts_with("vector.upsert"))
        .unwrap();
    let graph_pos = log
        .iter()
        .position(|c| c.starts_with("graph.upsert"))
        .unwrap();
    assert!(graph_pos < vector_pos);
}

#[tokio::test]
async fn hybrid_partial_failure_rolls_back_vector_side() {
    let h = harness(config(SyncMode::Hybrid));
    h.graph.fail_upsert.store(true, Ordering::SeqCst);
    let mut events = h.pipeline.events().subscribe();

    let task = note_task(TaskKind::Create);
    let outcome = h.pipeline.process_task(&task).await;

    // Dual-write failures are retryable; the first retry is attempt one,
    // so it waits base * 2^1.
    match outcome {
        TaskOutcome::Retrying { delay_ms } => assert_eq!(delay_ms, 20),
        other => panic!("expected retry, got {:?}", other),
    }

    let log = calls(&h.log);
    assert!(log.iter().any(|c| c.starts_with("vector.upsert")));
    assert!(log.iter().any(|c| c.starts_with("vector.delete:")));
    assert_eq!(h.vector.status_of("Note.md"), Some(VectorizationStatus::Pending));

    // Rollback record observed with the dual-write error code, and the
    // retry event carries the bumped count.
    let mut saw_rollback = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::HybridRollback(record) => {
                assert_eq!(record.file_path, "Note.md");
                assert!(record.rolled_back);
                assert_eq!(record.error_code, "dual-write-failed");
                saw_rollback = true;
            }
            SyncEvent::TaskRetrying { task, delay_ms } => {
                assert_eq!(task.retry_count, 1);
                assert_eq!(delay_ms, 20);
            }
            _ => {}
        }
    }
    assert!(saw_rollback);
}

#[tokio::test]
async fn failed_rollback_is_reported_honestly() {
    let h = harness(config(SyncMode::Hybrid));
    h.graph.fail_upsert.store(true, Ordering::SeqCst);
    h.vector.fail_delete.store(true, Ordering::SeqCst);
    let mut events = h.pipeline.events().subscribe();

    let outcome = h.pipeline.process_task(&note_task(TaskKind::Create)).await;
    assert!(matches!(outcome, TaskOutcome::Retrying { .. }));

    // Compensation could not complete, so the record must not claim it did.
    let mut saw_rollback = false;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::HybridRollback(record) = event {
            assert!(!record.rolled_back);
            assert_eq!(record.error_code, "dual-write-failed");
            saw_rollback = true;
        }
    }
    assert!(saw_rollback);
    let log = calls(&h.log);
    assert!(!log.iter().any(|c| c.starts_with("vector.delete:")));
}

#[tokio::test]
async fn exhausted_retry_budget_fails_terminally() {
    let h = harness(config(SyncMode::Hybrid));
    h.graph.fail_upsert.store(true, Ordering::SeqCst);
    let mut events = h.pipeline.events().subscribe();

    let mut task = note_task(TaskKind::Create);
    task.retry_count = task.max_retries;

    let outcome = h.pipeline.process_task(&task).await;
    match outcome {
        TaskOutcome::Failed { error } => {
            assert_eq!(error.error_code(), "dual-write-failed")
        }
        other => panic!("expected terminal failure, got {:?}", other),
    }

    let mut failed_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::TaskFailed { .. }) {
            failed_events += 1;
        }
    }
    assert_eq!(failed_events, 1);
}

#[tokio::test]
async fn unreachable_backend_defers_without_consuming_budget() {
    let h = harness(config(SyncMode::Hybrid));
    h.graph.available.store(false, Ordering::SeqCst);

    let task = note_task(TaskKind::Update);
    let outcome = h.pipeline.process_task(&task).await;

    assert!(matches!(outcome, TaskOutcome::Deferred));
    // Nothing ran against any backend.
    assert!(calls(&h.log).is_empty());
    // The change was captured for offline replay.
    assert_eq!(h.pipeline.offline().len().await, 1);
}

#[tokio::test]
async fn deferred_change_replays_once_backends_return() {
    let h = harness(config(SyncMode::Hybrid));
    h.vector.available.store(false, Ordering::SeqCst);

    let task = note_task(TaskKind::Create);
    assert!(matches!(
        h.pipeline.process_task(&task).await,
        TaskOutcome::Deferred
    ));

    h.vector.available.store(true, Ordering::SeqCst);
    let events = h.pipeline.events().clone();
    let mut rx = events.subscribe();
    let outcome = h
        .pipeline
        .offline()
        .replay_pending(h.pipeline.as_ref(), &events)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        vaultsync_queue::ReplayOutcome::Ran {
            replayed: 1,
            remaining: 0
        }
    );
    assert!(calls(&h.log).iter().any(|c| c.starts_with("vector.upsert")));
    assert!(matches!(
        rx.recv().await.unwrap(),
        SyncEvent::OfflineReplayed { .. }
    ));
}

#[tokio::test]
async fn delete_clears_both_stores() {
    let h = harness(config(SyncMode::Hybrid));
    h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    let outcome = h.pipeline.process_task(&note_task(TaskKind::Delete)).await;
    assert!(matches!(outcome, TaskOutcome::Completed));

    let log = calls(&h.log);
    // The current chunk set is fetched before the rows go away.
    let fetch = log.iter().position(|c| c.starts_with("vector.get_chunks:")).unwrap();
    let delete = log.iter().position(|c| c.starts_with("vector.delete:")).unwrap();
    assert!(fetch < delete);
    assert!(log.iter().any(|c| c == "graph.delete:Note.md"));
    assert_eq!(h.vector.status_of("Note.md"), Some(VectorizationStatus::Deleted));
}

#[tokio::test]
async fn delete_of_unknown_item_is_a_noop_success() {
    let h = harness(config(SyncMode::Hybrid));
    let mut task = note_task(TaskKind::Delete);
    task.item_path = "Missing.md".into();
    task.metadata.path = "Missing.md".into();

    let outcome = h.pipeline.process_task(&task).await;
    assert!(matches!(outcome, TaskOutcome::Completed));
    assert!(!calls(&h.log).iter().any(|c| c.starts_with("vector.delete")));
}

#[tokio::test]
async fn repeating_a_delete_converges() {
    let h = harness(config(SyncMode::Hybrid));
    h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    let first = h.pipeline.process_task(&note_task(TaskKind::Delete)).await;
    let second = h.pipeline.process_task(&note_task(TaskKind::Delete)).await;
    assert!(matches!(first, TaskOutcome::Completed));
    assert!(matches!(second, TaskOutcome::Completed));
    assert_eq!(h.vector.status_of("Note.md"), Some(VectorizationStatus::Deleted));
}

#[tokio::test]
async fn hybrid_requires_both_stores_when_dual_write_enforced() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let result = IngestPipeline::builder(config(SyncMode::Hybrid))
        .vector_store(Arc::new(FakeVectorStore::new(log.clone())))
        .embedder(Arc::new(FakeEmbedder::new(log)))
        .chunker(Arc::new(WindowChunker))
        .content_source(Arc::new(MapContentSource {
            items: HashMap::new(),
        }))
        .build();

    match result {
        Err(Error::Config(_)) => {}
        _ => panic!("expected config error for missing graph store"),
    }
}

#[tokio::test]
async fn worker_drains_queue_and_shuts_down() {
    let h = harness(config(SyncMode::Hybrid));
    let queue = Arc::new(IngestQueue::new(100));
    queue.add_task(note_task(TaskKind::Create)).await.unwrap();
    let mut other = note_task(TaskKind::Create);
    other.item_path = "Other.md".into();
    other.metadata.path = "Other.md".into();
    queue.add_task(other).await.unwrap();

    let mut events = h.pipeline.events().subscribe();
    let worker = SyncWorker::new(
        queue.clone(),
        h.pipeline.clone(),
        WorkerConfig::default().with_poll_interval(10),
    );
    let handle = worker.start();

    let mut completed = 0;
    while completed < 2 {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(SyncEvent::TaskCompleted { .. })) => completed += 1,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event stream closed: {:?}", e),
            Err(_) => panic!("worker did not complete tasks in time"),
        }
    }

    assert!(queue.is_empty().await);
    handle.shutdown().await.unwrap();

    let mut stopped = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_secs(5), events.recv()).await
    {
        if matches!(event, SyncEvent::WorkerStopped) {
            stopped = true;
            break;
        }
    }
    assert!(stopped);
}

#[tokio::test]
async fn worker_retries_failed_task_until_success() {
    let h = harness(config(SyncMode::Hybrid));
    h.graph.fail_upsert.store(true, Ordering::SeqCst);

    let queue = Arc::new(IngestQueue::new(100));
    queue.add_task(note_task(TaskKind::Create)).await.unwrap();

    let mut events = h.pipeline.events().subscribe();
    let graph = h.graph.clone();
    let handle = SyncWorker::new(
        queue.clone(),
        h.pipeline.clone(),
        WorkerConfig::default().with_poll_interval(5),
    )
    .start();

    // Let the first attempt fail, then heal the backend.
    let mut saw_retry = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(SyncEvent::TaskRetrying { task, .. })) => {
                saw_retry = true;
                assert_eq!(task.item_path, "Note.md");
                graph.fail_upsert.store(false, Ordering::SeqCst);
            }
            Ok(Ok(SyncEvent::TaskCompleted { task })) => {
                assert_eq!(task.item_path, "Note.md");
                assert!(task.retry_count >= 1);
                assert!(saw_retry);
                break;
            }
            Ok(Ok(_)) => {}
            _ => panic!("task did not recover in time"),
        }
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn graph_only_upsert_carries_extraction() {
    let h = harness(config(SyncMode::GraphOnly));
    h.pipeline.process_task(&note_task(TaskKind::Create)).await;

    // The document entity plus its tag flowed through to the graph write.
    let log = calls(&h.log);
    assert!(log.iter().any(|c| c.starts_with("graph.upsert:Note.md") && c.ends_with(":2")));
}

#[tokio::test]
async fn embedder_probe_gates_vector_modes_only() {
    let h = harness(config(SyncMode::GraphOnly));
    h.embedder.available.store(false, Ordering::SeqCst);

    // Graph-only ignores the embedder entirely.
    let outcome = h.pipeline.process_task(&note_task(TaskKind::Create)).await;
    assert!(matches!(outcome, TaskOutcome::Completed));
}
