//! Sync worker that drains the ingestion queue.
//!
//! Claims up to `max_concurrent` tasks at a time and processes them
//! concurrently through the pipeline. Only sleeps when the queue is empty;
//! idle cycles double as offline replay opportunities.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use vaultsync_core::{defaults, EventBus, Result, SyncEvent, Task, TaskStatus};

use crate::pipeline::{IngestPipeline, TaskOutcome};
use crate::queue::IngestQueue;

/// Configuration for the sync worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrently processed tasks.
    pub max_concurrent: usize,
    /// Whether to enable task processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            max_concurrent: defaults::MAX_CONCURRENCY,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VAULTSYNC_WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `VAULTSYNC_MAX_CONCURRENCY` | `3` | Max concurrent tasks |
    /// | `VAULTSYNC_POLL_INTERVAL_MS` | `250` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("VAULTSYNC_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent = std::env::var("VAULTSYNC_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::MAX_CONCURRENCY)
            .max(1);

        let poll_interval_ms = std::env::var("VAULTSYNC_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    events: EventBus,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully. In-flight tasks finish
    /// first.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).await.map_err(|_| {
            vaultsync_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }

    /// Subscribe to sync events.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}

/// Worker that processes tasks from the ingestion queue.
pub struct SyncWorker {
    queue: Arc<IngestQueue>,
    pipeline: Arc<IngestPipeline>,
    config: WorkerConfig,
}

impl SyncWorker {
    pub fn new(queue: Arc<IngestQueue>, pipeline: Arc<IngestPipeline>, config: WorkerConfig) -> Self {
        Self {
            queue,
            pipeline,
            config,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let events = self.pipeline.events().clone();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            events,
        }
    }

    /// Worker loop: batch-claim, process concurrently, sleep only when idle.
    #[instrument(skip_all, fields(component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Sync worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent,
            "Sync worker started"
        );
        self.pipeline.events().emit(SyncEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Sync worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..self.config.max_concurrent {
                match self.queue.claim().await {
                    Some(task) => {
                        claimed += 1;
                        let queue = Arc::clone(&self.queue);
                        let pipeline = Arc::clone(&self.pipeline);
                        tasks.spawn(async move { execute_task(queue, pipeline, task).await });
                    }
                    None => break,
                }
            }

            let mut deferred = 0;
            if claimed > 0 {
                debug!(claimed, "Processing concurrent task batch");
                while let Some(result) = tasks.join_next().await {
                    match result {
                        Ok(TaskOutcome::Deferred) => deferred += 1,
                        Ok(_) => {}
                        Err(e) => error!(error = ?e, "Task panicked"),
                    }
                }
            }

            // Sleep when idle, and when backends are down and the whole
            // batch deferred; otherwise claim again immediately.
            if claimed == 0 || deferred == claimed {
                self.replay_offline().await;
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sync worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
        }

        self.pipeline.events().emit(SyncEvent::WorkerStopped);
        info!("Sync worker stopped");
    }

    async fn replay_offline(&self) {
        let offline = Arc::clone(self.pipeline.offline());
        if offline.is_empty().await {
            return;
        }
        if let Err(e) = offline
            .replay_pending(self.pipeline.as_ref(), self.pipeline.events())
            .await
        {
            warn!(error = %e, "Offline replay pass failed");
        }
    }
}

/// Process one claimed task, act on its outcome, and report it.
async fn execute_task(
    queue: Arc<IngestQueue>,
    pipeline: Arc<IngestPipeline>,
    mut task: Task,
) -> TaskOutcome {
    let outcome = pipeline.process_task(&task).await;
    match &outcome {
        TaskOutcome::Completed => {
            task.status = TaskStatus::Completed;
            queue.complete(&task).await;
        }
        TaskOutcome::Deferred => {
            // No retry budget consumed; back of the priority band.
            if !queue.requeue_back(task).await {
                debug!("Deferred task superseded while out");
            }
        }
        TaskOutcome::Retrying { delay_ms } => {
            let delay_ms = *delay_ms;
            task.retry_count += 1;
            task.status = TaskStatus::Retrying;
            // Re-enqueue at the front once the backoff elapses, without
            // blocking the batch. The item stays in flight for the
            // duration, so nothing else touches it mid-backoff.
            tokio::spawn(async move {
                sleep(Duration::from_millis(delay_ms)).await;
                if !queue.requeue_front(task).await {
                    debug!("Retrying task superseded while backing off");
                }
            });
        }
        TaskOutcome::Failed { error } => {
            error!(
                task_id = %task.id,
                item_path = %task.item_path,
                error_code = error.error_code(),
                "Task reached terminal failure"
            );
            task.status = TaskStatus::Failed;
            queue.complete(&task).await;
        }
    }
    outcome
}
