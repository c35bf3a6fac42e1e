//! Offline durability queue.
//!
//! Captures operations that could not be applied because a backend was
//! unreachable, persists them as JSON, and replays them once connectivity
//! returns. Capture deduplicates by operation signature against both the
//! queued set and recently replayed operations; a full queue drops its
//! oldest entry. Reconnection probing backs off exponentially, capped.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use vaultsync_core::{
    defaults, EventBus, ItemMetadata, OfflineOperation, OfflineReplay, OfflineStatus, Result,
    SyncEvent, TaskKind,
};

#[derive(Debug, Serialize, Deserialize, Default)]
struct PersistedState {
    queued: Vec<OfflineOperation>,
    processed: Vec<String>,
}

struct OfflineState {
    queued: VecDeque<OfflineOperation>,
    /// Signatures of successfully replayed operations, insertion order.
    processed: VecDeque<String>,
    processed_index: HashSet<String>,
    /// Consecutive failed connectivity probes.
    reconnect_failures: u32,
    /// Earliest moment the next replay attempt may run.
    next_attempt_at: Option<Instant>,
}

impl OfflineState {
    fn empty() -> Self {
        Self {
            queued: VecDeque::new(),
            processed: VecDeque::new(),
            processed_index: HashSet::new(),
            reconnect_failures: 0,
            next_attempt_at: None,
        }
    }

    fn mark_processed(&mut self, signature: String) {
        if self.processed_index.insert(signature.clone()) {
            self.processed.push_back(signature);
            while self.processed.len() > defaults::OFFLINE_SIGNATURE_CAPACITY {
                if let Some(old) = self.processed.pop_front() {
                    self.processed_index.remove(&old);
                }
            }
        }
    }
}

/// What a replay pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Nothing queued.
    Empty,
    /// Backoff gate has not elapsed yet.
    Waiting,
    /// Connectivity probe failed; backoff doubled.
    Disconnected,
    /// A pass ran; counts of replayed and still-queued operations.
    Ran { replayed: usize, remaining: usize },
}

/// Durable queue of operations awaiting backend connectivity.
pub struct OfflineQueue {
    state: Mutex<OfflineState>,
    path: Option<PathBuf>,
    capacity: usize,
    max_retries: u32,
}

impl OfflineQueue {
    /// Queue without persistence, for tests and ephemeral runs.
    pub fn in_memory(capacity: usize, max_retries: u32) -> Self {
        Self {
            state: Mutex::new(OfflineState::empty()),
            path: None,
            capacity,
            max_retries,
        }
    }

    /// Load persisted state from `path`, starting empty if the file is
    /// missing or unreadable. A corrupt file must never block startup.
    pub async fn load(path: PathBuf, capacity: usize, max_retries: u32) -> Self {
        let mut state = OfflineState::empty();
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(persisted) => {
                    for signature in persisted.processed {
                        state.mark_processed(signature);
                    }
                    state.queued = persisted.queued.into();
                    debug!(
                        component = "offline",
                        queued = state.queued.len(),
                        "Loaded offline queue"
                    );
                }
                Err(e) => {
                    warn!(component = "offline", error = %e, "Corrupt offline queue file, starting empty");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(component = "offline", error = %e, "Failed to read offline queue file, starting empty");
            }
        }
        Self {
            state: Mutex::new(state),
            path: Some(path),
            capacity,
            max_retries,
        }
    }

    /// Capture an operation for later replay.
    ///
    /// Returns `false` if an identical operation (same signature) is already
    /// queued or was already replayed. At capacity the oldest queued
    /// operation is dropped to admit the newcomer.
    #[instrument(skip(self, metadata), fields(component = "offline", op = "capture", item_path = %metadata.path, task_kind = %kind))]
    pub async fn capture(&self, kind: TaskKind, metadata: ItemMetadata) -> Result<bool> {
        let operation = OfflineOperation::new(kind, metadata);
        let mut state = self.state.lock().await;

        if state.processed_index.contains(&operation.signature)
            || state
                .queued
                .iter()
                .any(|op| op.signature == operation.signature)
        {
            debug!(signature = %operation.signature, "Duplicate offline operation ignored");
            return Ok(false);
        }

        while state.queued.len() >= self.capacity {
            if let Some(dropped) = state.queued.pop_front() {
                warn!(
                    item_path = %dropped.item_path,
                    "Offline queue full, dropping oldest operation"
                );
            }
        }
        state.queued.push_back(operation);
        self.persist(&state).await?;
        Ok(true)
    }

    /// Attempt one replay pass through the queue.
    ///
    /// Honors the reconnection backoff gate; a failed connectivity probe
    /// doubles the gate up to the cap. Operations that fail replay are
    /// retried on later passes until their retry ceiling, then dropped.
    #[instrument(skip_all, fields(component = "offline", op = "replay"))]
    pub async fn replay_pending(
        &self,
        replayer: &dyn OfflineReplay,
        events: &EventBus,
    ) -> Result<ReplayOutcome> {
        {
            let state = self.state.lock().await;
            if state.queued.is_empty() {
                return Ok(ReplayOutcome::Empty);
            }
            if let Some(gate) = state.next_attempt_at {
                if Instant::now() < gate {
                    return Ok(ReplayOutcome::Waiting);
                }
            }
        }

        if !replayer.is_connected().await {
            let mut state = self.state.lock().await;
            state.reconnect_failures = state.reconnect_failures.saturating_add(1);
            let delay = reconnect_delay_ms(state.reconnect_failures);
            state.next_attempt_at = Some(Instant::now() + std::time::Duration::from_millis(delay));
            debug!(delay_ms = delay, "Backends unreachable, backing off");
            return Ok(ReplayOutcome::Disconnected);
        }

        let batch: Vec<OfflineOperation> = {
            let mut state = self.state.lock().await;
            state.reconnect_failures = 0;
            state.next_attempt_at = None;
            state.queued.drain(..).collect()
        };

        let mut replayed = 0usize;
        let mut still_queued: Vec<OfflineOperation> = Vec::new();

        for mut op in batch {
            op.status = OfflineStatus::Processing;
            op.last_attempt = Some(chrono::Utc::now());
            match replayer.replay(&op).await {
                Ok(()) => {
                    replayed += 1;
                    events.emit(SyncEvent::OfflineReplayed {
                        signature: op.signature.clone(),
                    });
                    let mut state = self.state.lock().await;
                    state.mark_processed(op.signature);
                }
                Err(e) => {
                    op.retry_count += 1;
                    op.status = OfflineStatus::Error;
                    if op.retry_count >= self.max_retries {
                        warn!(
                            item_path = %op.item_path,
                            retry_count = op.retry_count,
                            error = %e,
                            "Dropping offline operation after retry ceiling"
                        );
                    } else {
                        debug!(item_path = %op.item_path, error = %e, "Offline replay failed, will retry");
                        still_queued.push(op);
                    }
                }
            }
        }

        let remaining = {
            let mut state = self.state.lock().await;
            for op in still_queued {
                state.queued.push_back(op);
            }
            self.persist(&state).await?;
            state.queued.len()
        };

        if replayed > 0 {
            info!(replayed, remaining, "Offline replay pass finished");
        }
        Ok(ReplayOutcome::Ran { replayed, remaining })
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queued.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, state: &OfflineState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let persisted = PersistedState {
            queued: state.queued.iter().cloned().collect(),
            processed: state.processed.iter().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&persisted)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Reconnection delay for the given consecutive failure count:
/// base × 2^(failures-1), capped.
fn reconnect_delay_ms(failures: u32) -> u64 {
    let factor = 2u64.saturating_pow(failures.saturating_sub(1));
    defaults::OFFLINE_RECONNECT_BASE_MS
        .saturating_mul(factor)
        .min(defaults::OFFLINE_RECONNECT_MAX_MS)
}
