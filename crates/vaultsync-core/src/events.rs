//! Event bus for sync lifecycle notifications.
//!
//! The event bus is observer-only: task execution reports its result through
//! an explicit outcome type, and these broadcast events exist for telemetry
//! and notification sinks. Consumers are notified once per terminal failure,
//! not once per retry attempt.

use tokio::sync::broadcast;

use crate::defaults;
use crate::models::{RollbackRecord, Task};

/// Event emitted by the synchronization engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A task completed successfully and left the queue.
    TaskCompleted { task: Task },
    /// A task exhausted its retry budget or hit a non-retryable error.
    TaskFailed { task: Task, error: String },
    /// A task failed recoverably and was re-enqueued.
    TaskRetrying { task: Task, delay_ms: u64 },
    /// A hybrid partial failure triggered a compensating rollback.
    HybridRollback(RollbackRecord),
    /// An offline operation was replayed successfully.
    OfflineReplayed { signature: String },
    /// Worker pool started.
    WorkerStarted,
    /// Worker pool stopped.
    WorkerStopped,
}

/// Broadcast bus carrying [`SyncEvent`]s to any number of subscribers.
///
/// Dropping all receivers is fine: emission ignores send errors, matching
/// the fire-and-forget contract of a notification channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers. No-op with none attached.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemMetadata, TaskKind};

    fn task() -> Task {
        Task::new(
            TaskKind::Create,
            ItemMetadata {
                path: "Note.md".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::TaskCompleted { task: task() });

        match rx.recv().await.unwrap() {
            SyncEvent::TaskCompleted { task } => assert_eq!(task.item_path, "Note.md"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::default();
        // Must not panic or error.
        bus.emit(SyncEvent::WorkerStarted);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.emit(SyncEvent::WorkerStarted);

        assert!(matches!(rx1.recv().await.unwrap(), SyncEvent::WorkerStarted));
        assert!(matches!(rx2.recv().await.unwrap(), SyncEvent::WorkerStarted));
    }

    #[tokio::test]
    async fn test_rollback_event_payload() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::HybridRollback(RollbackRecord {
            file_path: "Note.md".into(),
            rolled_back: true,
            error_code: "dual-write-failed".into(),
        }));

        match rx.recv().await.unwrap() {
            SyncEvent::HybridRollback(record) => {
                assert!(record.rolled_back);
                assert_eq!(record.error_code, "dual-write-failed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
