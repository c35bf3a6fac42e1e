//! In-memory ingestion task queue with per-item deduplication.
//!
//! The queue holds at most one task per item identity. Supersede rules:
//! a new Delete replaces any pending Create/Update for the same item; a new
//! Create/Update is dropped while a Delete for that item is pending (delete
//! wins). Tasks are ordered by priority, FIFO within a priority. Rename
//! events are expanded at enqueue time into a Delete for the old path plus
//! a Create for the new path.

use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use vaultsync_core::{Error, ItemMetadata, Result, Task, TaskKind, TaskStatus};

/// What `add_task` did with the submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Task inserted into the queue.
    Enqueued,
    /// Task replaced a pending task for the same item.
    Superseded,
    /// Task dropped because a Delete for the item is already pending.
    DroppedDeletePending,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    /// Item paths currently being processed by a worker.
    in_flight: HashSet<String>,
}

/// Priority-ordered, deduplicating task queue.
pub struct IngestQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
        }
    }

    /// Enqueue a change event, applying supersede/drop rules.
    ///
    /// Fails with [`Error::QueueFull`] once the pending count would exceed
    /// capacity. Rename tasks are expanded into Delete(old) + Create(new)
    /// before insertion; the outcome reported is for the Create half.
    #[instrument(skip(self, task), fields(component = "queue", op = "add_task", item_path = %task.item_path, task_kind = %task.kind))]
    pub async fn add_task(&self, task: Task) -> Result<AddOutcome> {
        if task.kind == TaskKind::Rename {
            return self.add_rename(task).await;
        }
        let mut state = self.state.lock().await;
        self.insert(&mut state, task)
    }

    /// Expand a rename into a delete of the old identity plus a create of
    /// the new one, each flowing through the normal rules.
    async fn add_rename(&self, task: Task) -> Result<AddOutcome> {
        let Some(old_path) = task.metadata.old_path.clone() else {
            return Err(Error::InvalidInput(format!(
                "rename for {} carries no old_path",
                task.item_path
            )));
        };

        let mut state = self.state.lock().await;

        let delete_meta = ItemMetadata {
            path: old_path.clone(),
            old_path: None,
            ..task.metadata.clone()
        };
        self.insert(&mut state, Task::new(TaskKind::Delete, delete_meta))?;

        let create_meta = ItemMetadata {
            old_path: None,
            ..task.metadata.clone()
        };
        self.insert(&mut state, Task::new(TaskKind::Create, create_meta))
    }

    fn insert(&self, state: &mut QueueState, task: Task) -> Result<AddOutcome> {
        let mut outcome = AddOutcome::Enqueued;

        if let Some(pos) = state
            .pending
            .iter()
            .position(|t| t.item_path == task.item_path)
        {
            let existing = &state.pending[pos];
            if existing.kind == TaskKind::Delete {
                // Delete wins: drop the newcomer, queue length unchanged.
                debug!(item_path = %task.item_path, "Dropping task, delete pending");
                return Ok(AddOutcome::DroppedDeletePending);
            }
            state.pending.remove(pos);
            outcome = AddOutcome::Superseded;
        }

        if state.pending.len() >= self.capacity {
            warn!(capacity = self.capacity, "Ingestion queue full");
            return Err(Error::QueueFull(self.capacity));
        }

        // Priority insertion, FIFO within the same priority.
        let pos = state
            .pending
            .iter()
            .position(|t| t.priority < task.priority)
            .unwrap_or(state.pending.len());
        state.pending.insert(pos, task);
        Ok(outcome)
    }

    /// Claim the highest-priority pending task whose item is not already in
    /// flight, marking it in flight. Returns `None` when nothing claimable
    /// remains; tasks for busy items stay queued until the item is released.
    pub async fn claim(&self) -> Option<Task> {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let pos = state
            .pending
            .iter()
            .position(|t| !state.in_flight.contains(&t.item_path))?;
        let mut task = state.pending.remove(pos)?;
        state.in_flight.insert(task.item_path.clone());
        task.status = TaskStatus::Processing;
        task.updated_at = chrono::Utc::now();
        Some(task)
    }

    /// Release an item after its task reached a terminal state.
    pub async fn complete(&self, task: &Task) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&task.item_path);
    }

    /// Put a retrying task back at the front of the queue. The caller is
    /// responsible for waiting out the backoff delay first. Returns `false`
    /// when a pending task for the item superseded the returning one.
    pub async fn requeue_front(&self, task: Task) -> bool {
        let mut state = self.state.lock().await;
        self.reinstate(&mut state, task, true)
    }

    /// Put a deferred task (backends unavailable) back at the end of its
    /// priority band. Returns `false` when a pending task for the item
    /// superseded the returning one.
    pub async fn requeue_back(&self, task: Task) -> bool {
        let mut state = self.state.lock().await;
        self.reinstate(&mut state, task, false)
    }

    /// Release the item and re-apply the dedup rules for a task returning
    /// from a worker. A Delete enqueued while the task was out still wins
    /// over a returning Create/Update; any other pending task for the item
    /// is replaced by the returning one, which carries the item's retry
    /// budget.
    fn reinstate(&self, state: &mut QueueState, mut task: Task, front: bool) -> bool {
        state.in_flight.remove(&task.item_path);

        if let Some(pos) = state
            .pending
            .iter()
            .position(|t| t.item_path == task.item_path)
        {
            if state.pending[pos].kind == TaskKind::Delete && task.kind != TaskKind::Delete {
                debug!(item_path = %task.item_path, "Dropping returning task, delete pending");
                return false;
            }
            state.pending.remove(pos);
        }

        task.status = TaskStatus::Pending;
        task.updated_at = chrono::Utc::now();
        if front {
            state.pending.push_front(task);
        } else {
            let pos = state
                .pending
                .iter()
                .position(|t| t.priority < task.priority)
                .unwrap_or(state.pending.len());
            state.pending.insert(pos, task);
        }
        true
    }

    /// Number of pending (not in-flight) tasks.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of pending tasks, front first. Test and introspection aid.
    pub async fn pending_snapshot(&self) -> Vec<Task> {
        self.state.lock().await.pending.iter().cloned().collect()
    }
}
