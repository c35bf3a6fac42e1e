//! Centralized default constants for the vaultsync system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Hard cap on pending tasks; `add_task` rejects beyond this.
pub const QUEUE_CAPACITY: usize = 1000;

/// Maximum concurrent task workers.
pub const MAX_CONCURRENCY: usize = 3;

/// Retry budget per task.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential task backoff (doubles per retry).
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Cap applied to the exponential task backoff.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Polling interval when the queue is empty.
pub const POLL_INTERVAL_MS: u64 = 250;

/// Priority assigned to DELETE tasks (outranks create/update).
pub const PRIORITY_DELETE: i32 = 10;

/// Priority assigned to CREATE/UPDATE tasks.
pub const PRIORITY_UPSERT: i32 = 0;

// =============================================================================
// VECTOR STORE
// =============================================================================

/// Attempts for the delete-then-verify cycle before giving up.
pub const DELETE_VERIFY_ATTEMPTS: u32 = 5;

/// Base delay between delete-verify attempts (grows linearly per attempt).
pub const DELETE_VERIFY_DELAY_MS: u64 = 200;

/// Attempts to acquire the per-item write mutex before timing out.
pub const WRITE_LOCK_ATTEMPTS: u32 = 6;

/// Base delay between write-lock acquisition attempts (doubles per attempt).
pub const WRITE_LOCK_DELAY_MS: u64 = 100;

// =============================================================================
// GRAPH STORE
// =============================================================================

/// Maximum records per graph write transaction. Hard correctness bound:
/// a single unbounded write must never be issued.
pub const GRAPH_BATCH_LIMIT: usize = 50;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Fixed dimensionality all vectors are normalized to before storage.
pub const EMBED_DIMENSION: usize = 768;

/// Default primary embedding model (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Cache entry time-to-live in seconds (7 days).
pub const CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

/// Maximum cached embeddings before oldest-first eviction.
pub const CACHE_MAX_ENTRIES: usize = 10_000;

/// Timeout for embedding HTTP requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// OFFLINE DURABILITY QUEUE
// =============================================================================

/// Maximum queued offline operations before the oldest is dropped.
pub const OFFLINE_CAPACITY: usize = 500;

/// Replay retry ceiling per offline operation.
pub const OFFLINE_MAX_RETRIES: u32 = 5;

/// Maximum processed-signature entries retained for dedup.
pub const OFFLINE_SIGNATURE_CAPACITY: usize = 2_000;

/// Initial reconnection delay (doubles per failed attempt).
pub const OFFLINE_RECONNECT_BASE_MS: u64 = 2_000;

/// Cap on the reconnection backoff.
pub const OFFLINE_RECONNECT_MAX_MS: u64 = 5 * 60_000;

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast channel capacity for the event bus.
pub const EVENT_BUS_CAPACITY: usize = 256;
