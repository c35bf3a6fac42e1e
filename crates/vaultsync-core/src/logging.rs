//! Structured logging field name constants for vaultsync.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Lifecycle events (startup, shutdown), task completions |
//! | DEBUG | Decision points, batch splits, cache hits/misses |
//! | TRACE | Per-chunk iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Component within the engine.
/// Examples: "queue", "worker", "hybrid", "vector_store", "graph_store",
/// "embedder", "offline"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "add_task", "process_task", "upsert_chunks", "replay"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Stable item path being operated on.
pub const ITEM_PATH: &str = "item_path";

/// Task UUID being processed.
pub const TASK_ID: &str = "task_id";

/// Task kind enum variant.
pub const TASK_KIND: &str = "task_kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of chunks processed.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Retry attempt number.
pub const RETRY_COUNT: &str = "retry_count";

/// Records in a single bounded graph write.
pub const BATCH_SIZE: &str = "batch_size";
