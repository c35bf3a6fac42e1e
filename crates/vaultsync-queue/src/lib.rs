//! # vaultsync-queue
//!
//! Ingestion task queue and hybrid dual-write orchestration for vaultsync.
//!
//! This crate provides:
//! - [`IngestQueue`], the priority-ordered, per-item deduplicating task queue
//! - [`HybridExecutor`], which runs vector and graph write stages in the
//!   configured order and reports exactly what committed
//! - [`IngestPipeline`], taking claimed tasks through chunking, embedding,
//!   and the dual-store write with compensating rollback on partial failure
//! - [`SyncWorker`], the concurrent queue drainer with graceful shutdown
//! - [`OfflineQueue`], durable capture and replay of writes made while a
//!   backend was unreachable
//! - [`SyncEngine`], a facade wiring all of the above
//!
//! ## Example
//!
//! ```ignore
//! use vaultsync_core::{ItemMetadata, SyncConfig, TaskKind};
//! use vaultsync_queue::{SyncEngine, WorkerConfig};
//!
//! let engine = SyncEngine::with_stores(
//!     SyncConfig::from_env(),
//!     vector_store,
//!     graph_store,
//!     embedder,
//!     "/data/vault".into(),
//!     Some("/data/vault/.vaultsync/offline.json".into()),
//! )
//! .await?;
//!
//! let handle = engine.start(WorkerConfig::from_env());
//! engine.submit(TaskKind::Create, metadata).await?;
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod collaborators;
pub mod engine;
pub mod hybrid;
pub mod offline;
pub mod pipeline;
pub mod queue;
pub mod worker;

pub use collaborators::{FileContentSource, TagExtractor, WindowChunker};
pub use engine::SyncEngine;
pub use hybrid::{HybridExecutor, HybridFailure, HybridOutcome, HybridWrite, Stage};
pub use offline::{OfflineQueue, ReplayOutcome};
pub use pipeline::{IngestPipeline, PipelineBuilder, TaskOutcome};
pub use queue::{AddOutcome, IngestQueue};
pub use worker::{SyncWorker, WorkerConfig, WorkerHandle};
