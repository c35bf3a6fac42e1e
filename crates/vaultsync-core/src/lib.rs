//! # vaultsync-core
//!
//! Core types, traits, and abstractions for the vaultsync dual-store
//! ingestion engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other vaultsync crates depend on: the task and
//! chunk models, the error taxonomy, the sync configuration, the event
//! bus, and the store/embedder/extractor seams.

pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{ExecutionOrder, SyncConfig, SyncMode};
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
pub use models::*;
pub use traits::*;
