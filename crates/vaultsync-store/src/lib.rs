//! # vaultsync-store
//!
//! Persistent store clients for vaultsync: the Postgres/pgvector vector
//! store and the Neo4j graph store. Both implement the seams defined in
//! `vaultsync-core` so the engine and its tests can substitute fakes.

pub mod graph;
pub mod vector;

pub use graph::{batch_groups, Neo4jGraphStore};
pub use vector::PgVectorStore;
