//! Postgres + pgvector vector store client.
//!
//! Chunk rows hang off a durable per-item status record keyed by
//! (namespace, path). Chunk replacement is delete-then-insert inside one
//! transaction so no orphaned chunks survive a chunk-count change. Writes
//! for the same item are serialized through a per-item async mutex with a
//! bounded wait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use vaultsync_core::{
    defaults, Chunk, Error, ItemMetadata, Result, VectorStore, VectorizationStatus,
};

/// Schema for the vector side. Applied with `CREATE .. IF NOT EXISTS` so
/// repeated startup is idempotent.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_status (
    id UUID PRIMARY KEY,
    namespace TEXT NOT NULL,
    path TEXT NOT NULL,
    content_hash TEXT NOT NULL DEFAULT '',
    mtime BIGINT NOT NULL DEFAULT 0,
    vector_status TEXT NOT NULL DEFAULT 'pending',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (namespace, path)
);
CREATE TABLE IF NOT EXISTS document_chunk (
    id UUID PRIMARY KEY,
    status_id UUID NOT NULL REFERENCES file_status(id) ON DELETE CASCADE,
    chunk_index INT NOT NULL,
    content TEXT NOT NULL,
    embedding vector,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS document_chunk_status_idx ON document_chunk (status_id);
"#;

/// PostgreSQL implementation of [`VectorStore`].
pub struct PgVectorStore {
    pool: PgPool,
    namespace: String,
    /// Per-item write mutex, lazily created per path. Serializes an upsert
    /// against an in-flight delete for the same item.
    item_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PgVectorStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(database_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        let store = Self::with_pool(pool, namespace);
        store.init_schema().await?;
        Ok(store)
    }

    /// Build from an existing pool (shared pools, tests).
    pub fn with_pool(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Apply the vector-side schema.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Acquire the per-item write mutex with a bounded exponential wait.
    ///
    /// A caller that cannot acquire within the bound gets a timeout error
    /// rather than writing into an inconsistent state.
    async fn lock_item(&self, path: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.item_locks.lock().await;
            // Entries held by nothing but the map are idle; sweep them so
            // the map does not grow with every path ever written.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let mut delay_ms = defaults::WRITE_LOCK_DELAY_MS;
        for _ in 0..defaults::WRITE_LOCK_ATTEMPTS {
            if let Ok(guard) = lock.clone().try_lock_owned() {
                return Ok(guard);
            }
            sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = delay_ms.saturating_mul(2);
        }
        Err(Error::Timeout(format!(
            "write lock for {} not acquired after {} attempts",
            path,
            defaults::WRITE_LOCK_ATTEMPTS
        )))
    }

    /// Resolve or create the item's status record, returning its id.
    async fn upsert_status(&self, metadata: &ItemMetadata) -> Result<Uuid> {
        let row = sqlx::query(
            "INSERT INTO file_status (id, namespace, path, content_hash, mtime)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (namespace, path)
             DO UPDATE SET content_hash = $4, mtime = $5, updated_at = now()
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&self.namespace)
        .bind(&metadata.path)
        .bind(&metadata.content_hash)
        .bind(metadata.mtime)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    /// Remaining chunk rows for a status record.
    async fn remaining_chunks(&self, status_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM document_chunk WHERE status_id = $1")
            .bind(status_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Path owning a status record, used to route deletes through the same
    /// per-item mutex as upserts.
    async fn path_for_status(&self, status_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT path FROM file_status WHERE id = $1")
            .bind(status_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("path")))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    #[instrument(skip(self, chunks), fields(component = "vector_store", op = "upsert_chunks", item_path = %metadata.path, chunk_count = chunks.len()))]
    async fn upsert_chunks(&self, metadata: &ItemMetadata, chunks: &[Chunk]) -> Result<Uuid> {
        let _guard = self.lock_item(&metadata.path).await?;

        let status_id = self.upsert_status(metadata).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunk WHERE status_id = $1")
            .bind(status_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let vector = chunk.vector.clone().map(Vector::from);
            sqlx::query(
                "INSERT INTO document_chunk (id, status_id, chunk_index, content, embedding)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(status_id)
            .bind(chunk.index as i32)
            .bind(&chunk.text)
            .bind(vector)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(chunk_count = chunks.len(), %status_id, "Chunk set replaced");
        Ok(status_id)
    }

    #[instrument(skip(self), fields(component = "vector_store", op = "delete_document_chunks", %status_id))]
    async fn delete_document_chunks(&self, status_id: Uuid) -> Result<()> {
        let _guard = match self.path_for_status(status_id).await? {
            Some(path) => Some(self.lock_item(&path).await?),
            None => None,
        };

        // Delete-then-verify: the external store is eventually consistent,
        // so non-zero remaining rows triggers another delete, not a failure.
        for attempt in 1..=defaults::DELETE_VERIFY_ATTEMPTS {
            sqlx::query("DELETE FROM document_chunk WHERE status_id = $1")
                .bind(status_id)
                .execute(&self.pool)
                .await?;

            let remaining = self.remaining_chunks(status_id).await?;
            if remaining == 0 {
                return Ok(());
            }

            warn!(
                attempt,
                remaining, "Chunk delete did not converge, retrying"
            );
            sleep(Duration::from_millis(
                defaults::DELETE_VERIFY_DELAY_MS * attempt as u64,
            ))
            .await;
        }

        Err(Error::Timeout(format!(
            "chunk delete for {} did not converge after {} attempts",
            status_id,
            defaults::DELETE_VERIFY_ATTEMPTS
        )))
    }

    async fn get_document_chunks(&self, status_id: Uuid) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT chunk_index, content, embedding
             FROM document_chunk
             WHERE status_id = $1
             ORDER BY chunk_index",
        )
        .bind(status_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Chunk {
                index: row.get::<i32, _>("chunk_index") as usize,
                text: row.get("content"),
                vector: row
                    .get::<Option<Vector>, _>("embedding")
                    .map(|v| v.to_vec()),
            })
            .collect())
    }

    async fn get_file_status_id_by_path(&self, path: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM file_status WHERE namespace = $1 AND path = $2")
            .bind(&self.namespace)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn update_vectorization_status(
        &self,
        metadata: &ItemMetadata,
        status: VectorizationStatus,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO file_status (id, namespace, path, content_hash, mtime, vector_status)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (namespace, path)
             DO UPDATE SET vector_status = $6, updated_at = now()",
        )
        .bind(Uuid::new_v4())
        .bind(&self.namespace)
        .bind(&metadata.path)
        .bind(&metadata.content_hash)
        .bind(metadata.mtime)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
