//! Neo4j graph store client.
//!
//! Documents, chunks, and entities are merged (never duplicated) and scoped
//! by project namespace so independent projects never cross-contaminate.
//! Large chunk/entity lists are split into bounded write transactions of at
//! most `batch_limit` records each; a single unbounded write is never
//! issued.

use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::{debug, instrument, warn};

use vaultsync_core::{Chunk, ExtractionResult, GraphStore, ItemMetadata, Result};

/// Split `items` into groups no larger than `limit`.
///
/// A limit of zero is treated as one to keep every write bounded.
pub fn batch_groups<T>(items: &[T], limit: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(limit.max(1))
}

/// Neo4j implementation of [`GraphStore`].
pub struct Neo4jGraphStore {
    graph: Graph,
    namespace: String,
    batch_limit: usize,
}

impl Neo4jGraphStore {
    /// Connect to a Neo4j instance.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        namespace: impl Into<String>,
        batch_limit: usize,
    ) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self::with_graph(graph, namespace, batch_limit))
    }

    /// Build from an existing connection (shared drivers, tests).
    pub fn with_graph(graph: Graph, namespace: impl Into<String>, batch_limit: usize) -> Self {
        Self {
            graph,
            namespace: namespace.into(),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Merge chunk nodes and HAS_CHUNK edges in bounded transactions.
    async fn merge_chunks(&self, path: &str, chunks: &[Chunk]) -> Result<()> {
        for group in batch_groups(chunks, self.batch_limit) {
            let mut txn = self.graph.start_txn().await?;
            for chunk in group {
                txn.run(
                    query(
                        "MATCH (d:Document {namespace: $ns, path: $path})
                         MERGE (c:Chunk {namespace: $ns, id: $id})
                         SET c.idx = $idx, c.text = $text
                         MERGE (d)-[:HAS_CHUNK]->(c)",
                    )
                    .param("ns", self.namespace.as_str())
                    .param("path", path)
                    .param("id", chunk.graph_id(path))
                    .param("idx", chunk.index as i64)
                    .param("text", chunk.text.as_str()),
                )
                .await?;
            }
            txn.commit().await?;
            debug!(
                component = "graph_store",
                batch_size = group.len(),
                "Chunk batch merged"
            );
        }
        Ok(())
    }

    /// Delete chunk nodes attached to the document that are absent from the
    /// new chunk id set.
    async fn delete_orphan_chunks(&self, path: &str, keep_ids: Vec<String>) -> Result<()> {
        self.graph
            .run(
                query(
                    "MATCH (d:Document {namespace: $ns, path: $path})-[:HAS_CHUNK]->(c:Chunk)
                     WHERE NOT c.id IN $keep
                     DETACH DELETE c",
                )
                .param("ns", self.namespace.as_str())
                .param("path", path)
                .param("keep", keep_ids),
            )
            .await?;
        Ok(())
    }

    /// Merge entities and MENTIONS edges in bounded transactions, returning
    /// the ids actually merged.
    async fn merge_entities(
        &self,
        path: &str,
        extraction: &ExtractionResult,
    ) -> Result<Vec<String>> {
        let mut merged = Vec::with_capacity(extraction.entities.len());
        for group in batch_groups(&extraction.entities, self.batch_limit) {
            let mut txn = self.graph.start_txn().await?;
            for entity in group {
                txn.run(
                    query(
                        "MERGE (e:Entity {namespace: $ns, id: $id})
                         SET e.type = $type, e.name = $name, e.importance = $importance
                         WITH e
                         MATCH (d:Document {namespace: $ns, path: $path})
                         MERGE (d)-[:MENTIONS]->(e)",
                    )
                    .param("ns", self.namespace.as_str())
                    .param("path", path)
                    .param("id", entity.id.as_str())
                    .param("type", entity.entity_type.as_str())
                    .param("name", entity.name.as_str())
                    .param("importance", entity.importance as f64),
                )
                .await?;
                merged.push(entity.id.clone());
            }
            txn.commit().await?;
        }
        Ok(merged)
    }

    /// Merge relationship edges between previously-merged entities only.
    /// An edge whose endpoints were not both merged is skipped, not an
    /// error.
    async fn merge_relationships(
        &self,
        extraction: &ExtractionResult,
        merged_ids: &[String],
    ) -> Result<()> {
        let eligible: Vec<_> = extraction
            .relationships
            .iter()
            .filter(|r| {
                let ok = merged_ids.contains(&r.source) && merged_ids.contains(&r.target);
                if !ok {
                    debug!(
                        component = "graph_store",
                        source = %r.source,
                        target = %r.target,
                        "Skipping relationship with unmerged endpoint"
                    );
                }
                ok
            })
            .collect();

        for group in batch_groups(&eligible, self.batch_limit) {
            let mut txn = self.graph.start_txn().await?;
            for rel in group {
                txn.run(
                    query(
                        "MATCH (a:Entity {namespace: $ns, id: $src})
                         MATCH (b:Entity {namespace: $ns, id: $dst})
                         MERGE (a)-[r:RELATES {type: $type}]->(b)
                         SET r.description = $desc",
                    )
                    .param("ns", self.namespace.as_str())
                    .param("src", rel.source.as_str())
                    .param("dst", rel.target.as_str())
                    .param("type", rel.rel_type.as_str())
                    .param("desc", rel.description.as_str()),
                )
                .await?;
            }
            txn.commit().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    #[instrument(skip(self, chunks, extraction), fields(component = "graph_store", op = "upsert_document_graph", item_path = %metadata.path, chunk_count = chunks.len()))]
    async fn upsert_document_graph(
        &self,
        metadata: &ItemMetadata,
        chunks: &[Chunk],
        extraction: Option<&ExtractionResult>,
    ) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (d:Document {namespace: $ns, path: $path})
                     SET d.name = $name, d.hash = $hash, d.mtime = $mtime,
                         d.updated_at = timestamp()",
                )
                .param("ns", self.namespace.as_str())
                .param("path", metadata.path.as_str())
                .param("name", metadata.name.as_str())
                .param("hash", metadata.content_hash.as_str())
                .param("mtime", metadata.mtime),
            )
            .await?;

        self.merge_chunks(&metadata.path, chunks).await?;

        let keep_ids: Vec<String> = chunks
            .iter()
            .map(|c| c.graph_id(&metadata.path))
            .collect();
        self.delete_orphan_chunks(&metadata.path, keep_ids).await?;

        if let Some(extraction) = extraction {
            let merged = self.merge_entities(&metadata.path, extraction).await?;
            self.merge_relationships(extraction, &merged).await?;
        }

        Ok(())
    }

    #[instrument(skip(self), fields(component = "graph_store", op = "delete_document", item_path = %path))]
    async fn delete_document(&self, path: &str) -> Result<()> {
        // Cascade: chunks first, then detach-delete the document node.
        self.graph
            .run(
                query(
                    "MATCH (d:Document {namespace: $ns, path: $path})
                     OPTIONAL MATCH (d)-[:HAS_CHUNK]->(c:Chunk)
                     DETACH DELETE c, d",
                )
                .param("ns", self.namespace.as_str())
                .param("path", path),
            )
            .await?;
        Ok(())
    }

    async fn is_available(&self) -> bool {
        match self.graph.run(query("RETURN 1")).await {
            Ok(_) => true,
            Err(e) => {
                warn!(component = "graph_store", error = %e, "Graph store unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_groups_splits_at_limit() {
        let items = [1, 2, 3, 4, 5];
        let groups: Vec<_> = batch_groups(&items, 3).collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], &[1, 2, 3]);
        assert_eq!(groups[1], &[4, 5]);
    }

    #[test]
    fn test_batch_groups_sizes_sum_and_bound() {
        let items: Vec<u32> = (0..17).collect();
        let sizes: Vec<usize> = batch_groups(&items, 4).map(|g| g.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 17);
        assert!(sizes.iter().all(|&s| s <= 4));
    }

    #[test]
    fn test_batch_groups_under_limit_single_group() {
        let items = [1, 2];
        let groups: Vec<_> = batch_groups(&items, 10).collect();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_batch_groups_empty() {
        let items: [u32; 0] = [];
        assert_eq!(batch_groups(&items, 3).count(), 0);
    }

    #[test]
    fn test_batch_groups_zero_limit_treated_as_one() {
        let items = [1, 2, 3];
        let groups: Vec<_> = batch_groups(&items, 0).collect();
        assert_eq!(groups.len(), 3);
    }
}
