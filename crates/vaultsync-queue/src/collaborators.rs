//! Default collaborator implementations.
//!
//! These cover the common deployment: plain files on disk, fixed-window
//! chunking, and entity extraction from the item's own tags, aliases, and
//! links. Richer collaborators plug in through the same traits.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::trace;

use vaultsync_core::{
    ChunkOptions, ChunkText, Chunker, ContentSource, Entity, EntityExtractor, Error,
    ExtractionResult, ItemMetadata, Relationship, Result,
};

/// Fixed-size sliding-window chunker, deterministic for the same input and
/// options. Windows are measured in characters and respect UTF-8 boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowChunker;

impl Chunker for WindowChunker {
    fn split(&self, content: &str, options: &ChunkOptions) -> Vec<ChunkText> {
        let max_chars = options.max_chars.max(1);
        let overlap = options.overlap.min(max_chars.saturating_sub(1));
        let step = max_chars - overlap;

        let chars: Vec<char> = content.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;
        while start < chars.len() {
            let end = (start + max_chars).min(chars.len());
            let text: String = chars[start..end].iter().collect();
            trace!(chunk_index = index, chars = end - start, "Chunk window");
            chunks.push(ChunkText { index, text });
            if end == chars.len() {
                break;
            }
            start += step;
            index += 1;
        }
        chunks
    }
}

/// Extracts entities from the metadata the change-event source already
/// carries: tags become tag entities, aliases become alias entities, and
/// links become document-to-document relationships. The item itself (and
/// each link target) is emitted as a document entity so every relationship
/// has mergeable entity endpoints on both sides.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagExtractor;

#[async_trait]
impl EntityExtractor for TagExtractor {
    async fn extract(
        &self,
        _content: &str,
        metadata: &ItemMetadata,
    ) -> Result<Option<ExtractionResult>> {
        if metadata.tags.is_empty() && metadata.aliases.is_empty() && metadata.links.is_empty() {
            return Ok(None);
        }

        let mut entities = Vec::new();
        let mut relationships = Vec::new();

        let doc_id = format!("doc:{}", metadata.path);
        entities.push(Entity {
            id: doc_id.clone(),
            entity_type: "document".to_string(),
            name: metadata.name.clone(),
            importance: 1.0,
        });

        for tag in &metadata.tags {
            let id = format!("tag:{}", tag);
            entities.push(Entity {
                id: id.clone(),
                entity_type: "tag".to_string(),
                name: tag.clone(),
                importance: 0.5,
            });
            relationships.push(Relationship {
                source: doc_id.clone(),
                target: id,
                rel_type: "tagged".to_string(),
                description: format!("{} is tagged {}", metadata.path, tag),
            });
        }

        for alias in &metadata.aliases {
            entities.push(Entity {
                id: format!("alias:{}", alias),
                entity_type: "alias".to_string(),
                name: alias.clone(),
                importance: 0.3,
            });
        }

        for link in &metadata.links {
            let target = format!("doc:{}", link);
            entities.push(Entity {
                id: target.clone(),
                entity_type: "document".to_string(),
                name: link.clone(),
                importance: 1.0,
            });
            relationships.push(Relationship {
                source: doc_id.clone(),
                target,
                rel_type: "links_to".to_string(),
                description: format!("{} links to {}", metadata.path, link),
            });
        }

        Ok(Some(ExtractionResult {
            entities,
            relationships,
        }))
    }
}

/// Loads item content from a directory tree rooted at `root`. Item paths
/// are interpreted relative to the root; absolute or escaping paths are
/// rejected.
#[derive(Debug, Clone)]
pub struct FileContentSource {
    root: PathBuf,
}

impl FileContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContentSource for FileContentSource {
    async fn load(&self, path: &str) -> Result<String> {
        let relative = std::path::Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::InvalidInput(format!(
                "item path escapes content root: {}",
                path
            )));
        }
        let full = self.root.join(relative);
        Ok(tokio::fs::read_to_string(full).await?)
    }
}
