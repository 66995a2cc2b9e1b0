//! Semantic parent chunks, each followed by its smaller fixed-size children.
//!
//! Per document the output runs parent 0, its children, parent 1, its
//! children, and so on. Chunk ids count through that sequence
//! (`{source}_{i}`); the link between the two levels lives in metadata:
//! `parent_id = {source}_p{i}` on both, `child_id = {parent_id}_c{j}` on children.

use anyhow::Result;
use tracing::info;

use ragindex_core::types::{chunk_id, Chunk, ChunkType, Document, META_CHILD_ID, META_CHUNK_TYPE, META_PARENT_ID};

use super::semantic::SemanticChunker;

pub struct ParentChildChunker {
    semantic: SemanticChunker,
}

impl ParentChildChunker {
    pub fn new(semantic: SemanticChunker) -> Self { Self { semantic } }

    pub async fn chunk_with_parent_child(&self, documents: &[Document]) -> Result<Vec<Chunk>> {
        let child_splitter = self.semantic.splitter().halved();
        let mut all = Vec::new();
        for doc in documents {
            let source = doc.source();
            let mut next = 0usize;
            for (p, parent) in self.semantic.chunk_document(doc).await?.into_iter().enumerate() {
                let parent_id = format!("{}_p{}", source, p);
                let children = child_splitter.split(&parent.text);

                let mut parent_meta = parent.metadata;
                parent_meta.insert(META_CHUNK_TYPE.to_string(), ChunkType::Parent.to_string());
                parent_meta.insert(META_PARENT_ID.to_string(), parent_id.clone());
                all.push(Chunk { id: chunk_id(source, next), text: parent.text, metadata: parent_meta.clone() });
                next += 1;

                for (c, text) in children.into_iter().enumerate() {
                    let mut metadata = parent_meta.clone();
                    metadata.insert(META_CHUNK_TYPE.to_string(), ChunkType::Child.to_string());
                    metadata.insert(META_CHILD_ID.to_string(), format!("{}_c{}", parent_id, c));
                    all.push(Chunk { id: chunk_id(source, next), text, metadata });
                    next += 1;
                }
            }
        }
        info!(docs = documents.len(), chunks = all.len(), "parent-child chunking done");
        Ok(all)
    }
}
