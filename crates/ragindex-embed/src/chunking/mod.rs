pub mod parent_child;
pub mod semantic;
pub mod sentence;

use ragindex_core::splitter::RecursiveCharacterSplitter;
use ragindex_core::types::{chunk_id, Chunk, ChunkType, Document, META_CHUNK_TYPE};

/// Fixed-size chunks of `doc`, ids `{source}_{i}`.
pub fn fixed_chunks(doc: &Document, splitter: &RecursiveCharacterSplitter) -> Vec<Chunk> {
    splitter
        .split(&doc.text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut metadata = doc.metadata.clone();
            metadata.insert(META_CHUNK_TYPE.to_string(), ChunkType::Fixed.to_string());
            Chunk { id: chunk_id(doc.source(), i), text, metadata }
        })
        .collect()
}
