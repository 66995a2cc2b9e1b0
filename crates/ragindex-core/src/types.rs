//! Domain types shared by the chunkers, the lexical and vector engines and the
//! hybrid orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// Equality filter over chunk metadata: every `(key, value)` pair must match.
pub type MetaFilter = HashMap<String, String>;

pub const META_SOURCE: &str = "source";
pub const META_CHUNK_TYPE: &str = "chunk_type";
pub const META_PARENT_ID: &str = "parent_id";
pub const META_CHILD_ID: &str = "child_id";
pub const META_SENTENCE_RANGE: &str = "sentence_range";

/// A raw ingested document. Immutable once indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Meta,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let id = id.into();
        let mut metadata = Meta::new();
        metadata.insert(META_SOURCE.to_string(), id.clone());
        Self { id, text: text.into(), metadata }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Name used to derive chunk ids: the `source` metadata, else the document id.
    pub fn source(&self) -> &str {
        self.metadata.get(META_SOURCE).map(String::as_str).unwrap_or(&self.id)
    }
}

/// How a chunk was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Semantic,
    Parent,
    Child,
    /// Fixed-size split, emitted when semantic chunking is unavailable.
    Fixed,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Semantic => "semantic",
            ChunkType::Parent => "parent",
            ChunkType::Child => "child",
            ChunkType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// The unit stored in both the vector store and the lexical index.
///
/// - `id`: `{source}_{index}`, deterministic for identical input
/// - `metadata`: parent document metadata plus `chunk_type`, and depending on
///   the chunker `sentence_range`, `parent_id`, `child_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
}

impl Chunk {
    pub fn chunk_type(&self) -> Option<&str> { self.metadata.get(META_CHUNK_TYPE).map(String::as_str) }

    pub fn matches(&self, filter: &MetaFilter) -> bool { matches_filter(&self.metadata, filter) }
}

pub fn chunk_id(source: &str, index: usize) -> ChunkId { format!("{}_{}", source, index) }

pub fn matches_filter(metadata: &Meta, filter: &MetaFilter) -> bool {
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
    Fused,
    Reranked,
}

/// The minimal surface returned by all engines.
///
/// `id` matches `Chunk::id`. `score` is engine-specific but higher is always
/// better. `source` labels the origin engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// A vector-store match. Lower `distance` is closer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub distance: f32,
}

/// A retrieved passage handed to the generation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub score: f32,
    pub source: SourceKind,
}
