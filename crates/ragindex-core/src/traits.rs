//! Capabilities the retrieval engine consumes. Every external collaborator
//! (embedding model, vector store, lexical engine, cross-encoder, query
//! expander) is injected through one of these traits.

use async_trait::async_trait;

use crate::types::{Chunk, MetaFilter, SearchHit, VectorHit};

/// Embedding inference. Must be deterministic for identical text, the
/// embedding cache relies on it.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Term-based retrieval over a growing document set.
///
/// Implemented by the single persisted BM25 index and the sharded variant;
/// which one backs a deployment is a startup configuration choice.
#[async_trait]
pub trait LexicalRetriever: Send + Sync {
    async fn add_documents(&self, texts: &[String], ids: &[String]) -> anyhow::Result<()>;
    /// Top `top_k` ids by descending score. Never returns zero-score hits.
    async fn retrieve(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest chunks to `query_text`, ordered by ascending distance.
    async fn query(&self, query_text: &str, n_results: usize, filter: Option<&MetaFilter>) -> anyhow::Result<Vec<VectorHit>>;
    /// Chunks for the ids that exist, in the order requested.
    async fn get(&self, ids: &[String]) -> anyhow::Result<Vec<Chunk>>;
    async fn upsert(&self, chunks: &[Chunk]) -> anyhow::Result<()>;
    /// Removes every chunk matching `filter`, returning how many were removed.
    async fn delete(&self, filter: &MetaFilter) -> anyhow::Result<usize>;
    /// Distinct values of one metadata key across the store.
    async fn distinct_values(&self, key: &str) -> anyhow::Result<Vec<String>>;
}

/// Pairwise relevance scorer. Higher is more relevant; no normalization.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, document: &str) -> anyhow::Result<f32>;
}

/// Alternative phrasings of a query, produced by the generation service.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str, n: usize) -> anyhow::Result<Vec<String>>;
}
