//! ragindex-vector
//!
//! `VectorStore` implementations: a brute-force in-memory store for tests and
//! small corpora, and a LanceDB table for persistent use. Both embed through
//! an injected `Embedder`, optionally via the shared embedding cache.

pub mod lance;
pub mod memory;
pub mod schema;

use std::sync::Arc;

use ragindex_core::traits::Embedder;
use ragindex_embed::EmbeddingCache;

pub use lance::LanceVectorStore;
pub use memory::InMemoryVectorStore;

/// Embedding call shared by the stores: through the cache when one is set.
#[derive(Clone)]
pub struct EmbedVia {
    embedder: Arc<dyn Embedder>,
    cache: Option<Arc<EmbeddingCache>>,
}

impl EmbedVia {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Option<Arc<EmbeddingCache>>) -> Self { Self { embedder, cache } }

    pub fn dim(&self) -> usize { self.embedder.dim() }

    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        match &self.cache {
            Some(cache) => cache.embed(self.embedder.as_ref(), text).await,
            None => self.embedder.embed(text).await,
        }
    }
}
