//! Startup-time choice between the single persisted index and the sharded one.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use ragindex_core::config::{expand_path, Settings};
use ragindex_core::traits::LexicalRetriever;
use ragindex_core::types::SearchHit;

use crate::bm25::Bm25Params;
use crate::persisted::PersistedBm25;
use crate::sharded::ShardedBm25;

pub enum LexicalBackend {
    Persisted(PersistedBm25),
    /// In-memory only; rebuilt from the vector store or re-ingest on restart.
    Sharded(ShardedBm25),
}

impl LexicalBackend {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let params = Bm25Params { k1: settings.bm25.k1, b: settings.bm25.b };
        if settings.bm25.sharded {
            info!(shard_size = settings.bm25.shard_size, "using sharded bm25");
            return Ok(Self::Sharded(ShardedBm25::new(settings.bm25.shard_size, params)));
        }
        let path = expand_path(&settings.data.bm25_index_path);
        info!(path = %path.display(), "using persisted bm25");
        Ok(Self::Persisted(PersistedBm25::open(path, params)?))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Persisted(_) => "persisted",
            Self::Sharded(_) => "sharded",
        }
    }
}

#[async_trait]
impl LexicalRetriever for LexicalBackend {
    async fn add_documents(&self, texts: &[String], ids: &[String]) -> Result<()> {
        match self {
            Self::Persisted(index) => LexicalRetriever::add_documents(index, texts, ids).await,
            Self::Sharded(index) => index.add_documents(texts, ids).await,
        }
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        match self {
            Self::Persisted(index) => LexicalRetriever::retrieve(index, query, top_k).await,
            Self::Sharded(index) => index.retrieve(query, top_k).await,
        }
    }
}
