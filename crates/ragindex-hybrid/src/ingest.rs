//! Documents in, chunks out to both engines.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ragindex_core::config::ChunkingSettings;
use ragindex_core::data_processor::DataProcessor;
use ragindex_core::traits::{Embedder, LexicalRetriever, VectorStore};
use ragindex_core::types::{Chunk, Document, MetaFilter, META_SOURCE};
use ragindex_embed::{EmbeddingCache, ParentChildChunker, SemanticChunker};

pub enum ChunkStrategy {
    /// Semantic chunks, or fixed-size ones when the chunker has no cache.
    Semantic(SemanticChunker),
    ParentChild(ParentChildChunker),
}

impl ChunkStrategy {
    pub fn from_settings(embedder: Arc<dyn Embedder>, cache: Option<Arc<EmbeddingCache>>, settings: &ChunkingSettings) -> Self {
        let semantic = SemanticChunker::from_settings(embedder, cache, settings);
        if settings.parent_child { Self::ParentChild(ParentChildChunker::new(semantic)) } else { Self::Semantic(semantic) }
    }

    pub async fn chunk(&self, documents: &[Document]) -> Result<Vec<Chunk>> {
        match self {
            Self::Semantic(c) => c.chunk_semantically(documents).await,
            Self::ParentChild(c) => c.chunk_with_parent_child(documents).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

pub struct Ingestor {
    strategy: ChunkStrategy,
    vector: Arc<dyn VectorStore>,
    lexical: Arc<dyn LexicalRetriever>,
}

impl Ingestor {
    pub fn new(strategy: ChunkStrategy, vector: Arc<dyn VectorStore>, lexical: Arc<dyn LexicalRetriever>) -> Self {
        Self { strategy, vector, lexical }
    }

    /// Chunks `documents`, upserts the chunks into the vector store and appends them to the lexical index.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let chunks = self.strategy.chunk(documents).await?;
        if !chunks.is_empty() {
            self.vector.upsert(&chunks).await?;
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
            self.lexical.add_documents(&texts, &ids).await?;
        }
        let report = IngestReport { documents: documents.len(), chunks: chunks.len() };
        info!(documents = report.documents, chunks = report.chunks, "ingested");
        Ok(report)
    }

    /// Loads every `.txt` and `.pdf` under `dir` and ingests it.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport> {
        let dir = dir.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || DataProcessor::new().process_directory(&dir)).await??;
        self.ingest(&documents).await
    }

    /// Distinct `source` values in the vector store.
    pub async fn list_sources(&self) -> Result<Vec<String>> { self.vector.distinct_values(META_SOURCE).await }

    /// Removes a source's chunks from the vector store. Lexical entries are
    /// append-only and stay; hybrid search drops them on re-fetch.
    pub async fn delete_source(&self, source: &str) -> Result<usize> {
        let mut filter = MetaFilter::new();
        filter.insert(META_SOURCE.to_string(), source.to_string());
        let deleted = self.vector.delete(&filter).await?;
        info!(source, deleted, "deleted source");
        Ok(deleted)
    }
}
