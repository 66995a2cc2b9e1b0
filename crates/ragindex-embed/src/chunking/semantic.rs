//! Chunking on semantic shifts between adjacent sentences.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use ragindex_core::config::ChunkingSettings;
use ragindex_core::splitter::RecursiveCharacterSplitter;
use ragindex_core::traits::Embedder;
use ragindex_core::types::{chunk_id, Chunk, ChunkType, Document, META_CHUNK_TYPE, META_SENTENCE_RANGE};

use super::fixed_chunks;
use super::sentence::sentencize_document;
use crate::cache::EmbeddingCache;

/// Cosine similarity, or `None` when it is undefined (a zero-norm vector or
/// mismatched lengths).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() { return None; }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { None } else { Some(dot / (na * nb)) }
}

/// Indices where a new chunk starts: always 0, then every `i` whose similarity
/// to `i - 1` falls below `threshold`. An undefined similarity never breaks.
/// Empty input has no breakpoints.
pub fn find_breakpoints(embeddings: &[Vec<f32>], threshold: f32) -> Vec<usize> {
    if embeddings.is_empty() { return Vec::new(); }
    let mut breakpoints = vec![0];
    for i in 1..embeddings.len() {
        if matches!(cosine_similarity(&embeddings[i - 1], &embeddings[i]), Some(sim) if sim < threshold) {
            breakpoints.push(i);
        }
    }
    breakpoints
}

pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    /// Without a cache the chunker falls back to fixed-size splitting.
    cache: Option<Arc<EmbeddingCache>>,
    threshold: f32,
    splitter: RecursiveCharacterSplitter,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Option<Arc<EmbeddingCache>>, threshold: f32, splitter: RecursiveCharacterSplitter) -> Self {
        Self { embedder, cache, threshold, splitter }
    }

    pub fn from_settings(embedder: Arc<dyn Embedder>, cache: Option<Arc<EmbeddingCache>>, settings: &ChunkingSettings) -> Self {
        let cache = if settings.semantic { cache } else { None };
        Self::new(embedder, cache, settings.semantic_threshold, RecursiveCharacterSplitter::new(settings.chunk_size, settings.chunk_overlap))
    }

    pub fn splitter(&self) -> &RecursiveCharacterSplitter { &self.splitter }

    pub fn is_semantic(&self) -> bool { self.cache.is_some() }

    pub async fn chunk_semantically(&self, documents: &[Document]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for doc in documents { chunks.extend(self.chunk_document(doc).await?); }
        info!(docs = documents.len(), chunks = chunks.len(), semantic = self.is_semantic(), "chunked documents");
        Ok(chunks)
    }

    /// Chunks one document. `sentence_range` is `start-end` with `end` exclusive.
    pub async fn chunk_document(&self, doc: &Document) -> Result<Vec<Chunk>> {
        let Some(cache) = &self.cache else { return Ok(fixed_chunks(doc, &self.splitter)) };
        let sentences = sentencize_document(doc);
        let mut embeddings = Vec::with_capacity(sentences.len());
        for sentence in &sentences { embeddings.push(cache.embed(self.embedder.as_ref(), &sentence.text).await?); }

        let breakpoints = find_breakpoints(&embeddings, self.threshold);
        debug!(source = doc.source(), sentences = sentences.len(), chunks = breakpoints.len(), "semantic breakpoints");
        let chunks = breakpoints
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = breakpoints.get(i + 1).copied().unwrap_or(sentences.len());
                let text = sentences[start..end].iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
                let mut metadata = sentences[start].metadata.clone();
                metadata.insert(META_CHUNK_TYPE.to_string(), ChunkType::Semantic.to_string());
                metadata.insert(META_SENTENCE_RANGE.to_string(), format!("{}-{}", start, end));
                Chunk { id: chunk_id(doc.source(), i), text, metadata }
            })
            .collect();
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashEmbedder;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Two fixed directions: sentences mentioning Rust and everything else.
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        fn dim(&self) -> usize { 2 }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(if text.contains("Rust") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        }
    }

    fn cache() -> Option<Arc<EmbeddingCache>> {
        Some(Arc::new(EmbeddingCache::new(Arc::new(MemoryStore::new()), "test", Duration::from_secs(60))))
    }

    fn chunker(cache_enabled: bool, threshold: f32) -> SemanticChunker {
        let cache = if cache_enabled { cache() } else { None };
        SemanticChunker::new(Arc::new(HashEmbedder::new(128)), cache, threshold, RecursiveCharacterSplitter::new(40, 10))
    }

    #[test]
    fn identical_vectors_only_break_at_zero() {
        let embeddings = vec![vec![0.3, 0.4, 0.5]; 6];
        assert_eq!(find_breakpoints(&embeddings, 0.99), vec![0]);
        assert!(find_breakpoints(&[], 0.7).is_empty());
    }

    #[test]
    fn orthogonal_vectors_break_everywhere() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        assert_eq!(find_breakpoints(&embeddings, 0.7), vec![0, 1, 2]);
    }

    #[test]
    fn zero_norm_similarity_is_undefined() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        let sim = cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]).expect("defined");
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vectors_never_break() {
        assert_eq!(find_breakpoints(&vec![vec![0.0; 8]; 4], 0.7), vec![0]);
        let mixed = vec![vec![1.0, 0.0], vec![0.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(find_breakpoints(&mixed, 0.7), vec![0]);
    }

    #[tokio::test]
    async fn punctuation_only_sentence_stays_in_its_chunk() {
        let doc = Document::new("p.txt", "Hello. ... World");
        let chunks = chunker(true, 0.7).chunk_document(&doc).await.expect("chunk");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello. ... World");
        assert_eq!(chunks[0].metadata.get(META_SENTENCE_RANGE).map(String::as_str), Some("0-3"));
    }

    #[tokio::test]
    async fn topic_shift_starts_a_new_chunk() {
        let doc = Document::new("notes.txt", "Rust borrow checker. Rust borrow checker rules. Banana bread recipe. Banana bread oven.");
        let chunker = SemanticChunker::new(Arc::new(TopicEmbedder), cache(), 0.7, RecursiveCharacterSplitter::new(40, 10));
        let chunks = chunker.chunk_document(&doc).await.expect("chunk");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "notes.txt_0");
        assert_eq!(chunks[0].text, "Rust borrow checker. Rust borrow checker rules.");
        assert_eq!(chunks[0].metadata.get(META_SENTENCE_RANGE).map(String::as_str), Some("0-2"));
        assert_eq!(chunks[1].metadata.get(META_SENTENCE_RANGE).map(String::as_str), Some("2-4"));
        assert!(chunks.iter().all(|c| c.chunk_type() == Some("semantic")));
        assert_eq!(chunks[1].metadata.get("source").map(String::as_str), Some("notes.txt"));
    }

    #[tokio::test]
    async fn rechunking_yields_identical_ids() {
        let docs = vec![Document::new("a.txt", "First idea here. Second idea there. Third."), Document::new("b.txt", "Only one.")];
        let chunker = chunker(true, 0.7);
        let first: Vec<String> = chunker.chunk_semantically(&docs).await.expect("first").into_iter().map(|c| c.id).collect();
        let second: Vec<String> = chunker.chunk_semantically(&docs).await.expect("second").into_iter().map(|c| c.id).collect();
        assert_eq!(first, second);
        assert!(first.contains(&"b.txt_0".to_string()));
    }

    #[tokio::test]
    async fn without_cache_falls_back_to_fixed_split() {
        let doc = Document::new("long.txt", "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu");
        let chunks = chunker(false, 0.7).chunk_document(&doc).await.expect("chunk");
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chunk_type() == Some("fixed") && c.text.chars().count() <= 40));
        assert_eq!(chunks[1].id, "long.txt_1");
    }

    #[tokio::test]
    async fn empty_document_has_no_chunks() {
        assert!(chunker(true, 0.7).chunk_document(&Document::new("e.txt", "   ")).await.expect("chunk").is_empty());
    }
}
