//! Hybrid retrieval: vector and lexical search in parallel, fused by rank,
//! optionally re-ranked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use tracing::{debug, warn};

use ragindex_core::config::RetrievalSettings;
use ragindex_core::traits::{LexicalRetriever, VectorStore};
use ragindex_core::types::{Candidate, Chunk, MetaFilter, SearchHit, SourceKind, VectorHit};

use crate::expansion::GuardedExpander;
use crate::fusion::{fuse_hits, RRF_K};
use crate::rerank::Reranker;

pub struct HybridSearchEngine {
    vector: Arc<dyn VectorStore>,
    lexical: Arc<dyn LexicalRetriever>,
    reranker: Option<Reranker>,
    expander: Option<GuardedExpander>,
    rrf_k: usize,
    /// Fused candidates fetched per requested result when re-ranking.
    rerank_pool: usize,
}

impl HybridSearchEngine {
    pub fn new(vector: Arc<dyn VectorStore>, lexical: Arc<dyn LexicalRetriever>) -> Self {
        Self { vector, lexical, reranker: None, expander: None, rrf_k: RRF_K, rerank_pool: 3 }
    }

    pub fn with_settings(mut self, settings: &RetrievalSettings) -> Self {
        self.rrf_k = settings.rrf_k;
        self.rerank_pool = settings.rerank_pool.max(1);
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self { self.reranker = Some(reranker); self }

    pub fn with_expander(mut self, expander: GuardedExpander) -> Self { self.expander = Some(expander); self }

    pub fn vector(&self) -> &Arc<dyn VectorStore> { &self.vector }

    pub fn lexical(&self) -> &Arc<dyn LexicalRetriever> { &self.lexical }

    /// Top `n_results` fused candidates for `query`.
    ///
    /// Both engines are asked for `2 * n_results`. If one fails the other's
    /// ranking is used alone; only both failing is an error. Texts come from a
    /// fresh `get` on the vector store, so ids it no longer holds are dropped.
    /// `filter` applies to the vector query and to the fetched chunks.
    pub async fn hybrid_search(&self, query: &str, n_results: usize, filter: Option<&MetaFilter>) -> Result<Vec<Candidate>> {
        if n_results == 0 { return Ok(Vec::new()); }
        let fetch = n_results * 2;
        let (vector, lexical) = tokio::join!(self.vector.query(query, fetch, filter), self.lexical.retrieve(query, fetch));
        let (vector_hits, lexical_hits): (Vec<VectorHit>, Vec<SearchHit>) = match (vector, lexical) {
            (Ok(v), Ok(l)) => (v, l),
            (Ok(v), Err(e)) => { warn!(error = %e, "lexical retrieval failed, using vector results only"); (v, Vec::new()) }
            (Err(e), Ok(l)) => { warn!(error = %e, "vector retrieval failed, using lexical results only"); (Vec::new(), l) }
            (Err(ve), Err(le)) => return Err(anyhow!("both retrieval paths failed: vector: {}; lexical: {}", ve, le)),
        };
        debug!(vector = vector_hits.len(), lexical = lexical_hits.len(), "retrieved");

        let fused = fuse_hits(&vector_hits, &lexical_hits, self.rrf_k);
        let ids: Vec<String> = fused.iter().map(|h| h.id.clone()).collect();
        let chunks = match self.vector.get(&ids).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "re-fetch failed, using texts from the vector hits");
                vector_hits.into_iter().map(|h| Chunk { id: h.id, text: h.text, metadata: h.metadata }).collect()
            }
        };
        let mut by_id: HashMap<String, Chunk> = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
        let candidates: Vec<Candidate> = fused
            .into_iter()
            .filter_map(|hit| {
                let chunk = by_id.remove(&hit.id)?;
                if filter.is_some_and(|f| !chunk.matches(f)) { return None; }
                Some(Candidate { id: chunk.id, text: chunk.text, metadata: chunk.metadata, score: hit.score, source: SourceKind::Fused })
            })
            .take(n_results)
            .collect();
        Ok(candidates)
    }

    /// Hybrid search followed by re-ranking when a re-ranker is configured.
    pub async fn search(&self, query: &str, n_results: usize, filter: Option<&MetaFilter>) -> Result<Vec<Candidate>> {
        let Some(reranker) = &self.reranker else { return self.hybrid_search(query, n_results, filter).await };
        let pool = self.hybrid_search(query, n_results * self.rerank_pool, filter).await?;
        Ok(reranker.rerank(query, pool, n_results).await)
    }

    /// Searches the original query and its expansions concurrently, keeps the
    /// first occurrence of each id in variant order, then re-ranks against the
    /// original query. Without an expander this is [`HybridSearchEngine::search`].
    pub async fn search_expanded(&self, query: &str, n_results: usize, filter: Option<&MetaFilter>) -> Result<Vec<Candidate>> {
        let Some(expander) = &self.expander else { return self.search(query, n_results, filter).await };
        let variants = expander.expand(query).await;
        let per_variant = n_results * self.rerank_pool;
        let results = join_all(variants.iter().map(|v| self.hybrid_search(v, per_variant, filter))).await;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;
        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(cands) => {
                    any_ok = true;
                    merged.extend(cands.into_iter().filter(|c| seen.insert(c.id.clone())));
                }
                Err(e) => { warn!(variant = %variant, error = %e, "variant search failed"); last_err = Some(e); }
            }
        }
        if !any_ok { return Err(last_err.unwrap_or_else(|| anyhow!("no query variants"))); }

        match &self.reranker {
            Some(reranker) => Ok(reranker.rerank(query, merged, n_results).await),
            None => { merged.truncate(n_results); Ok(merged) }
        }
    }
}
