use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use ragindex_core::config::RetrievalSettings;
use ragindex_core::traits::CrossEncoder;
use ragindex_core::types::{Candidate, SourceKind};

/// Cross-encoder stage over fused candidates.
pub struct Reranker {
    scorer: Arc<dyn CrossEncoder>,
    min_score: f32,
    /// How many fused candidates to return when every score is below `min_score`.
    fallback: usize,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn CrossEncoder>, min_score: f32, fallback: usize) -> Self { Self { scorer, min_score, fallback } }

    pub fn from_settings(scorer: Arc<dyn CrossEncoder>, settings: &RetrievalSettings) -> Self {
        Self::new(scorer, settings.rerank_min_score, settings.rerank_fallback)
    }

    /// Scores every candidate against `query`, keeps those at or above the
    /// floor, best first, at most `n`.
    ///
    /// - all rejected: the first `fallback` fused candidates, unfiltered, even when `n` is smaller
    /// - scorer error: the fused order, truncated to `n`
    pub async fn rerank(&self, query: &str, candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
        if candidates.is_empty() { return candidates; }
        let scores = join_all(candidates.iter().map(|c| self.scorer.score(query, &c.text))).await;
        let scores: Result<Vec<f32>, _> = scores.into_iter().collect();
        let scores = match scores {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "re-ranker failed, keeping fused order");
                return candidates.into_iter().take(n).collect();
            }
        };

        let mut scored: Vec<Candidate> = candidates
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.min_score)
            .map(|(c, score)| Candidate { score, source: SourceKind::Reranked, ..c.clone() })
            .collect();
        if scored.is_empty() {
            debug!(candidates = candidates.len(), floor = self.min_score, "re-ranker rejected everything, falling back");
            return candidates.into_iter().take(self.fallback).collect();
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }
}
