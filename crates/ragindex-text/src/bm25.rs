//! In-memory BM25 index over tokenized documents.
//!
//! `corpus[i]` and `doc_ids[i]` are index-parallel and only ever appended to.
//! Scoring statistics are derived from the corpus and rebuilt with
//! [`Bm25Index::rebuild`] after a batch of appends.

use std::cmp::Ordering;
use std::collections::HashMap;

use ragindex_core::types::{SearchHit, SourceKind};

use crate::tokenizer::tokenize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Document-length normalization.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.5, b: 0.75 } }
}

#[derive(Debug, Clone, Default)]
struct Stats {
    doc_freqs: HashMap<String, usize>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avgdl: f32,
}

impl Stats {
    fn compute(corpus: &[Vec<String>]) -> Self {
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        for doc in corpus {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for term in doc { *tf.entry(term.clone()).or_insert(0) += 1; }
            for term in tf.keys() { *doc_freqs.entry(term.clone()).or_insert(0) += 1; }
            term_freqs.push(tf);
            doc_lens.push(doc.len());
        }
        let total: usize = doc_lens.iter().sum();
        let avgdl = if corpus.is_empty() { 0.0 } else { total as f32 / corpus.len() as f32 };
        Self { doc_freqs, term_freqs, doc_lens, avgdl }
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`, strictly positive for df >= 1.
    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_lens.len() as f32;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    corpus: Vec<Vec<String>>,
    doc_ids: Vec<String>,
    stats: Stats,
    stale: bool,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self { Self { params, ..Self::default() } }

    /// Builds an index from already-tokenized parallel arrays.
    pub fn from_parts(params: Bm25Params, corpus: Vec<Vec<String>>, doc_ids: Vec<String>) -> anyhow::Result<Self> {
        ragindex_core::error::ensure_aligned(&corpus, &doc_ids)?;
        let mut index = Self { params, corpus, doc_ids, stats: Stats::default(), stale: true };
        index.rebuild();
        Ok(index)
    }

    pub fn params(&self) -> Bm25Params { self.params }
    pub fn len(&self) -> usize { self.doc_ids.len() }
    pub fn is_empty(&self) -> bool { self.doc_ids.is_empty() }
    pub fn corpus(&self) -> &[Vec<String>] { &self.corpus }
    pub fn doc_ids(&self) -> &[String] { &self.doc_ids }

    /// Appends one tokenized document. Statistics go stale until `rebuild`.
    pub fn push(&mut self, tokens: Vec<String>, doc_id: String) {
        self.corpus.push(tokens);
        self.doc_ids.push(doc_id);
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool { self.stale }

    /// Recomputes document frequencies, lengths and term frequencies over the whole corpus.
    pub fn rebuild(&mut self) {
        self.stats = Stats::compute(&self.corpus);
        self.stale = false;
    }

    /// BM25 score of every corpus document for the given query tokens.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let Bm25Params { k1, b } = self.params;
        let avgdl = if self.stats.avgdl > 0.0 { self.stats.avgdl } else { 1.0 };
        let mut scores = vec![0.0f32; self.stats.term_freqs.len()];
        for term in query_tokens {
            if !self.stats.doc_freqs.contains_key(term) { continue; }
            let idf = self.stats.idf(term);
            for (i, tf_map) in self.stats.term_freqs.iter().enumerate() {
                let Some(&tf) = tf_map.get(term) else { continue };
                let tf = tf as f32;
                let dl = self.stats.doc_lens[i] as f32;
                scores[i] += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avgdl));
            }
        }
        scores
    }

    /// Top `top_k` documents by descending score, zero scores excluded, ties in insertion order.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        if self.is_empty() || top_k == 0 { return Vec::new(); }
        let tokens = tokenize(query);
        if tokens.is_empty() { return Vec::new(); }
        let scores = self.scores(&tokens);
        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().filter(|&(_, s)| s > 0.0).collect();
        // stable: equal scores keep insertion order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(top_k);
        ranked
            .into_iter()
            .map(|(i, score)| SearchHit { id: self.doc_ids[i].clone(), score, source: SourceKind::Text })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(docs: &[&str]) -> Bm25Index {
        let corpus = docs.iter().map(|d| tokenize(d)).collect();
        let ids = (0..docs.len()).map(|i| format!("d{}", i + 1)).collect();
        Bm25Index::from_parts(Bm25Params::default(), corpus, ids).expect("index")
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> { hits.iter().map(|h| h.id.as_str()).collect() }

    #[test]
    fn quick_fox_ranks_full_match_first_and_drops_non_matches() {
        let index = index_of(&["the quick brown fox", "machine learning is fascinating", "fox and hound"]);
        let hits = index.retrieve("quick fox", 2);
        assert_eq!(ids(&hits), vec!["d1", "d3"]);
        assert!(hits[0].score > hits[1].score);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[test]
    fn empty_index_or_query_returns_nothing() {
        assert!(Bm25Index::new(Bm25Params::default()).retrieve("fox", 5).is_empty());
        let index = index_of(&["fox"]);
        assert!(index.retrieve("", 5).is_empty());
        assert!(index.retrieve("?!", 5).is_empty());
        assert!(index.retrieve("fox", 0).is_empty());
    }

    #[test]
    fn higher_term_frequency_scores_higher() {
        let index = index_of(&["rust rust rust", "rust programming"]);
        let hits = index.retrieve("rust", 10);
        assert_eq!(ids(&hits), vec!["d1", "d2"]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = index_of(&["same words", "other", "same words"]);
        assert_eq!(ids(&index.retrieve("same", 10)), vec!["d1", "d3"]);
    }

    #[test]
    fn term_in_every_document_still_scores_positive() {
        let index = index_of(&["fox one", "fox two", "fox three"]);
        let hits = index.retrieve("fox", 10);
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[test]
    fn push_marks_stale_until_rebuild() {
        let mut index = index_of(&["alpha"]);
        index.push(tokenize("beta"), "d2".into());
        assert!(index.is_stale());
        assert!(index.retrieve("beta", 5).is_empty(), "stats not rebuilt yet");
        index.rebuild();
        assert_eq!(ids(&index.retrieve("beta", 5)), vec!["d2"]);
    }

    #[test]
    fn misaligned_parts_are_rejected() {
        let err = Bm25Index::from_parts(Bm25Params::default(), vec![vec!["a".into()]], vec![]).unwrap_err();
        assert!(err.to_string().contains("1 texts but 0 ids"));
    }

    #[test]
    fn repeated_query_terms_accumulate() {
        let index = index_of(&["fox", "dog"]);
        let once = index.retrieve("fox", 1)[0].score;
        let twice = index.retrieve("fox fox", 1)[0].score;
        assert!((twice - 2.0 * once).abs() < 1e-5);
    }
}
