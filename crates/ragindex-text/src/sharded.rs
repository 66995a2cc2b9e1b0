//! Corpus partitioned into bounded-size BM25 shards searched in parallel.
//!
//! Each shard scores against its own statistics only, so shard-local scores
//! from different shards are not calibrated against each other. Merging them
//! by raw score is an approximation and is kept that way deliberately.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, info};

use ragindex_core::error::ensure_aligned;
use ragindex_core::traits::LexicalRetriever;
use ragindex_core::types::SearchHit;

use crate::bm25::{Bm25Index, Bm25Params};
use crate::tokenizer::tokenize;

#[derive(Default, Clone)]
struct Shards {
    shards: Vec<Arc<Bm25Index>>,
    doc_to_shard: HashMap<String, usize>,
}

pub struct ShardedBm25 {
    shard_size: usize,
    params: Bm25Params,
    /// Readers clone the shard list and search outside the lock.
    current: RwLock<Shards>,
    /// Serializes `add_documents` within the process.
    writer: tokio::sync::Mutex<()>,
}

impl ShardedBm25 {
    pub fn new(shard_size: usize, params: Bm25Params) -> Self {
        Self { shard_size: shard_size.max(1), params, current: RwLock::new(Shards::default()), writer: tokio::sync::Mutex::new(()) }
    }

    pub fn shard_size(&self) -> usize { self.shard_size }

    pub fn shard_count(&self) -> usize { self.snapshot().shards.len() }

    pub fn shard_sizes(&self) -> Vec<usize> { self.snapshot().shards.iter().map(|s| s.len()).collect() }

    /// Shard holding `doc_id`; the latest one if the id was added more than once.
    pub fn shard_of(&self, doc_id: &str) -> Option<usize> { self.snapshot().doc_to_shard.get(doc_id).copied() }

    fn snapshot(&self) -> Shards { self.current.read().unwrap_or_else(PoisonError::into_inner).clone() }

    /// Appends to the last shard, opening a new one whenever it is full.
    pub async fn add_documents(&self, texts: &[String], ids: &[String]) -> Result<()> {
        ensure_aligned(texts, ids)?;
        if texts.is_empty() { return Ok(()); }
        let _guard = self.writer.lock().await;
        let mut next = self.snapshot();
        let (shard_size, params) = (self.shard_size, self.params);
        let texts = texts.to_vec();
        let ids = ids.to_vec();
        let next = tokio::task::spawn_blocking(move || {
            let mut touched: HashSet<usize> = HashSet::new();
            for (text, id) in texts.iter().zip(ids) {
                if next.shards.last().map_or(true, |s| s.len() >= shard_size) {
                    next.shards.push(Arc::new(Bm25Index::new(params)));
                }
                let idx = next.shards.len() - 1;
                Arc::make_mut(&mut next.shards[idx]).push(tokenize(text), id.clone());
                next.doc_to_shard.insert(id, idx);
                touched.insert(idx);
            }
            // Untouched shards keep their corpus, so their statistics are already current.
            for idx in touched { Arc::make_mut(&mut next.shards[idx]).rebuild(); }
            next
        })
        .await?;
        info!(shards = next.shards.len(), docs = next.doc_to_shard.len(), "sharded bm25 updated");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    /// Queries every shard concurrently for `2 * top_k`, merges by shard-local
    /// score and keeps the first occurrence of each id.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let shards = self.snapshot().shards;
        if shards.is_empty() || top_k == 0 { return Ok(Vec::new()); }
        let per_shard = top_k * 2;
        let tasks = shards.into_iter().map(|shard| {
            let query = query.to_string();
            tokio::task::spawn_blocking(move || shard.retrieve(&query, per_shard))
        });
        let results = try_join_all(tasks).await?;
        let mut all: Vec<SearchHit> = results.into_iter().flatten().collect();
        debug!(candidates = all.len(), "merged shard results");
        all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let mut seen = HashSet::new();
        all.retain(|hit| seen.insert(hit.id.clone()));
        all.truncate(top_k);
        Ok(all)
    }
}

#[async_trait]
impl LexicalRetriever for ShardedBm25 {
    async fn add_documents(&self, texts: &[String], ids: &[String]) -> Result<()> {
        ShardedBm25::add_documents(self, texts, ids).await
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        ShardedBm25::retrieve(self, query, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(n: usize) -> (Vec<String>, Vec<String>) {
        ((0..n).map(|i| format!("Document {}", i)).collect(), (0..n).map(|i| format!("id_{}", i)).collect())
    }

    #[tokio::test]
    async fn five_docs_with_shard_size_two_make_three_shards() {
        let index = ShardedBm25::new(2, Bm25Params::default());
        let (texts, ids) = docs(5);
        index.add_documents(&texts, &ids).await.expect("add");
        assert_eq!(index.shard_sizes(), vec![2, 2, 1]);
        assert_eq!(index.shard_of("id_0"), Some(0));
        assert_eq!(index.shard_of("id_4"), Some(2));
        assert_eq!(index.shard_of("missing"), None);
    }

    #[tokio::test]
    async fn later_batches_fill_the_last_shard_first() {
        let index = ShardedBm25::new(2, Bm25Params::default());
        index.add_documents(&["a".to_string()], &["x".to_string()]).await.expect("add");
        index.add_documents(&["b".to_string(), "c".to_string()], &["y".to_string(), "z".to_string()]).await.expect("add");
        assert_eq!(index.shard_sizes(), vec![2, 1]);
        assert_eq!(index.shard_of("y"), Some(0));
    }

    #[tokio::test]
    async fn duplicate_ids_across_shards_are_returned_once() {
        let index = ShardedBm25::new(1, Bm25Params::default());
        let texts = vec!["fox den".to_string(), "fox den".to_string(), "owl".to_string()];
        let ids = vec!["dup".to_string(), "dup".to_string(), "owl".to_string()];
        index.add_documents(&texts, &ids).await.expect("add");
        assert_eq!(index.shard_count(), 3);
        let hits = index.retrieve("fox", 5).await.expect("retrieve");
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["dup"]);
    }

    #[tokio::test]
    async fn retrieve_across_shards_truncates_to_top_k() {
        let index = ShardedBm25::new(2, Bm25Params::default());
        let (texts, ids) = docs(100);
        index.add_documents(&texts, &ids).await.expect("add");
        assert_eq!(index.shard_count(), 50);
        let hits = index.retrieve("Document 50", 5).await.expect("retrieve");
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().any(|h| h.id == "id_50"));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let index = ShardedBm25::new(10, Bm25Params::default());
        assert!(index.retrieve("anything", 3).await.expect("retrieve").is_empty());
    }
}
