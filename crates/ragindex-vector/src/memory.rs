use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use ragindex_core::traits::{Embedder, VectorStore};
use ragindex_core::types::{Chunk, MetaFilter, VectorHit};
use ragindex_embed::EmbeddingCache;

use crate::EmbedVia;

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine store. Rows keep insertion order; upserting an existing
/// id replaces it in place.
pub struct InMemoryVectorStore {
    embed: EmbedVia,
    rows: RwLock<Vec<Entry>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self { Self::with_cache(embedder, None) }

    pub fn with_cache(embedder: Arc<dyn Embedder>, cache: Option<Arc<EmbeddingCache>>) -> Self {
        Self { embed: EmbedVia::new(embedder, cache), rows: RwLock::new(Vec::new()) }
    }

    pub async fn len(&self) -> usize { self.rows.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 1.0 } else { 1.0 - dot / (na * nb) }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(&self, query_text: &str, n_results: usize, filter: Option<&MetaFilter>) -> Result<Vec<VectorHit>> {
        let q = self.embed.embed(query_text).await?;
        let rows = self.rows.read().await;
        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter(|e| filter.map_or(true, |f| e.chunk.matches(f)))
            .map(|e| VectorHit { id: e.chunk.id.clone(), text: e.chunk.text.clone(), metadata: e.chunk.metadata.clone(), distance: cosine_distance(&q, &e.vector) })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let rows = self.rows.read().await;
        let by_id: HashMap<&str, &Chunk> = rows.iter().map(|e| (e.chunk.id.as_str(), &e.chunk)).collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id.as_str()).map(|c| (*c).clone())).collect())
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks { embedded.push(Entry { chunk: chunk.clone(), vector: self.embed.embed(&chunk.text).await? }); }
        let mut rows = self.rows.write().await;
        for entry in embedded {
            match rows.iter_mut().find(|e| e.chunk.id == entry.chunk.id) {
                Some(existing) => *existing = entry,
                None => rows.push(entry),
            }
        }
        Ok(())
    }

    async fn delete(&self, filter: &MetaFilter) -> Result<usize> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|e| !e.chunk.matches(filter));
        Ok(before - rows.len())
    }

    async fn distinct_values(&self, key: &str) -> Result<Vec<String>> {
        let rows = self.rows.read().await;
        let values: BTreeSet<String> = rows.iter().filter_map(|e| e.chunk.metadata.get(key).cloned()).collect();
        Ok(values.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragindex_core::types::Meta;
    use ragindex_embed::HashEmbedder;

    fn chunk(id: &str, source: &str, text: &str) -> Chunk {
        let mut metadata = Meta::new();
        metadata.insert("source".into(), source.into());
        Chunk { id: id.into(), text: text.into(), metadata }
    }

    fn store() -> InMemoryVectorStore { InMemoryVectorStore::new(Arc::new(HashEmbedder::new(64))) }

    #[tokio::test]
    async fn nearest_chunk_comes_first() {
        let store = store();
        store.upsert(&[chunk("a_0", "a", "rust borrow checker"), chunk("b_0", "b", "banana bread oven")]).await.expect("upsert");
        let hits = store.query("borrow checker", 2, None).await.expect("query");
        assert_eq!(hits[0].id, "a_0");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_counts() {
        let store = store();
        store.upsert(&[chunk("a_0", "a", "one"), chunk("a_1", "a", "two"), chunk("b_0", "b", "three")]).await.expect("upsert");
        store.upsert(&[chunk("a_0", "a", "uno")]).await.expect("upsert");
        assert_eq!(store.len().await, 3);
        assert_eq!(store.get(&["a_0".into()]).await.expect("get")[0].text, "uno");

        let mut filter = MetaFilter::new();
        filter.insert("source".into(), "a".into());
        assert_eq!(store.query("one", 10, Some(&filter)).await.expect("query").len(), 2);
        assert_eq!(store.delete(&filter).await.expect("delete"), 2);
        assert_eq!(store.distinct_values("source").await.expect("distinct"), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn get_keeps_requested_order_and_skips_missing() {
        let store = store();
        store.upsert(&[chunk("x", "s", "one"), chunk("y", "s", "two")]).await.expect("upsert");
        let got = store.get(&["y".into(), "missing".into(), "x".into()]).await.expect("get");
        assert_eq!(got.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["y", "x"]);
    }
}
