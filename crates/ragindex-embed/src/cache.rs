//! Content-addressed embedding cache.
//!
//! Keys are `{namespace}:emb:{digest}` where `digest` is the hex of the first
//! 16 bytes of the BLAKE3 hash of the text, so identical text maps to the same
//! key in every process. Values are JSON arrays of `f32`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use ragindex_core::config::CacheSettings;
use ragindex_core::traits::Embedder;

use crate::retry::{with_retry, RetryPolicy};
use crate::store::KeyValueStore;

const DIGEST_BYTES: usize = 16;

pub struct EmbeddingCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    ttl: Duration,
    retry: RetryPolicy,
    /// Held across lookup, embed and store so one process computes each text once.
    lock: tokio::sync::Mutex<()>,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self { store, namespace: namespace.into(), ttl, retry: RetryPolicy::default(), lock: tokio::sync::Mutex::new(()) }
    }

    pub fn from_settings(store: Arc<dyn KeyValueStore>, settings: &CacheSettings) -> Self {
        Self::new(store, settings.namespace.clone(), settings.embedding_ttl()).with_retry(RetryPolicy::from_settings(settings))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self { self.retry = retry; self }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn key_for(&self, text: &str) -> String {
        let hash = blake3::hash(text.as_bytes());
        let digest: String = hash.as_bytes()[..DIGEST_BYTES].iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}:emb:{}", self.namespace, digest)
    }

    /// Stored vector for `text`, if any. Store failures surface after retries.
    pub async fn get(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let _guard = self.lock.lock().await;
        self.lookup(&self.key_for(text)).await
    }

    /// Cached vector for `text`, else `embed_fn()` stored under the TTL.
    ///
    /// A store that stays unreachable after retries does not fail the call:
    /// the vector is computed (or returned) without caching.
    pub async fn get_or_create<F, Fut>(&self, text: &str, embed_fn: F) -> Result<Vec<f32>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<f32>>>,
    {
        let key = self.key_for(text);
        let _guard = self.lock.lock().await;
        match self.lookup(&key).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "embedding cache read failed, computing"),
        }
        let vector = embed_fn().await?;
        let value = serde_json::to_string(&vector)?;
        let store = &self.store;
        let written = with_retry(&self.retry, "cache set", || {
            let value = value.clone();
            let key = key.as_str();
            async move { store.set(key, value, self.ttl).await }
        })
        .await;
        if let Err(e) = written { warn!(key = %key, error = %e, "embedding cache write failed"); }
        Ok(vector)
    }

    /// `get_or_create` with `embedder` as the compute function.
    pub async fn embed(&self, embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
        self.get_or_create(text, || embedder.embed(text)).await
    }

    async fn lookup(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let store = &self.store;
        let raw = with_retry(&self.retry, "cache get", || async move { store.get(key).await }).await?;
        let Some(raw) = raw else { return Ok(None) };
        match serde_json::from_str::<Vec<f32>>(&raw) {
            Ok(vector) => { debug!(key, "embedding cache hit"); Ok(Some(vector)) }
            Err(e) => { warn!(key, error = %e, "discarding malformed cache entry"); Ok(None) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> EmbeddingCache { EmbeddingCache::new(Arc::new(MemoryStore::new()), "rag", Duration::from_secs(60)) }

    #[test]
    fn key_is_namespaced_hex_digest() {
        let cache = cache();
        let key = cache.key_for("hello");
        assert!(key.starts_with("rag:emb:"));
        let digest = &key["rag:emb:".len()..];
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache.key_for("hello"));
        assert_ne!(key, cache.key_for("hello "));
    }

    #[tokio::test]
    async fn second_lookup_is_a_hit() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        for _ in 0..2 {
            let v = cache
                .get_or_create("same text", || async move { calls.fetch_add(1, Ordering::SeqCst); Ok(vec![0.5, 0.25]) })
                .await
                .expect("embed");
            assert_eq!(v, vec![0.5, 0.25]);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("same text").await.expect("get"), Some(vec![0.5, 0.25]));
        assert_eq!(cache.get("other").await.expect("get"), None);
    }

    #[tokio::test]
    async fn concurrent_callers_compute_once() {
        let cache = Arc::new(cache());
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let (cache, counter) = (cache.clone(), counter.clone());
                tokio::spawn(async move {
                    cache
                        .get_or_create("shared", || async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            Ok(vec![1.0])
                        })
                        .await
                })
            })
            .collect();
        for task in tasks { task.await.expect("join").expect("embed"); }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embed_errors_propagate_and_are_not_cached() {
        let cache = cache();
        let failed = cache.get_or_create("x", || async { anyhow::bail!("model down") }).await;
        assert!(failed.is_err());
        assert_eq!(cache.get("x").await.expect("get"), None);
    }
}
