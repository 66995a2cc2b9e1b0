//! Key-value store the embedding cache sits on.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// External cache service contract: string keys and values with a TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

struct Entries {
    map: HashMap<String, (String, Instant)>,
    /// Map size at which the next `set` drops expired entries.
    sweep_at: usize,
}

/// Process-local store used when no external cache is configured.
///
/// Expired entries are dropped when read and swept in bulk once the map grows
/// past a threshold, so the map stays within about twice its live size.
pub struct MemoryStore {
    entries: Mutex<Entries>,
    sweep_threshold: usize,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::with_sweep_threshold(DEFAULT_SWEEP_THRESHOLD) }
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_sweep_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self { entries: Mutex::new(Entries { map: HashMap::new(), sweep_at: threshold }), sweep_threshold: threshold }
    }

    /// Live entries only.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).map.values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Entries held in memory, expired ones not yet swept included.
    pub fn stored(&self) -> usize { self.entries.lock().unwrap_or_else(PoisonError::into_inner).map.len() }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.map.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => { entries.map.remove(key); Ok(None) }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.map.len() >= entries.sweep_at {
            let before = entries.map.len();
            entries.map.retain(|_, (_, exp)| *exp > now);
            entries.sweep_at = (entries.map.len() * 2).max(self.sweep_threshold);
            debug!(dropped = before - entries.map.len(), kept = entries.map.len(), "swept expired cache entries");
        }
        entries.map.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}
