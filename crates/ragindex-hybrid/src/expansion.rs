use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use ragindex_core::config::Settings;
use ragindex_core::traits::QueryExpander;

use crate::circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};

/// Query expansion behind a circuit breaker and a timeout.
///
/// Always yields the original query first. Any failure (breaker open,
/// timeout, expander error) degrades to just the original query.
pub struct GuardedExpander {
    expander: Arc<dyn QueryExpander>,
    breaker: CircuitBreaker,
    timeout: Duration,
    variations: usize,
}

impl GuardedExpander {
    pub fn new(expander: Arc<dyn QueryExpander>, breaker: CircuitBreaker, timeout: Duration, variations: usize) -> Self {
        Self { expander, breaker, timeout, variations }
    }

    pub fn from_settings(expander: Arc<dyn QueryExpander>, settings: &Settings) -> Self {
        let breaker = CircuitBreaker::new("query_expansion", CircuitBreakerConfig::from_settings(&settings.breaker));
        Self::new(expander, breaker, settings.retrieval.expansion_timeout(), settings.retrieval.expansion_variations)
    }

    pub fn breaker(&self) -> &CircuitBreaker { &self.breaker }

    /// `[query]` followed by up to `variations` distinct, non-blank rewrites.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let mut out = vec![query.to_string()];
        if self.variations == 0 { return out; }
        let expander = &self.expander;
        let n = self.variations;
        match self.breaker.call_with_timeout(self.timeout, || expander.expand(query, n)).await {
            Ok(variants) => {
                for v in variants.into_iter().map(|v| v.trim().to_string()) {
                    if out.len() > n { break; }
                    if !v.is_empty() && !out.contains(&v) { out.push(v); }
                }
                debug!(variants = out.len() - 1, "query expanded");
            }
            Err(BreakerError::Open) => debug!("expansion circuit open, using original query"),
            Err(BreakerError::TimedOut(limit)) => warn!(timeout_ms = limit.as_millis() as u64, "query expansion timed out"),
            Err(BreakerError::Failed(e)) => warn!(error = %e, "query expansion failed"),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::circuit_breaker::CircuitState;

    struct Scripted {
        delay: Duration,
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl QueryExpander for Scripted {
        async fn expand(&self, query: &str, n: usize) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail { anyhow::bail!("llm unavailable") }
            let mut v: Vec<String> = (0..n + 2).map(|i| format!("{} variant {}", query, i)).collect();
            v.insert(0, query.to_string());
            v.push("  ".to_string());
            Ok(v)
        }
    }

    fn expander(delay_ms: u64, fail: bool) -> Arc<Scripted> {
        Arc::new(Scripted { delay: Duration::from_millis(delay_ms), fail, calls: AtomicU32::new(0) })
    }

    fn guarded(inner: Arc<Scripted>, threshold: u32) -> GuardedExpander {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::new(threshold, Duration::from_secs(60)));
        GuardedExpander::new(inner, breaker, Duration::from_millis(50), 2)
    }

    #[tokio::test]
    async fn original_first_then_distinct_variations() {
        let out = guarded(expander(0, false), 5).expand("fox").await;
        assert_eq!(out, vec!["fox", "fox variant 0", "fox variant 1"]);
    }

    #[tokio::test]
    async fn timeout_falls_back_and_counts_toward_breaker() {
        let inner = expander(500, false);
        let g = guarded(inner.clone(), 1);
        assert_eq!(g.expand("fox").await, vec!["fox"]);
        assert_eq!(g.breaker().state(), CircuitState::Open);
        assert_eq!(g.expand("fox").await, vec!["fox"]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1, "open circuit skips the call");
    }

    #[tokio::test]
    async fn failures_fall_back_to_original() {
        let g = guarded(expander(0, true), 2);
        assert_eq!(g.expand("fox").await, vec!["fox"]);
        assert_eq!(g.breaker().failures(), 1);
    }
}
