//! ragindex-hybrid
//!
//! Hybrid retrieval on top of the vector and lexical engines: reciprocal rank
//! fusion, cross-encoder re-ranking, breaker-guarded query expansion and the
//! ingest pipeline that feeds both engines.

pub mod circuit_breaker;
pub mod engine;
pub mod expansion;
pub mod fusion;
pub mod ingest;
pub mod rerank;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use engine::HybridSearchEngine;
pub use expansion::GuardedExpander;
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use ingest::{ChunkStrategy, IngestReport, Ingestor};
pub use rerank::Reranker;
