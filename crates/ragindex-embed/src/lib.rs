//! ragindex-embed
//!
//! Everything between raw text and embedded chunks: the content-addressed
//! embedding cache over a key-value store, a deterministic hashing embedder
//! for development and tests, and the sentence, semantic and parent-child
//! chunkers.

pub mod cache;
pub mod chunking;
pub mod hashing;
pub mod retry;
pub mod store;

pub use cache::EmbeddingCache;
pub use chunking::parent_child::ParentChildChunker;
pub use chunking::semantic::{find_breakpoints, SemanticChunker};
pub use chunking::sentence::sentencize;
pub use hashing::HashEmbedder;
pub use retry::RetryPolicy;
pub use store::{KeyValueStore, MemoryStore};
