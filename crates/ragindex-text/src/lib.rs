//! ragindex-text
//!
//! Lexical retrieval: a BM25 scorer over tantivy-tokenized text, persisted to
//! a shared snapshot (`persisted`) or split into in-memory shards (`sharded`).

pub mod backend;
pub mod bm25;
pub mod persisted;
pub mod sharded;
pub mod tokenizer;

pub use backend::LexicalBackend;
pub use bm25::{Bm25Index, Bm25Params};
pub use persisted::{IndexOutcome, PersistedBm25};
pub use sharded::ShardedBm25;
