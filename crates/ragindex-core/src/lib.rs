//! ragindex-core
//!
//! Shared domain types, collaborator traits, configuration and the plain-text
//! splitting/loading helpers used by every other crate in the workspace.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod splitter;
pub mod traits;
pub mod types;
