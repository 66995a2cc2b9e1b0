//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_BM25__K1=1.2` sets `bm25.k1`). `Settings` is the typed view; every
//! field has a default so an empty configuration is valid.
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Wraps an explicit figment, layered over the defaults.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract::<Settings>()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub bm25: Bm25Settings,
    pub chunking: ChunkingSettings,
    pub cache: CacheSettings,
    pub retrieval: RetrievalSettings,
    pub breaker: BreakerSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.bm25.shard_size == 0 { return Err(Error::InvalidConfig("bm25.shard_size must be > 0".into())); }
        if self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(Error::InvalidConfig(format!("bm25 k1={} b={} out of range", self.bm25.k1, self.bm25.b)));
        }
        if self.chunking.chunk_size == 0 { return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into())); }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::InvalidConfig("chunking.chunk_overlap must be smaller than chunk_size".into()));
        }
        if self.breaker.failure_threshold == 0 { return Err(Error::InvalidConfig("breaker.failure_threshold must be > 0".into())); }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub raw_txt_dir: String,
    /// BM25 snapshot file; the lock file sits next to it with `.lock` appended.
    pub bm25_index_path: String,
    pub lancedb_dir: String,
    pub collection: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            raw_txt_dir: "./data/txt".to_string(),
            bm25_index_path: "./data/bm25_index.json".to_string(),
            lancedb_dir: "./data/lancedb".to_string(),
            collection: "rag".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Settings {
    pub k1: f32,
    pub b: f32,
    pub shard_size: usize,
    pub sharded: bool,
}

impl Default for Bm25Settings {
    fn default() -> Self { Self { k1: 1.5, b: 0.75, shard_size: 10_000, sharded: false } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub semantic: bool,
    pub semantic_threshold: f32,
    pub parent_child: bool,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 512, chunk_overlap: 50, semantic: true, semantic_threshold: 0.7, parent_child: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub namespace: String,
    pub embedding_ttl_secs: u64,
    pub retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl CacheSettings {
    pub fn embedding_ttl(&self) -> Duration { Duration::from_secs(self.embedding_ttl_secs) }
    pub fn retry_initial_delay(&self) -> Duration { Duration::from_millis(self.retry_initial_delay_ms) }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { namespace: "rag".to_string(), embedding_ttl_secs: 7200, retry_attempts: 3, retry_initial_delay_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_n_results: usize,
    pub rrf_k: usize,
    pub rerank_min_score: f32,
    /// Candidates returned unfiltered when the re-ranker rejects everything.
    pub rerank_fallback: usize,
    /// Fused candidates fetched per requested result before re-ranking.
    pub rerank_pool: usize,
    pub expansion_variations: usize,
    pub expansion_timeout_ms: u64,
}

impl RetrievalSettings {
    pub fn expansion_timeout(&self) -> Duration { Duration::from_millis(self.expansion_timeout_ms) }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_n_results: 20,
            rrf_k: 60,
            rerank_min_score: -10.0,
            rerank_fallback: 3,
            rerank_pool: 3,
            expansion_variations: 3,
            expansion_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl BreakerSettings {
    pub fn recovery_timeout(&self) -> Duration { Duration::from_secs(self.recovery_timeout_secs) }
}

impl Default for BreakerSettings {
    fn default() -> Self { Self { failure_threshold: 5, recovery_timeout_secs: 60 } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let settings = Config::from_figment(Figment::new()).settings().expect("settings");
        assert_eq!(settings.bm25.k1, 1.5);
        assert_eq!(settings.bm25.b, 0.75);
        assert_eq!(settings.retrieval.rrf_k, 60);
        assert_eq!(settings.breaker.failure_threshold, 5);
        assert_eq!(settings.cache.embedding_ttl(), Duration::from_secs(7200));
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn toml_overrides_nested_keys() {
        let toml = "[bm25]\nk1 = 1.2\nsharded = true\n\n[chunking]\nchunk_size = 256\n";
        let config = Config::from_figment(Figment::from(Toml::string(toml)));
        let settings = config.settings().expect("settings");
        assert_eq!(settings.bm25.k1, 1.2);
        assert!(settings.bm25.sharded);
        assert_eq!(settings.bm25.b, 0.75, "untouched keys keep defaults");
        assert_eq!(settings.chunking.chunk_size, 256);
        assert_eq!(config.get::<usize>("chunking.chunk_overlap").expect("key"), 50);
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_size() {
        let mut settings = Settings::default();
        settings.chunking.chunk_overlap = settings.chunking.chunk_size;
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/srv/rag");
        assert_eq!(resolve_with_base(base, "/tmp/index.json"), PathBuf::from("/tmp/index.json"));
        assert_eq!(resolve_with_base(base, "index.json"), PathBuf::from("/srv/rag/index.json"));
    }
}
