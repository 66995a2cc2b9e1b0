//! BM25 index persisted to a JSON snapshot, shared by several processes.
//!
//! Writers serialize on an exclusive, non-blocking `flock` of `<snapshot>.lock`,
//! reload the snapshot to merge other writers' work, append, rescore and
//! atomically replace the snapshot. A writer that cannot take the lock skips
//! its update instead of waiting. Readers never lock: they reload when the
//! snapshot's mtime is newer than what they last loaded.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ragindex_core::error::ensure_aligned;
use ragindex_core::traits::LexicalRetriever;
use ragindex_core::types::SearchHit;

use crate::bm25::{Bm25Index, Bm25Params};
use crate::tokenizer::tokenize;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    corpus: Vec<Vec<String>>,
    doc_ids: Vec<String>,
}

/// Result of one `index_documents` or `save` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Snapshot written; holds the corpus size after the write.
    Indexed(usize),
    /// Another writer held the lock; this batch was dropped.
    Skipped,
}

struct State {
    index: Bm25Index,
    loaded_mtime: Option<SystemTime>,
}

#[derive(Clone)]
pub struct PersistedBm25 {
    path: PathBuf,
    lock_path: PathBuf,
    state: Arc<RwLock<State>>,
}

impl PersistedBm25 {
    /// Opens the index at `path`, loading the snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>, params: Bm25Params) -> Result<Self> {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        let this = Self {
            lock_path: PathBuf::from(lock_name),
            path,
            state: Arc::new(RwLock::new(State { index: Bm25Index::new(params), loaded_mtime: None })),
        };
        this.reload_if_stale()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn lock_path(&self) -> &Path { &self.lock_path }

    pub fn len(&self) -> usize { self.state.read().unwrap_or_else(PoisonError::into_inner).index.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Tokenizes and appends `texts` under the cross-process writer lock.
    ///
    /// Returns `Skipped` without touching the snapshot when another writer
    /// holds the lock. Lock contention loses that batch; callers that need
    /// durability must retry themselves.
    pub fn index_documents(&self, texts: &[String], ids: &[String]) -> Result<IndexOutcome> {
        ensure_aligned(texts, ids)?;
        let tokenized: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        let added = texts.len();
        self.with_writer_lock(added, || self.append_locked(tokenized, ids))
    }

    /// Runs `write` while holding the exclusive lock on `<snapshot>.lock`.
    fn with_writer_lock(&self, docs: usize, write: impl FnOnce() -> Result<IndexOutcome>) -> Result<IndexOutcome> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) { fs::create_dir_all(dir)?; }
        let lock_file = OpenOptions::new().create(true).read(true).write(true).truncate(false).open(&self.lock_path)
            .with_context(|| format!("open lock file {}", self.lock_path.display()))?;
        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => {
                warn!(lock = %self.lock_path.display(), docs, "index locked by another writer, skipping update");
                return Ok(IndexOutcome::Skipped);
            }
            Err(e) => return Err(e).with_context(|| format!("lock {}", self.lock_path.display())),
        }

        let result = write();
        if let Err(e) = FileExt::unlock(&lock_file) { warn!(error = %e, "failed to release index lock"); }
        result
    }

    fn append_locked(&self, tokenized: Vec<Vec<String>>, ids: &[String]) -> Result<IndexOutcome> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let params = state.index.params();
        let (mut index, _) = match read_snapshot(&self.path, params)? {
            Some(loaded) => loaded,
            None => (state.index.clone(), None),
        };
        let added = tokenized.len();
        for (tokens, id) in tokenized.into_iter().zip(ids) { index.push(tokens, id.clone()); }
        index.rebuild();
        write_snapshot(&self.path, &index)?;
        state.loaded_mtime = modified(&self.path)?;
        state.index = index;
        info!(added, total = state.index.len(), path = %self.path.display(), "bm25 index updated");
        Ok(IndexOutcome::Indexed(state.index.len()))
    }

    /// Top `top_k` ids for `query`, reloading first if another process rewrote the snapshot.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.reload_if_stale()?;
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.index.retrieve(query, top_k))
    }

    /// Writes the in-memory corpus to the snapshot under the writer lock.
    ///
    /// A snapshot rewritten by another handle since this one last loaded
    /// wins: it is adopted instead of being overwritten. Skips on contention
    /// like `index_documents`.
    pub fn save(&self) -> Result<IndexOutcome> {
        self.with_writer_lock(self.len(), || self.save_locked())
    }

    fn save_locked(&self) -> Result<IndexOutcome> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let on_disk = modified(&self.path)?;
        let newer_on_disk = match (on_disk, state.loaded_mtime) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(disk), Some(loaded)) => disk > loaded,
        };
        if newer_on_disk {
            if let Some((index, mtime)) = read_snapshot(&self.path, state.index.params())? {
                debug!(docs = index.len(), path = %self.path.display(), "snapshot changed on disk, adopting it instead of saving");
                state.index = index;
                state.loaded_mtime = mtime;
                return Ok(IndexOutcome::Indexed(state.index.len()));
            }
        }
        write_snapshot(&self.path, &state.index)?;
        state.loaded_mtime = modified(&self.path)?;
        Ok(IndexOutcome::Indexed(state.index.len()))
    }

    /// Opens a fresh handle on an existing snapshot.
    pub fn load(path: impl Into<PathBuf>, params: Bm25Params) -> Result<Self> {
        let path = path.into();
        anyhow::ensure!(path.exists(), "no bm25 snapshot at {}", path.display());
        Self::open(path, params)
    }

    fn reload_if_stale(&self) -> Result<()> {
        let on_disk = modified(&self.path)?;
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            match (on_disk, state.loaded_mtime) {
                (None, _) => return Ok(()),
                (Some(disk), Some(loaded)) if disk <= loaded => return Ok(()),
                _ => {}
            }
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((index, mtime)) = read_snapshot(&self.path, state.index.params())? {
            debug!(docs = index.len(), path = %self.path.display(), "reloaded bm25 snapshot");
            state.index = index;
            state.loaded_mtime = mtime;
        }
        Ok(())
    }
}

#[async_trait]
impl LexicalRetriever for PersistedBm25 {
    async fn add_documents(&self, texts: &[String], ids: &[String]) -> Result<()> {
        let this = self.clone();
        let (texts, ids) = (texts.to_vec(), ids.to_vec());
        tokio::task::spawn_blocking(move || this.index_documents(&texts, &ids)).await??;
        Ok(())
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let this = self.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || PersistedBm25::retrieve(&this, &query, top_k)).await?
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn modified(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_snapshot(path: &Path, params: Bm25Params) -> Result<Option<(Bm25Index, Option<SystemTime>)>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mtime = file.metadata()?.modified().ok();
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse bm25 snapshot {}", path.display()))?;
    anyhow::ensure!(snapshot.version == SNAPSHOT_VERSION, "unsupported bm25 snapshot version {}", snapshot.version);
    let index = Bm25Index::from_parts(params, snapshot.corpus, snapshot.doc_ids)?;
    Ok(Some((index, mtime)))
}

/// Temp file in the same directory, then rename over the old snapshot.
fn write_snapshot(path: &Path, index: &Bm25Index) -> Result<()> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let snapshot = Snapshot { version: SNAPSHOT_VERSION, corpus: index.corpus().to_vec(), doc_ids: index.doc_ids().to_vec() };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error).with_context(|| format!("replace snapshot {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn lock_path_is_snapshot_plus_suffix() {
        let tmp = tempfile::tempdir().expect("tmp");
        let index = PersistedBm25::open(tmp.path().join("bm25.json"), Bm25Params::default()).expect("open");
        assert_eq!(index.lock_path(), tmp.path().join("bm25.json.lock"));
        assert!(index.is_empty());
    }

    #[test]
    fn contended_lock_skips_update() {
        let tmp = tempfile::tempdir().expect("tmp");
        let index = PersistedBm25::open(tmp.path().join("bm25.json"), Bm25Params::default()).expect("open");
        let holder = OpenOptions::new().create(true).read(true).write(true).truncate(false).open(index.lock_path()).expect("lock file");
        holder.try_lock_exclusive().expect("hold lock");

        let outcome = index.index_documents(&strings(&["fox"]), &strings(&["d1"])).expect("no error");
        assert_eq!(outcome, IndexOutcome::Skipped);
        assert!(index.is_empty());
        assert!(!index.path().exists(), "skipped update writes nothing");

        FileExt::unlock(&holder).expect("unlock");
        assert_eq!(index.index_documents(&strings(&["fox"]), &strings(&["d1"])).expect("index"), IndexOutcome::Indexed(1));
    }

    #[test]
    fn save_skips_while_another_writer_holds_the_lock() {
        let tmp = tempfile::tempdir().expect("tmp");
        let index = PersistedBm25::open(tmp.path().join("bm25.json"), Bm25Params::default()).expect("open");
        index.index_documents(&strings(&["fox"]), &strings(&["d1"])).expect("index");
        let holder = OpenOptions::new().create(true).read(true).write(true).truncate(false).open(index.lock_path()).expect("lock file");
        holder.try_lock_exclusive().expect("hold lock");

        assert_eq!(index.save().expect("no error"), IndexOutcome::Skipped);
        FileExt::unlock(&holder).expect("unlock");
        assert_eq!(index.save().expect("save"), IndexOutcome::Indexed(1));
    }

    #[test]
    fn misaligned_input_is_an_error() {
        let tmp = tempfile::tempdir().expect("tmp");
        let index = PersistedBm25::open(tmp.path().join("bm25.json"), Bm25Params::default()).expect("open");
        assert!(index.index_documents(&strings(&["a", "b"]), &strings(&["d1"])).is_err());
    }
}
