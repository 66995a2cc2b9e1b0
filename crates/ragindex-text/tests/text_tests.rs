use std::time::Duration;

use ragindex_core::traits::LexicalRetriever;
use ragindex_text::{Bm25Params, IndexOutcome, LexicalBackend, PersistedBm25, ShardedBm25};

fn strings(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

fn fox_corpus() -> (Vec<String>, Vec<String>) {
    (strings(&["the quick brown fox", "lazy dog", "quick fox jumps"]), strings(&["d1", "d2", "d3"]))
}

#[test]
fn quick_fox_ranks_matching_docs_only() {
    let tmp = tempfile::tempdir().expect("tmp");
    let index = PersistedBm25::open(tmp.path().join("bm25.json"), Bm25Params::default()).expect("open");
    let texts = strings(&["the quick brown fox", "machine learning is fascinating", "fox and hound"]);
    let ids = strings(&["d1", "d2", "d3"]);
    assert_eq!(index.index_documents(&texts, &ids).expect("index"), IndexOutcome::Indexed(3));

    let hits = index.retrieve("quick fox", 2).expect("retrieve");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["d1", "d3"]);
    assert!(hits.iter().all(|h| h.score > 0.0));
    assert!(index.retrieve("unicorn", 5).expect("retrieve").is_empty());
}

#[test]
fn load_returns_identical_results() {
    let tmp = tempfile::tempdir().expect("tmp");
    let path = tmp.path().join("nested/bm25.json");
    let index = PersistedBm25::open(&path, Bm25Params::default()).expect("open");
    let (texts, ids) = fox_corpus();
    index.index_documents(&texts, &ids).expect("index");
    index.save().expect("save");

    let reloaded = PersistedBm25::load(&path, Bm25Params::default()).expect("load");
    assert_eq!(reloaded.len(), 3);
    for q in ["quick fox", "dog", "jumps brown"] {
        assert_eq!(index.retrieve(q, 3).expect("a"), reloaded.retrieve(q, 3).expect("b"), "query {q}");
    }
}

#[test]
fn load_without_snapshot_fails() {
    let tmp = tempfile::tempdir().expect("tmp");
    assert!(PersistedBm25::load(tmp.path().join("missing.json"), Bm25Params::default()).is_err());
}

#[test]
fn second_handle_sees_writes_from_first() {
    let tmp = tempfile::tempdir().expect("tmp");
    let path = tmp.path().join("bm25.json");
    let writer = PersistedBm25::open(&path, Bm25Params::default()).expect("writer");
    let reader = PersistedBm25::open(&path, Bm25Params::default()).expect("reader");

    writer.index_documents(&strings(&["quick fox"]), &strings(&["d1"])).expect("index");
    assert_eq!(reader.retrieve("fox", 5).expect("retrieve").len(), 1);

    // Coarse filesystem clocks can give two quick rewrites the same mtime.
    std::thread::sleep(Duration::from_millis(50));
    writer.index_documents(&strings(&["fox den"]), &strings(&["d2"])).expect("index");
    assert_eq!(reader.retrieve("fox", 5).expect("retrieve").len(), 2);
}

#[test]
fn writers_on_separate_handles_merge_their_batches() {
    let tmp = tempfile::tempdir().expect("tmp");
    let path = tmp.path().join("bm25.json");
    let a = PersistedBm25::open(&path, Bm25Params::default()).expect("a");
    let b = PersistedBm25::open(&path, Bm25Params::default()).expect("b");
    a.index_documents(&strings(&["alpha"]), &strings(&["a1"])).expect("a");
    b.index_documents(&strings(&["beta"]), &strings(&["b1"])).expect("b");
    assert_eq!(b.len(), 2);
    let fresh = PersistedBm25::load(&path, Bm25Params::default()).expect("load");
    assert_eq!(fresh.retrieve("alpha", 1).expect("r")[0].id, "a1");
}

#[tokio::test]
async fn backends_share_the_retriever_contract() {
    let tmp = tempfile::tempdir().expect("tmp");
    let backends = vec![
        LexicalBackend::Persisted(PersistedBm25::open(tmp.path().join("bm25.json"), Bm25Params::default()).expect("open")),
        LexicalBackend::Sharded(ShardedBm25::new(2, Bm25Params::default())),
    ];
    let (texts, ids) = fox_corpus();
    for backend in &backends {
        backend.add_documents(&texts, &ids).await.expect("add");
        let hits = backend.retrieve("lazy dog", 3).await.expect("retrieve");
        assert_eq!(hits[0].id, "d2", "{} backend", backend.name());
        assert!(backend.add_documents(&texts, &ids[..1]).await.is_err());
    }
}

#[test]
fn save_from_stale_handle_keeps_other_writers_docs() {
    let tmp = tempfile::tempdir().expect("tmp");
    let path = tmp.path().join("bm25.json");
    let stale = PersistedBm25::open(&path, Bm25Params::default()).expect("stale");
    let writer = PersistedBm25::open(&path, Bm25Params::default()).expect("writer");

    writer.index_documents(&strings(&["quick fox"]), &strings(&["b1"])).expect("index");
    assert_eq!(stale.save().expect("save"), IndexOutcome::Indexed(1));

    let reloaded = PersistedBm25::load(&path, Bm25Params::default()).expect("load");
    assert_eq!(reloaded.len(), 1);
    let hits = reloaded.retrieve("fox", 5).expect("retrieve");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["b1"]);
    assert_eq!(stale.retrieve("fox", 5).expect("retrieve"), hits);
}
