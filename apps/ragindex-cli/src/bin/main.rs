use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragindex_core::config::{expand_path, Config, Settings};
use ragindex_core::traits::Embedder;
use ragindex_embed::{EmbeddingCache, HashEmbedder, MemoryStore};
use ragindex_hybrid::{ChunkStrategy, HybridSearchEngine, Ingestor};
use ragindex_text::LexicalBackend;
use ragindex_vector::LanceVectorStore;

const EMBEDDING_DIM: usize = 384;
const SNIPPET_CHARS: usize = 120;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {} <ingest [dir] | query \"<text>\" [n] | list | delete <source>>", prog);
    std::process::exit(1)
}

struct App {
    settings: Settings,
    ingestor: Ingestor,
    engine: HybridSearchEngine,
}

async fn build(settings: Settings) -> anyhow::Result<App> {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(EMBEDDING_DIM));
    let cache = Arc::new(EmbeddingCache::from_settings(Arc::new(MemoryStore::new()), &settings.cache));
    let lancedb_dir = expand_path(&settings.data.lancedb_dir);
    let vector = Arc::new(LanceVectorStore::open(&lancedb_dir, &settings.data.collection, embedder.clone(), Some(cache.clone())).await?);
    let lexical = Arc::new(LexicalBackend::from_settings(&settings)?);
    info!(lexical = lexical.name(), lancedb = %lancedb_dir.display(), collection = %settings.data.collection, "engine ready");
    let strategy = ChunkStrategy::from_settings(embedder, Some(cache), &settings.chunking);
    let ingestor = Ingestor::new(strategy, vector.clone(), lexical.clone());
    let engine = HybridSearchEngine::new(vector, lexical).with_settings(&settings.retrieval);
    Ok(App { settings, ingestor, engine })
}

fn snippet(text: &str) -> String {
    let mut s: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS { s.push_str("..."); }
    s
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let mut args: Vec<String> = env::args().collect();
    let prog = if args.is_empty() { "ragindex".to_string() } else { args.remove(0) };
    if args.is_empty() { usage(&prog); }
    let cmd = args.remove(0);

    let settings = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?.settings()?;
    let app = build(settings).await?;

    match cmd.as_str() {
        "ingest" => {
            let dir = args.first().map(PathBuf::from).unwrap_or_else(|| expand_path(&app.settings.data.raw_txt_dir));
            let spinner = ProgressBar::new_spinner();
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(format!("Ingesting {}", dir.display()));
            let report = app.ingestor.ingest_directory(&dir).await?;
            spinner.finish_with_message(format!("Ingested {} documents into {} chunks", report.documents, report.chunks));
        }
        "query" => {
            let Some(query) = args.first() else { usage(&prog) };
            let n = match args.get(1) {
                Some(raw) => raw.parse().map_err(|e| anyhow::anyhow!("invalid result count '{}': {}", raw, e))?,
                None => app.settings.retrieval.default_n_results,
            };
            let results = app.engine.search(query, n, None).await?;
            if results.is_empty() { println!("No results"); }
            for (i, c) in results.iter().enumerate() {
                println!("{:>2}. [{:.4}] {}  {}", i + 1, c.score, c.id, snippet(&c.text));
            }
        }
        "list" => {
            for source in app.ingestor.list_sources().await? { println!("{}", source); }
        }
        "delete" => {
            let Some(source) = args.first() else { usage(&prog) };
            let deleted = app.ingestor.delete_source(source).await?;
            println!("Deleted {} chunks from {}", deleted, source);
        }
        _ => {
            eprintln!("Unknown command: {}", cmd);
            usage(&prog);
        }
    }
    Ok(())
}
