//! Turns a directory of `.txt` and `.pdf` files into `Document`s ready for chunking.
//!
//! Loading is synchronous and CPU-heavy for PDFs; async callers run it on a
//! blocking thread.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{Document, META_SOURCE};

const EXTENSIONS: [&str; 2] = ["txt", "pdf"];

#[derive(Debug, Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self { Self }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        let files = self.list_source_files(data_dir);
        if files.is_empty() { info!(dir = %data_dir.display(), "no .txt or .pdf files found"); return Ok(vec![]); }
        let mut documents = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), n = file_index + 1, total = files.len(), "loading");
            let raw = if is_pdf(file_path) {
                match extract_pdf_text(&fs::read(file_path)?) {
                    Ok(text) => text,
                    Err(e) => { warn!(file = %file_path.display(), error = %e, "skipping unreadable pdf"); continue; }
                }
            } else {
                self.read_file_content(file_path)?
            };
            let text = clean_text(&raw);
            if text.is_empty() { continue; }
            let name = file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let category = self.get_facet_from_path(file_path, data_dir);
            documents.push(Document::new(name.clone(), text).with_meta(META_SOURCE, name).with_meta("category", category));
        }
        info!(files = files.len(), documents = documents.len(), "loaded documents");
        Ok(documents)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn get_facet_from_path(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative_path = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        match relative_path.parent().and_then(|p| p.to_str()) {
            Some(facet) if !facet.is_empty() => facet.to_string(),
            _ => "misc".to_string(),
        }
    }

    fn list_source_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path().extension().and_then(|s| s.to_str())
                    .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
            })
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Text of every page in order, pages separated by newlines. Pages whose
/// content cannot be decoded are skipped; a PDF with no text at all is an error.
pub fn extract_pdf_text(data: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(data).map_err(|e| anyhow!("failed to parse pdf: {e}"))?;
    let mut all_text = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                if !all_text.is_empty() && !page_text.is_empty() { all_text.push('\n'); }
                all_text.push_str(&page_text);
            }
            Err(e) => debug!(page = page_num, error = %e, "failed to extract pdf page text"),
        }
    }
    if all_text.trim().is_empty() { return Err(anyhow!("pdf contains no extractable text")); }
    Ok(all_text)
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn clean_text(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }
