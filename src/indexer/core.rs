use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::Document;
use crate::config::Config;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Reads every supported file matched by the configured document patterns.
///
/// Unreadable files are logged and counted as failed; files with no text
/// are counted as skipped. Documents come back sorted by identifier so
/// that repeated builds over an unchanged corpus are identical.
pub fn load_corpus(config: &Config) -> Result<(Vec<Document>, LoadReport)> {
    let files = config.get_document_files()?;
    let mut report = LoadReport::default();
    let mut documents = Vec::with_capacity(files.len());

    let mut seen = HashSet::new();

    for file in files {
        let mut id = document_id(&file.path, &file.root);
        if !seen.insert(id.clone()) {
            let full = document_id(&file.path, Path::new(""));
            warn!("Document id {id} already taken, using {full}");
            seen.insert(full.clone());
            id = full;
        }
        let path = file.path;
        match load_document(&path, &id) {
            Ok(Some(doc)) => {
                info!(
                    "Loaded {} ({} chars, language: {})",
                    doc.id,
                    doc.text.chars().count(),
                    doc.language
                );
                report.loaded += 1;
                documents.push(doc);
            }
            Ok(None) => {
                info!("No text extracted from {id}, skipping");
                report.skipped += 1;
            }
            Err(e) => {
                warn!("Failed to load {id}: {e:#}");
                report.failed += 1;
            }
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        "Corpus loaded: {} documents, {} skipped, {} failed",
        report.loaded, report.skipped, report.failed
    );
    Ok((documents, report))
}

/// Load one file as a document. Returns `None` when it holds no text.
pub fn load_document(path: &Path, id: &str) -> Result<Option<Document>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "pdf" => extract_pdf_text(path)?,
        _ => read_text_file(path)?,
    };

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Ok(None);
    }

    Ok(Some(Document::new(id, text)))
}

/// `path` relative to the pattern `root`, with forward slashes so identifiers
/// are stable across machines and platforms.
fn document_id(path: &Path, root: &Path) -> String {
    let relative = path
        .strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path);
    let s = relative.to_string_lossy().replace('\\', "/");
    s.strip_prefix("./").map(str::to_string).unwrap_or(s)
}

fn read_text_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!("{} is not valid UTF-8, decoding lossily", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("failed to open PDF {}", path.display()))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages)
        .with_context(|| format!("failed to extract text from {}", path.display()))
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
