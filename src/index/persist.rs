//! On-disk layout of a persisted index.
//!
//! ```text
//! <dir>/manifest.json   format version, build id, metric tag, dimensions, model id, count
//! <dir>/chunks.json     build id and chunk texts and metadata, in entry order
//! <dir>/vectors.bin     u32 LE build id length, build id, then little-endian f32
//!                       components, `count * dimensions` of them
//! ```
//!
//! Every write gets a fresh build id, recorded in all three files. The old
//! manifest is removed before the data files are replaced and the new one is
//! written last, so an interrupted write leaves no manifest behind. On load
//! the three ids must agree, so chunks and vectors from different writes
//! never combine.
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{IndexedChunk, Metric, VectorIndex};
use crate::error::{RagError, Result};
use crate::indexer::Chunk;

pub const FORMAT_VERSION: u32 = 2;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "vectors.bin";

static BUILD_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    format_version: u32,
    build_id: &'a str,
    metric: &'a str,
    dimensions: usize,
    model_id: &'a str,
    chunk_count: usize,
    built_at: DateTime<Utc>,
}

/// Manifest as read back: every field optional so absence is reported
/// as an incompatibility rather than a parse failure.
#[derive(Debug, Deserialize)]
struct StoredManifest {
    format_version: Option<u32>,
    build_id: Option<String>,
    metric: Option<String>,
    dimensions: Option<usize>,
    model_id: Option<String>,
    chunk_count: Option<usize>,
    built_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ChunksFile<'a> {
    build_id: &'a str,
    chunks: Vec<&'a Chunk>,
}

#[derive(Debug, Deserialize)]
struct StoredChunks {
    build_id: Option<String>,
    chunks: Vec<Chunk>,
}

/// Whether `dir` holds a persisted index.
#[must_use]
pub fn exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

fn new_build_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = BUILD_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{:x}-{seq:x}", std::process::id())
}

fn version_error(message: impl Into<String>) -> RagError {
    RagError::IndexVersion(message.into())
}

impl VectorIndex {
    /// Write the index to `dir`, creating it if needed.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        match fs::remove_file(dir.join(MANIFEST_FILE)) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let build_id = new_build_id();
        let chunks = ChunksFile {
            build_id: &build_id,
            chunks: self.entries.iter().map(|e| &e.chunk).collect(),
        };
        write_atomic(&dir.join(CHUNKS_FILE), &serde_json::to_vec(&chunks)?)?;

        let mut vectors = encode_build_id(&build_id);
        vectors.extend(serialize_vectors(&self.entries));
        write_atomic(&dir.join(VECTORS_FILE), &vectors)?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            build_id: &build_id,
            metric: self.metric.as_str(),
            dimensions: self.dimensions,
            model_id: &self.model_id,
            chunk_count: self.entries.len(),
            built_at: self.built_at.unwrap_or_else(Utc::now),
        };
        write_atomic(
            &dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;

        info!(
            "Index saved to {} ({} chunks)",
            dir.display(),
            self.entries.len()
        );
        Ok(())
    }

    /// Load an index from `dir`.
    ///
    /// Fails with [`RagError::IndexVersion`] if the manifest is missing or
    /// unreadable, lacks the metric tag or dimensionality, or disagrees with
    /// the stored chunks and vectors (including their build id).
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = fs::read(&manifest_path)
            .map_err(|e| version_error(format!("cannot read {}: {e}", manifest_path.display())))?;
        let stored: StoredManifest = serde_json::from_slice(&raw)
            .map_err(|e| version_error(format!("unreadable manifest: {e}")))?;

        match stored.format_version {
            Some(FORMAT_VERSION) => {}
            Some(v) => {
                return Err(version_error(format!(
                    "unsupported format version {v} (expected {FORMAT_VERSION})"
                )));
            }
            None => return Err(version_error("missing format_version")),
        }
        let metric: Metric = stored
            .metric
            .ok_or_else(|| version_error("missing metric tag"))?
            .parse()
            .map_err(version_error)?;
        let dimensions = stored
            .dimensions
            .filter(|d| *d > 0)
            .ok_or_else(|| version_error("missing or zero dimensions"))?;
        let model_id = stored
            .model_id
            .ok_or_else(|| version_error("missing model_id"))?;
        let count = stored
            .chunk_count
            .ok_or_else(|| version_error("missing chunk_count"))?;
        let build_id = stored
            .build_id
            .ok_or_else(|| version_error("missing build_id"))?;

        let row_bytes = dimensions
            .checked_mul(4)
            .ok_or_else(|| version_error("dimensions out of range"))?;
        let expected_bytes = count
            .checked_mul(row_bytes)
            .ok_or_else(|| version_error("dimensions out of range"))?;

        let raw_chunks = fs::read(dir.join(CHUNKS_FILE))?;
        let stored_chunks: StoredChunks = serde_json::from_slice(&raw_chunks)
            .map_err(|e| version_error(format!("unreadable {CHUNKS_FILE}: {e}")))?;
        if stored_chunks.build_id.as_deref() != Some(build_id.as_str()) {
            return Err(version_error(format!(
                "{CHUNKS_FILE} belongs to a different build than the manifest"
            )));
        }
        let chunks = stored_chunks.chunks;
        if chunks.len() != count {
            return Err(version_error(format!(
                "manifest lists {count} chunks, found {}",
                chunks.len()
            )));
        }

        let bytes = fs::read(dir.join(VECTORS_FILE))?;
        let body = match decode_build_id(&bytes) {
            Some((id, body)) if id == build_id.as_bytes() => body,
            _ => {
                return Err(version_error(format!(
                    "{VECTORS_FILE} belongs to a different build than the manifest"
                )));
            }
        };
        if body.len() != expected_bytes {
            return Err(version_error(format!(
                "vectors file has {} bytes, expected {expected_bytes}",
                body.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(deserialize_vectors(body, row_bytes))
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        let mut index = Self::from_parts(metric, dimensions, model_id, entries)?;
        index.built_at = stored.built_at;
        info!(
            "Index loaded from {} ({} chunks, {metric}, {dimensions} dims)",
            dir.display(),
            index.len()
        );
        Ok(index)
    }
}

/// Flatten embeddings into little-endian f32 bytes.
fn serialize_vectors(entries: &[IndexedChunk]) -> Vec<u8> {
    let total: usize = entries.iter().map(|e| e.embedding.len()).sum();
    let mut bytes = Vec::with_capacity(total * 4);
    for v in entries.iter().flat_map(|e| &e.embedding) {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Split little-endian f32 bytes into rows of `row_bytes` bytes each.
fn deserialize_vectors(bytes: &[u8], row_bytes: usize) -> Vec<Vec<f32>> {
    bytes
        .chunks_exact(row_bytes)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect()
}

fn encode_build_id(build_id: &str) -> Vec<u8> {
    let id = build_id.as_bytes();
    let mut bytes = Vec::with_capacity(4 + id.len());
    bytes.extend_from_slice(&(id.len() as u32).to_le_bytes());
    bytes.extend_from_slice(id);
    bytes
}

/// Split a vectors file into its build id and the f32 payload.
fn decode_build_id(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, rest) = bytes.split_first_chunk::<4>()?;
    let len = u32::from_le_bytes(*len) as usize;
    (rest.len() >= len).then(|| rest.split_at(len))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
