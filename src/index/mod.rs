//! In-memory vector index over embedded chunks.
//!
//! An index is built once from a full chunk set and never mutated afterwards,
//! so any number of queries can search the same instance concurrently.
mod metric;
pub mod persist;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

pub use metric::Metric;

use crate::embedder::{Embedder, EmbedderError};
use crate::error::{RagError, Result};
use crate::indexer::Chunk;

/// A chunk together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A search result: a stored chunk and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    metric: Metric,
    dimensions: usize,
    model_id: String,
    entries: Vec<IndexedChunk>,
    /// When the vectors were computed; `None` for an index assembled from parts.
    built_at: Option<DateTime<Utc>>,
}

/// Summary of an index's contents.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub languages: BTreeMap<String, usize>,
    pub documents: BTreeMap<String, usize>,
    pub metric: Metric,
    pub dimensions: usize,
    pub model_id: String,
    pub built_at: Option<DateTime<Utc>>,
}

impl VectorIndex {
    /// Embed `chunks` in batches of `batch_size` and build an index.
    ///
    /// Fails with [`RagError::EmptyIndex`] when `chunks` is empty.
    pub fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        metric: Metric,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if batch_size == 0 {
            return Err(RagError::Config("batch_size must be positive".into()));
        }

        let dimensions = embedder.dimensions();
        info!(
            "Building index for {} chunks ({metric}, {dimensions} dims, batch size {batch_size})",
            chunks.len()
        );

        let pb = ProgressBar::new(chunks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks embedded")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder.embed_batch(&texts)?;
            if vectors.len() != texts.len() {
                pb.abandon();
                return Err(EmbedderError::InvalidResponse(format!(
                    "requested {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                ))
                .into());
            }
            embeddings.extend(vectors);
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        let mut index = Self::from_parts(metric, dimensions, embedder.model_id(), entries)?;
        index.built_at = Some(Utc::now());
        info!("Index built successfully with {} vectors", index.len());
        Ok(index)
    }

    /// An index with no entries, used when the corpus is legitimately empty.
    #[must_use]
    pub fn empty(metric: Metric, dimensions: usize, model_id: impl Into<String>) -> Self {
        Self {
            metric,
            dimensions,
            model_id: model_id.into(),
            entries: Vec::new(),
            built_at: None,
        }
    }

    /// Assemble an index from already-embedded entries, checking every vector.
    pub fn from_parts(
        metric: Metric,
        dimensions: usize,
        model_id: String,
        entries: Vec<IndexedChunk>,
    ) -> Result<Self> {
        for entry in &entries {
            if entry.embedding.len() != dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: dimensions,
                    actual: entry.embedding.len(),
                });
            }
            if entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(EmbedderError::InvalidResponse(format!(
                    "non-finite embedding for {}#{}",
                    entry.chunk.document_id, entry.chunk.position
                ))
                .into());
            }
        }

        Ok(Self {
            metric,
            dimensions,
            model_id,
            entries,
            built_at: None,
        })
    }

    /// Return up to `k` chunks most similar to `query`, best first.
    ///
    /// Equal scores are ordered by chunk position, then document id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(&IndexedChunk, f32)> = self
            .entries
            .iter()
            .map(|e| (e, self.metric.score(query, &e.embedding)))
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.chunk.position.cmp(&b.chunk.position))
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(e, score)| SearchHit {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    /// Check that `embedder` produces vectors this index can be queried with
    /// and that the index scores with `metric`.
    pub fn ensure_compatible(&self, embedder: &dyn Embedder, metric: Metric) -> Result<()> {
        if metric != self.metric {
            return Err(RagError::IndexVersion(format!(
                "index uses {} metric, configured {metric}",
                self.metric
            )));
        }
        if embedder.dimensions() != self.dimensions {
            return Err(RagError::IndexVersion(format!(
                "index has {} dimensions, embedder produces {}",
                self.dimensions,
                embedder.dimensions()
            )));
        }
        let model_id = embedder.model_id();
        if model_id != self.model_id {
            return Err(RagError::IndexVersion(format!(
                "index was built with {}, embedder is {model_id}",
                self.model_id
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut languages = BTreeMap::new();
        let mut documents = BTreeMap::new();
        for entry in &self.entries {
            *languages
                .entry(entry.chunk.language.to_string())
                .or_insert(0) += 1;
            *documents
                .entry(entry.chunk.document_id.clone())
                .or_insert(0) += 1;
        }
        IndexStats {
            total_chunks: self.entries.len(),
            languages,
            documents,
            metric: self.metric,
            dimensions: self.dimensions,
            model_id: self.model_id.clone(),
            built_at: self.built_at,
        }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
