//! Error kinds surfaced by the retrieval pipeline.
use thiserror::Error;

use crate::embedder::EmbedderError;
use crate::llm::GenerationError;

/// Errors produced by chunking, indexing, retrieval and answering.
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid chunking or index parameters. Fatal, never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// An index build was attempted with zero chunks.
    #[error("cannot build an index from zero chunks")]
    EmptyIndex,

    /// Persisted index metadata is missing, unreadable or incompatible.
    #[error("incompatible index: {0}")]
    IndexVersion(String),

    #[error("dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether a caller may retry the operation with backoff.
    ///
    /// Only external model failures qualify; data and configuration errors
    /// would fail the same way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::Generation(_))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
