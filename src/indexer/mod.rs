//! Corpus ingestion: reading documents and splitting them into chunks.
pub mod chunker;
pub mod core;

use serde::{Deserialize, Serialize};

use crate::lang::Language;

/// An immutable unit of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identifier, usually the relative file path.
    pub id: String,
    pub language: Language,
    pub text: String,
}

impl Document {
    /// Create a document, tagging its language from the text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            language: crate::lang::detect_language(&text),
            text,
        }
    }
}

/// A contiguous slice of a document's text.
///
/// `start` and `end` are character (not byte) offsets into the parent text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub position: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub language: Language,
}
