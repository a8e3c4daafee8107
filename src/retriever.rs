/// Query-time retrieval: embed the question, search the index, rank hits.
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::embedder::{Embedder, EmbedderError};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::indexer::Chunk;
use crate::lang::{Language, detect_language};

/// A chunk returned for one query, with its score and 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

impl RetrievedPassage {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.chunk.document_id
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    language_filter: bool,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            language_filter: false,
        }
    }

    /// Only keep passages whose document language matches the query's.
    #[must_use]
    pub fn with_language_filter(mut self, enabled: bool) -> Self {
        self.language_filter = enabled;
        self
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Return up to `k` passages for `query`, best first.
    ///
    /// `k == 0` and an empty index both yield an empty result without
    /// calling the embedder.
    pub fn retrieve(
        &self,
        query: &str,
        index: &VectorIndex,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let language = self.language_filter.then(|| detect_language(query));
        self.retrieve_in(query, index, k, language)
    }

    /// Like [`Retriever::retrieve`], restricted to documents in `language`.
    ///
    /// Over-fetches `2k` candidates so filtering still tends to fill `k`.
    pub fn retrieve_in(
        &self,
        query: &str,
        index: &VectorIndex,
        k: usize,
        language: Option<Language>,
    ) -> Result<Vec<RetrievedPassage>> {
        if k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed_batch(&[query])?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("no embedding for query".into()))?;

        let fetch = if language.is_some() { k.saturating_mul(2) } else { k };
        let hits = index.search(&query_vec, fetch)?;
        debug!("Search returned {} candidates for k={k}", hits.len());

        Ok(hits
            .into_iter()
            .filter(|h| language.is_none_or(|lang| h.chunk.language == lang))
            .take(k)
            .enumerate()
            .map(|(i, h)| RetrievedPassage {
                chunk: h.chunk,
                score: h.score,
                rank: i + 1,
            })
            .collect())
    }
}
