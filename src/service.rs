/// Serving layer: owns the live index and runs the query pipeline.
///
/// The live index sits in an [`IndexHandle`]. Queries take a snapshot
/// (a cloned `Arc`) and search it without holding any lock; rebuilds
/// construct a complete replacement off to the side and swap it in.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::answer::{Answer, Answerer};
use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::index::{IndexStats, VectorIndex, persist};
use crate::indexer::{Document, chunker, core::load_corpus};
use crate::llm::LanguageModel;
use crate::retriever::{RetrievedPassage, Retriever};
use crate::retry::RetryPolicy;

/// One mutable slot holding an immutable index.
pub struct IndexHandle {
    current: RwLock<Arc<VectorIndex>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now. Later swaps do not affect the returned snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in `index`, returning the one it replaced.
    pub fn replace(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

/// Stats reported by the CLI and `/api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    #[serde(flatten)]
    pub index: IndexStats,
    pub llm: String,
}

pub struct RagService {
    index: IndexHandle,
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    answerer: Answerer,
    retry: RetryPolicy,
    config: Config,
    /// Serializes rebuilds; queries never take it.
    rebuild_lock: Mutex<()>,
}

impl RagService {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        index: VectorIndex,
    ) -> Self {
        let retriever =
            Retriever::new(embedder).with_language_filter(config.retrieval.language_filter);
        Self {
            index: IndexHandle::new(index),
            retriever,
            model,
            answerer: Answerer::new(config.answer.max_context_chars),
            retry: RetryPolicy::from(&config.retry),
            config,
            rebuild_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load the persisted index if it is present and matches `embedder` and
    /// the configured metric; otherwise build one from the configured corpus
    /// and persist it.
    pub fn open_or_build(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> anyhow::Result<Self> {
        let dir = PathBuf::from(&config.index_dir);
        if persist::exists(&dir) {
            match VectorIndex::load(&dir).and_then(|idx| {
                idx.ensure_compatible(embedder.as_ref(), config.retrieval.metric)?;
                Ok(idx)
            }) {
                Ok(index) => return Ok(Self::new(config, embedder, model, index)),
                Err(e) => warn!("Ignoring persisted index in {}: {e}", dir.display()),
            }
        }

        let empty = VectorIndex::empty(
            config.retrieval.metric,
            embedder.dimensions(),
            embedder.model_id(),
        );
        let service = Self::new(config, embedder, model, empty);
        service.rebuild_from_corpus()?;
        Ok(service)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        self.index.snapshot()
    }

    /// Answer `question` with the configured `top_k`.
    pub fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with(question, self.config.retrieval.top_k)
    }

    /// Answer `question` from the `k` best passages.
    pub fn ask_with(&self, question: &str, k: usize) -> Result<Answer> {
        let passages = self.retrieve(question, k)?;
        self.retry.run("generation", || {
            self.answerer
                .answer(question, &passages, self.model.as_ref())
        })
    }

    pub fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let index = self.index.snapshot();
        self.retry
            .run("retrieval", || self.retriever.retrieve(question, &index, k))
    }

    /// Chunk, embed and persist `documents`, then make the result live.
    ///
    /// The previous index keeps serving until the new one is complete. A
    /// corpus with no chunkable text swaps in an empty index.
    pub fn rebuild(&self, documents: &[Document]) -> Result<IndexStats> {
        let _guard = self.rebuild_lock.lock().unwrap_or_else(|e| e.into_inner());

        let chunks = chunker::chunk_all(documents, &self.config.chunking)?;
        let embedder = self.retriever.embedder();
        let metric = self.config.retrieval.metric;

        let index = if chunks.is_empty() {
            warn!("No chunks produced from {} documents", documents.len());
            VectorIndex::empty(metric, embedder.dimensions(), embedder.model_id())
        } else {
            self.retry.run("index build", || {
                VectorIndex::build(
                    chunks.clone(),
                    embedder.as_ref(),
                    metric,
                    self.config.retrieval.batch_size,
                )
            })?
        };

        index.persist(Path::new(&self.config.index_dir))?;
        let stats = index.stats();
        let previous = self.index.replace(index);
        info!(
            "Swapped live index: {} -> {} chunks",
            previous.len(),
            stats.total_chunks
        );
        Ok(stats)
    }

    /// Reload the configured corpus from disk and rebuild.
    pub fn rebuild_from_corpus(&self) -> anyhow::Result<IndexStats> {
        let (documents, _) = load_corpus(&self.config)?;
        Ok(self.rebuild(&documents)?)
    }

    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            index: self.index.snapshot().stats(),
            llm: self.model.name(),
        }
    }
}
