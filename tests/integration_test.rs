/// End-to-end integration tests for the ragchat pipeline.
///
/// Tests the complete flow:
///   Config → Corpus → Chunker → Embedder → Index → Persist → Retrieve → Answer
use std::fs;
use std::sync::{Arc, Mutex};

use ragchat::answer::Answerer;
use ragchat::config::{ChunkConfig, Config};
use ragchat::embedder::Embedder;
use ragchat::embedder::hashing::HashingEmbedder;
use ragchat::error::RagError;
use ragchat::index::{Metric, VectorIndex};
use ragchat::indexer::core::load_corpus;
use ragchat::indexer::{Document, chunker};
use ragchat::llm::{GenerationError, LanguageModel, Prompt};
use ragchat::retriever::Retriever;
use ragchat::service::RagService;
use tempfile::tempdir;

const METRICS: [Metric; 2] = [Metric::Cosine, Metric::Euclidean];

/// Answers with whatever a fixed script says and records the prompt.
struct ScriptedModel {
    reply: String,
    seen: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        self.seen.lock().unwrap().push(prompt.clone());
        Ok(self.reply.clone())
    }

    fn name(&self) -> String {
        "scripted".into()
    }
}

fn small_chunks() -> ChunkConfig {
    ChunkConfig {
        chunk_size: 100,
        overlap: 10,
        min_chunk_size: 5,
    }
}

fn capitals() -> Vec<Document> {
    vec![
        Document::new("doc1", "Paris is the capital of France."),
        Document::new("doc2", "Tokyo is the capital of Japan."),
        Document::new("doc3", "The mitochondria is the powerhouse of the cell."),
    ]
}

/// Full pipeline: chunk → index → retrieve → answer, for both metrics.
#[test]
fn test_capital_of_france() {
    for metric in METRICS {
        let embedder = HashingEmbedder::new(256);
        let chunks = chunker::chunk_all(&capitals(), &small_chunks()).unwrap();
        assert_eq!(chunks.len(), 3, "each short document is one chunk");

        let index = VectorIndex::build(chunks, &embedder, metric, 2).unwrap();
        let retriever = Retriever::new(Arc::new(embedder));
        let passages = retriever
            .retrieve("What is the capital of France?", &index, 1)
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].source(), "doc1", "metric {metric}");
        assert_eq!(passages[0].chunk.text, "Paris is the capital of France.");

        let model = ScriptedModel::new("The capital of France is Paris.");
        let answer = Answerer::default()
            .answer("What is the capital of France?", &passages, &model)
            .unwrap();
        assert_eq!(answer.answer, "The capital of France is Paris.");
        assert_eq!(answer.sources, vec!["doc1"]);

        let prompt = &model.seen.lock().unwrap()[0];
        assert!(prompt.context.contains("Paris is the capital of France."));
        assert!(prompt.context.starts_with("[Document 1: doc1 (Score: "));
    }
}

/// The response serializes to the HTTP shape `{"answer", "sources"}`.
#[test]
fn test_answer_json_shape() {
    let embedder = HashingEmbedder::new(64);
    let chunks = chunker::chunk_all(&capitals(), &small_chunks()).unwrap();
    let index = VectorIndex::build(chunks, &embedder, Metric::Cosine, 8).unwrap();
    let passages = Retriever::new(Arc::new(embedder))
        .retrieve("capital", &index, 3)
        .unwrap();

    let answer = Answerer::default()
        .answer("capital", &passages, &ScriptedModel::new("ok"))
        .unwrap();
    let json = serde_json::to_value(&answer).unwrap();
    assert_eq!(json["answer"], "ok");
    assert!(json["sources"].is_array());
    assert_eq!(json.as_object().unwrap().len(), 2);
}

/// Persist then load returns identical search results.
#[test]
fn test_persist_load_same_results() {
    for metric in METRICS {
        let dir = tempdir().unwrap();
        let embedder = HashingEmbedder::new(96);
        let docs = vec![
            Document::new("a.txt", "Revenue grew twelve percent year over year. ".repeat(8)),
            Document::new("b.txt", "Operating margin narrowed on higher input costs. ".repeat(5)),
            Document::new("c.txt", "The board declared a quarterly dividend."),
        ];
        let chunks = chunker::chunk_all(&docs, &small_chunks()).unwrap();
        let index = VectorIndex::build(chunks, &embedder, metric, 4).unwrap();
        index.persist(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path()).unwrap();
        loaded.ensure_compatible(&embedder, metric).unwrap();
        assert_eq!(loaded.metric(), metric);
        assert_eq!(loaded.len(), index.len());

        for query in ["revenue growth", "dividend", "input costs margin"] {
            let q = embedder.embed(query).unwrap();
            let before = index.search(&q, 5).unwrap();
            let after = loaded.search(&q, 5).unwrap();
            assert_eq!(before, after, "query {query:?} metric {metric}");
        }
    }
}

/// A loaded index refuses an embedder with a different dimensionality.
#[test]
fn test_loaded_index_rejects_other_embedder() {
    let dir = tempdir().unwrap();
    let embedder = HashingEmbedder::new(64);
    let chunks = chunker::chunk_all(&capitals(), &small_chunks()).unwrap();
    VectorIndex::build(chunks, &embedder, Metric::Cosine, 8)
        .unwrap()
        .persist(dir.path())
        .unwrap();

    let loaded = VectorIndex::load(dir.path()).unwrap();
    let err = loaded
        .ensure_compatible(&HashingEmbedder::new(128), Metric::Cosine)
        .unwrap_err();
    assert!(matches!(err, RagError::IndexVersion(_)));

    let wrong = HashingEmbedder::new(128).embed("Paris").unwrap();
    assert!(matches!(
        loaded.search(&wrong, 1),
        Err(RagError::DimensionMismatch {
            expected: 64,
            actual: 128
        })
    ));
}

/// Building from zero chunks is an error; querying an empty index is not.
#[test]
fn test_empty_index_semantics() {
    let embedder = HashingEmbedder::new(32);
    let err = VectorIndex::build(Vec::new(), &embedder, Metric::Cosine, 8).unwrap_err();
    assert!(matches!(err, RagError::EmptyIndex));

    let empty = VectorIndex::empty(Metric::Cosine, 32, embedder.model_id());
    let passages = Retriever::new(Arc::new(embedder))
        .retrieve("anything", &empty, 3)
        .unwrap();
    assert!(passages.is_empty());

    let answer = Answerer::default()
        .answer("anything", &passages, &ScriptedModel::new("No idea."))
        .unwrap();
    assert!(answer.sources.is_empty());
}

/// Corpus on disk → service → answer, then rebuild after the corpus changes.
#[test]
fn test_service_from_disk() {
    let temp_dir = tempdir().unwrap();
    let docs_dir = temp_dir.path().join("documents");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(docs_dir.join("france.txt"), "Paris is the capital of France.").unwrap();
    fs::write(
        docs_dir.join("notes.md"),
        "# Notes\n\nThe   quarterly   report is due on Friday.",
    )
    .unwrap();
    fs::write(docs_dir.join("ignored.csv"), "a,b,c").unwrap();

    let mut config = Config::default();
    config.document_patterns = vec![docs_dir.to_string_lossy().into_owned()];
    config.index_dir = temp_dir.path().join("index").to_string_lossy().into_owned();

    let (documents, report) = load_corpus(&config).unwrap();
    assert_eq!(report.loaded, 2);
    assert_eq!(documents.len(), 2);
    assert!(documents.iter().any(|d| d.text.contains("The quarterly report")));

    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
    let model = Arc::new(ScriptedModel::new("Paris."));
    let service =
        RagService::open_or_build(config.clone(), Arc::clone(&embedder), model.clone()).unwrap();
    assert_eq!(service.stats().index.total_chunks, 2);

    let answer = service.ask_with("What is the capital of France?", 1).unwrap();
    assert_eq!(answer.answer, "Paris.");
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources[0].ends_with("france.txt"));

    fs::write(docs_dir.join("japan.txt"), "Tokyo is the capital of Japan.").unwrap();
    let stats = service.rebuild_from_corpus().unwrap();
    assert_eq!(stats.total_chunks, 3);

    // A fresh service picks the rebuilt index up from disk.
    let reopened = RagService::open_or_build(config, embedder, model).unwrap();
    assert_eq!(reopened.stats().index.total_chunks, 3);
}

/// Test config defaults and validation
#[test]
fn test_config_defaults_and_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.retrieval.metric, Metric::Cosine);

    let mut bad = Config::default();
    bad.chunking.overlap = bad.chunking.chunk_size;
    assert!(bad.validate().is_err());

    let doc = Document::new("x", "some text");
    let err = chunker::chunk(&doc, &bad.chunking).unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}
