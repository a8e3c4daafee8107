/// Configuration module for ragchat.
///
/// Handles loading, validating, and providing default configuration values.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::index::Metric;

/// File extensions picked up from the document patterns.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

// ── Default value functions ──────────────────────────────────────────

fn default_document_patterns() -> Vec<String> {
    vec!["./data/documents".to_string()]
}

fn default_index_dir() -> String {
    "./data/vector_db".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_overlap() -> usize {
    50
}

fn default_min_chunk_size() -> usize {
    20
}

fn default_top_k() -> usize {
    3
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_provider() -> String {
    "onnx".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model_dir() -> String {
    "models/multilingual-e5-small".to_string()
}

fn default_true() -> bool {
    true
}

fn default_llm_provider() -> String {
    "extractive".to_string()
}

fn default_llm_model() -> String {
    "mixtral-8x7b-32768".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    0.9
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_bind() -> String {
    "0.0.0.0:7860".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_document_patterns")]
    pub document_patterns: Vec<String>,

    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    #[serde(default)]
    pub chunking: ChunkConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Chunk window parameters, measured in characters.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_overlap")]
    pub overlap: usize,

    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub metric: Metric,

    /// Number of texts sent per embedding request during index builds.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Only return passages whose document language matches the query.
    #[serde(default)]
    pub language_filter: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// `onnx` (local multilingual-e5-small), `hashing` (model-free,
    /// deterministic) or `openai` (any compatible endpoint).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory holding `model.onnx` and `tokenizer.json` for the `onnx` provider.
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Fetch missing model files from HuggingFace on startup.
    #[serde(default = "default_true")]
    pub auto_download: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    /// `extractive` (no model, returns the retrieved context) or `openai`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnswerConfig {
    /// Upper bound on passage text placed in a prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// A matched document file and the wildcard-free part of the pattern
/// that matched it. Document ids are `path` relative to `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub path: PathBuf,
    pub root: PathBuf,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            document_patterns: default_document_patterns(),
            index_dir: default_index_dir(),
            chunking: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            answer: AnswerConfig::default(),
            server: ServerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: Metric::default(),
            batch_size: default_batch_size(),
            language_filter: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_key_env(),
            timeout_secs: default_timeout_secs(),
            model_dir: default_model_dir(),
            auto_download: true,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_llm_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let mut cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");

        if cfg.document_patterns.is_empty() {
            cfg.document_patterns = default_document_patterns();
        }

        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be positive");
        anyhow::ensure!(
            self.retrieval.batch_size > 0,
            "retrieval.batch_size must be positive"
        );
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.answer.max_context_chars > 0,
            "answer.max_context_chars must be positive"
        );
        anyhow::ensure!(
            self.retry.max_attempts > 0,
            "retry.max_attempts must be positive"
        );
        anyhow::ensure!(
            !self.document_patterns.is_empty(),
            "at least one document pattern must be specified"
        );
        Ok(())
    }

    /// Read the API key for the embedding endpoint from the environment.
    #[must_use]
    pub fn embedding_api_key(&self) -> Option<String> {
        read_key(&self.embedding.api_key_env)
    }

    /// Read the API key for the language model endpoint from the environment.
    #[must_use]
    pub fn llm_api_key(&self) -> Option<String> {
        read_key(&self.llm.api_key_env)
    }

    /// Expand all document patterns, returning matching files sorted by path.
    ///
    /// A file matched by several patterns keeps the root of the first one.
    pub fn get_document_files(&self) -> Result<Vec<DocumentFile>> {
        let mut files = BTreeMap::new();

        for pattern in &self.document_patterns {
            match expand_pattern(pattern) {
                Ok((root, matches)) => {
                    for path in matches {
                        files.entry(path).or_insert_with(|| root.clone());
                    }
                }
                Err(e) => warn!("Failed to expand pattern {pattern}: {e}"),
            }
        }

        Ok(files
            .into_iter()
            .map(|(path, root)| DocumentFile { path, root })
            .collect())
    }
}

impl ChunkConfig {
    /// Check the window invariants the chunker relies on.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunking.chunk_size must be positive");
        anyhow::ensure!(
            self.overlap < self.chunk_size,
            "chunking.overlap ({}) must be smaller than chunk_size ({})",
            self.overlap,
            self.chunk_size
        );
        anyhow::ensure!(
            self.min_chunk_size <= self.chunk_size,
            "chunking.min_chunk_size ({}) must not exceed chunk_size ({})",
            self.min_chunk_size,
            self.chunk_size
        );
        Ok(())
    }
}

impl RetryConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn read_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

// ── Pattern helpers ──────────────────────────────────────────────────

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// The leading components of a glob that contain no wildcard.
fn glob_root(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .take_while(|c| !has_wildcard(&c.as_os_str().to_string_lossy()))
        .collect()
}

/// Expand a single pattern to its root and the document files it matches.
fn expand_pattern(pattern: &str) -> Result<(PathBuf, Vec<PathBuf>)> {
    // No wildcards: treat as a directory (or a single file)
    if !has_wildcard(pattern) {
        let path = Path::new(pattern);
        if path.is_file() {
            let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let files = if is_supported(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };
            return Ok((root, files));
        }
        return Ok((path.to_path_buf(), walk_dir(path)?));
    }

    let matches = glob::glob(pattern).context("invalid glob pattern")?;
    let mut files = Vec::new();
    for entry in matches.flatten() {
        if entry.is_file() && is_supported(&entry) {
            files.push(entry);
        }
    }
    Ok((glob_root(pattern), files))
}

/// Walk a directory recursively, respecting ignore files.
fn walk_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in WalkBuilder::new(dir).hidden(false).build() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_supported(path) {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.chunking.min_chunk_size, 20);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.metric, Metric::Cosine);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.embedding.provider, "onnx");
        assert_eq!(config.embedding.model_dir, "models/multilingual-e5-small");
        assert!(config.embedding.auto_download);
        assert_eq!(config.llm.model, "mixtral-8x7b-32768");
        assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.server.bind, "0.0.0.0:7860");
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunking": {"chunk_size": 1000}, "index_dir": "./idx"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.index_dir, "./idx");
        // Other fields should have defaults
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_metric_from_json() {
        let json = r#"{"retrieval": {"metric": "euclidean"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.retrieval.metric, Metric::Euclidean);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_too_large() {
        let mut config = Config::default();
        config.chunking.overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_top_k() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_custom_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("absent.json");
        let config = Config::load(&path.to_string_lossy()).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert!(!path.exists(), "template only written for the default path");
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = Config::load(&path.to_string_lossy()).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_get_document_files() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("en")).unwrap();
        fs::write(root.join("en/a.txt"), "a").unwrap();
        fs::write(root.join("b.md"), "b").unwrap();
        fs::write(root.join("c.csv"), "c").unwrap();

        let mut config = Config::default();
        config.document_patterns = vec![root.to_string_lossy().to_string()];
        let files = config.get_document_files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_supported(&f.path)));
        assert!(files.iter().all(|f| f.root == root));

        config.document_patterns = vec![format!("{}/*.md", root.display())];
        let files = config.get_document_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].root, root);

        config.document_patterns = vec![root.join("en/a.txt").to_string_lossy().to_string()];
        let files = config.get_document_files().unwrap();
        assert_eq!(files[0].root, root.join("en"));
    }

    #[test]
    fn test_glob_root() {
        assert_eq!(glob_root("docs/**/*.txt"), PathBuf::from("docs"));
        assert_eq!(glob_root("/data/corpus/*.md"), PathBuf::from("/data/corpus"));
        assert_eq!(glob_root("*.txt"), PathBuf::new());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunking, config.chunking);
        assert_eq!(parsed.index_dir, config.index_dir);
        assert_eq!(parsed.llm.model, config.llm.model);
    }
}
