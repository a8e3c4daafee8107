/// Embedder trait and shared types for text embedding.
///
/// The pipeline only depends on this contract; concrete embedders are
/// injected so tests can substitute the deterministic [`hashing::HashingEmbedder`].
pub mod download;
pub mod hashing;
pub mod onnx;
pub mod openai;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("cancelled")]
    Cancelled,
}

/// Trait for text embedding implementations.
///
/// Implementations must be deterministic for a fixed model version and
/// `Send + Sync` to allow concurrent use behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty embedding batch".into()))
    }

    /// Embed multiple texts, returning one vector per input in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Stable identifier of the model version, recorded in index manifests.
    fn model_id(&self) -> String;
}

/// Build the embedder selected by `config.provider`.
pub fn from_config(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "onnx" => {
            let model_dir = Path::new(&config.model_dir);
            if config.auto_download {
                download::download_model_files(model_dir)?;
            }
            let name = model_dir.file_name().map_or_else(
                || download::MODEL_NAME.to_string(),
                |n| n.to_string_lossy().into_owned(),
            );
            let embedder = onnx::OnnxEmbedder::new(model_dir, name).with_context(|| {
                format!("failed to load ONNX model from {}", model_dir.display())
            })?;
            Ok(Arc::new(embedder))
        }
        "hashing" => Ok(Arc::new(hashing::HashingEmbedder::new(config.dimensions))),
        "openai" => Ok(Arc::new(openai::OpenAiEmbedder::new(config, api_key)?)),
        other => bail!("unknown embedding provider: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_hashing() {
        let config = EmbeddingConfig {
            provider: "hashing".into(),
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = from_config(&config, None).unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("hello").unwrap().len(), 64);
    }

    #[test]
    fn test_from_config_onnx_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            provider: "onnx".into(),
            model_dir: dir.path().to_string_lossy().into_owned(),
            auto_download: false,
            ..EmbeddingConfig::default()
        };
        let err = from_config(&config, None).err().unwrap();
        assert!(format!("{err:#}").contains("model.onnx"));
    }

    #[test]
    fn test_from_config_unknown() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        assert!(from_config(&config, None).is_err());
    }
}
