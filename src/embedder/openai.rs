/// OpenAI-compatible embeddings client using the `/embeddings` endpoint.
///
/// Works against any server speaking the same wire format (OpenAI, Ollama,
/// vLLM, LM Studio). Each call is a single request; retries are left to the
/// caller.
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, EmbedderError};
use crate::config::EmbeddingConfig;

pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dims: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ragchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("HTTP client build failed")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dimensions,
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&req);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!("Requesting {} embeddings from {}", texts.len(), self.base_url);
        let resp = builder.send().map_err(request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(EmbedderError::Request(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;

        order_embeddings(parsed.data, texts.len(), self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> String {
        format!("openai:{}/{}", self.model, self.dims)
    }
}

fn request_error(e: reqwest::Error) -> EmbedderError {
    if e.is_timeout() {
        EmbedderError::Timeout(e.to_string())
    } else {
        EmbedderError::Request(e.to_string())
    }
}

/// Put response items back into input order and check their shape.
fn order_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    if data.len() != expected {
        return Err(EmbedderError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    // Without indices the response is taken in input order; with them they
    // must be exactly 0..expected.
    if data.iter().any(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
        for (position, item) in data.iter().enumerate() {
            if item.index != Some(position) {
                return Err(EmbedderError::InvalidResponse(format!(
                    "embedding indices are not a permutation of 0..{expected}"
                )));
            }
        }
    }

    let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(EmbedderError::InvalidResponse(format!(
            "expected {dims}-dimensional embeddings, got {}",
            bad.len()
        )));
    }

    Ok(vectors)
}
