/// Tokenizer for the local ONNX embedder, wrapping HuggingFace `tokenizers`.
///
/// Batches are padded to their longest member so they can be fed to the
/// model as one `[batch, seq_len]` tensor.
use std::path::Path;

use anyhow::{Result, anyhow};
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};

/// Longest input the e5 models accept, in tokens.
pub const MAX_TOKENS: usize = 512;

pub struct ModelTokenizer {
    inner: Tokenizer,
}

/// Token ids and attention mask for one text, as the model's i64 inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedText {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl ModelTokenizer {
    /// Load `tokenizer.json` from the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join("tokenizer.json");
        anyhow::ensure!(
            path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner =
            Tokenizer::from_file(&path).map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;
        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("failed to configure truncation: {e}"))?;
        inner.with_padding(Some(PaddingParams::default()));

        Ok(Self { inner })
    }

    /// Tokenize `texts`; every output has the same length.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizedText>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("failed to encode batch: {e}"))?;
        Ok(encodings.iter().map(to_model_input).collect())
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}

fn to_model_input(encoding: &Encoding) -> TokenizedText {
    TokenizedText {
        input_ids: encoding.get_ids().iter().map(|&id| i64::from(id)).collect(),
        attention_mask: encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect(),
    }
}
