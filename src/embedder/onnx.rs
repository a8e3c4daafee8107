/// Local embedder running multilingual-e5-small under ONNX Runtime.
///
/// Each batch is tokenized, padded to its longest text and run through the
/// model in one call. Token states are mean-pooled under the attention mask
/// and L2-normalized.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::tokenizer::{ModelTokenizer, TokenizedText};
use super::{Embedder, EmbedderError};

/// Hidden size of multilingual-e5-small.
pub const E5_SMALL_DIMENSIONS: usize = 384;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: ModelTokenizer,
    model_name: String,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path, model_name: impl Into<String>) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");
        if !model_path.is_file() {
            return Err(EmbedderError::ModelLoad(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoad(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoad(format!("thread config error: {e}")))?
            .with_inter_threads(4)
            .map_err(|e| EmbedderError::ModelLoad(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoad(format!("model load error: {e}")))?;

        let tokenizer = ModelTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::ModelLoad(format!("tokenizer error: {e:#}")))?;

        let model_name = model_name.into();
        info!(
            "Loaded ONNX model {model_name} from {} (vocab size {})",
            model_dir.display(),
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_name,
            dimensions: E5_SMALL_DIMENSIONS,
        })
    }

    fn run(&self, batch: &[TokenizedText]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let rows = batch.len();
        let seq_len = batch.first().map_or(0, |t| t.input_ids.len());
        if batch.iter().any(|t| t.input_ids.len() != seq_len) {
            return Err(EmbedderError::Inference("batch is not padded to one length".into()));
        }

        let input_ids: Vec<i64> = batch
            .iter()
            .flat_map(|t| t.input_ids.iter().copied())
            .collect();
        let attention_mask: Vec<i64> = batch
            .iter()
            .flat_map(|t| t.attention_mask.iter().copied())
            .collect();
        let shape = [rows, seq_len];

        let input_ids = Tensor::from_array((shape, input_ids))
            .map_err(|e| EmbedderError::Inference(format!("input_ids error: {e}")))?;
        let mask = Tensor::from_array((shape, attention_mask))
            .map_err(|e| EmbedderError::Inference(format!("attention_mask error: {e}")))?;
        let token_types = Tensor::from_array((shape, vec![0i64; rows * seq_len]))
            .map_err(|e| EmbedderError::Inference(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::Inference(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => mask,
                "token_type_ids" => token_types,
            ])
            .map_err(|e| EmbedderError::Inference(format!("inference failed: {e}")))?;

        // [rows, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::Inference(format!("output extraction: {e}")))?;
        let row_len = seq_len * self.dimensions;
        if hidden.len() != rows * row_len {
            return Err(EmbedderError::Inference(format!(
                "model returned {} values, expected {}",
                hidden.len(),
                rows * row_len
            )));
        }

        Ok(batch
            .iter()
            .zip(hidden.chunks_exact(row_len.max(1)))
            .map(|(tokens, states)| {
                let pooled = mean_pooling(states, &tokens.attention_mask, seq_len, self.dimensions);
                l2_normalize(&pooled)
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::Inference(format!("tokenization failed: {e:#}")))?;
        self.run(&batch)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("onnx:{}/{}", self.model_name, self.dimensions)
    }
}

/// Average the token states of one sequence, counting only unmasked tokens.
///
/// `hidden` is a flat `[seq_len, hidden_size]` slice.
fn mean_pooling(
    hidden: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum = 0.0f32;

    for (t, &m) in attention_mask.iter().enumerate().take(seq_len) {
        let mask = m as f32;
        if mask == 0.0 {
            continue;
        }
        mask_sum += mask;
        let token = &hidden[t * hidden_size..(t + 1) * hidden_size];
        for (acc, v) in result.iter_mut().zip(token) {
            *acc += v * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }
    result
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::download::{MODEL_NAME, default_model_dir};

    #[test]
    fn test_l2_normalize() {
        let normed = l2_normalize(&[3.0, 4.0]);
        assert!((normed[0] - 0.6).abs() < 1e-6);
        assert!((normed[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pooling_skips_padding() {
        // 3 tokens, hidden size 2, last token is padding
        let hidden = [1.0, 2.0, 3.0, 4.0, 100.0, 200.0];
        let result = mean_pooling(&hidden, &[1, 1, 0], 3, 2);
        assert_eq!(result, vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pooling_all_masked() {
        let result = mean_pooling(&[5.0, 5.0], &[0], 1, 2);
        assert_eq!(result, vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxEmbedder::new(dir.path(), MODEL_NAME).err().unwrap();
        assert!(matches!(err, EmbedderError::ModelLoad(ref m) if m.contains("model.onnx")));
    }

    /// Requires the downloaded model files and the ONNX Runtime library.
    #[test]
    #[ignore]
    fn test_onnx_embed_batch() {
        let embedder = OnnxEmbedder::new(&default_model_dir(), MODEL_NAME).unwrap();
        assert_eq!(embedder.model_id(), "onnx:multilingual-e5-small/384");

        let texts = ["Paris is the capital of France.", "東京は日本の首都です。", "hi"];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 3);
        for v in &batch {
            assert_eq!(v.len(), 384);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.01, "expected unit vector, got {norm}");
        }

        // Padding inside a batch must not change a text's embedding.
        let alone = embedder.embed("hi").unwrap();
        let cos: f32 = alone.iter().zip(&batch[2]).map(|(a, b)| a * b).sum();
        assert!(cos > 0.999, "cos={cos}");
    }
}
