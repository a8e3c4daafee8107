/// Generative language model boundary.
///
/// The answerer hands a fully assembled [`Prompt`] to a [`LanguageModel`]
/// and gets text back. Implementations make exactly one request per call.
pub mod extractive;
pub mod openai;

use std::sync::Arc;

use anyhow::{Result, bail};
use thiserror::Error;

use crate::config::LlmConfig;
use crate::lang::Language;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("cancelled")]
    Cancelled,
}

/// Everything a model needs to answer one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub question: String,
    /// Rendered passages, or the "nothing found" notice when there are none.
    pub context: String,
    pub has_context: bool,
    pub language: Language,
}

impl Prompt {
    /// The user turn sent to chat models.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.language {
            Language::Ja => format!(
                "質問: {}\n\n関連文書の内容:\n{}\n\n上記の文書内容に基づいて、質問に対する回答を日本語で提供してください。",
                self.question, self.context
            ),
            Language::En => format!(
                "Question: {}\n\nRelevant document content:\n{}\n\nBased on the above document content, please provide a comprehensive answer to the question.",
                self.question, self.context
            ),
        }
    }
}

pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;

    /// Name reported in logs and stats.
    fn name(&self) -> String;
}

/// Build the model selected by `config.provider`.
pub fn from_config(config: &LlmConfig, api_key: Option<String>) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(extractive::ExtractiveModel)),
        "openai" => Ok(Arc::new(openai::OpenAiChatModel::new(config, api_key)?)),
        other => bail!("unknown llm provider: {other}"),
    }
}
