//! Answer synthesis with source attribution.
pub mod prompt;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::lang::detect_language;
use crate::llm::LanguageModel;
use crate::retriever::RetrievedPassage;

/// The response to one question.
///
/// `sources` lists the distinct documents whose passages were given to the
/// model, in order of first appearance, whether or not the text cites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

pub struct Answerer {
    max_context_chars: usize,
}

impl Default for Answerer {
    fn default() -> Self {
        Self {
            max_context_chars: usize::MAX,
        }
    }
}

impl Answerer {
    #[must_use]
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    /// Build a prompt from `passages`, call `model` once, and attach sources.
    pub fn answer(
        &self,
        question: &str,
        passages: &[RetrievedPassage],
        model: &dyn LanguageModel,
    ) -> Result<Answer> {
        let language = detect_language(question);
        let (prompt, included) =
            prompt::build_prompt(question, passages, language, self.max_context_chars);

        let sources = distinct_sources(included.iter().map(|p| p.source()));
        debug!(
            "Generating answer with {} ({} passages, {} sources)",
            model.name(),
            included.len(),
            sources.len()
        );

        let answer = model.generate(&prompt)?;
        Ok(Answer { answer, sources })
    }
}

/// Distinct identifiers in order of first appearance.
fn distinct_sources<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
