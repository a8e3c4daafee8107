use super::{GenerationError, LanguageModel, Prompt};
use crate::lang::Language;

/// Model-free fallback that answers with the retrieved context itself.
///
/// Used when no generative endpoint is configured.
pub struct ExtractiveModel;

impl LanguageModel for ExtractiveModel {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let text = match (prompt.has_context, prompt.language) {
            (false, Language::Ja) => "申し訳ございませんが、ご質問に関連する情報が見つかりませんでした。別の質問をお試しください。".to_string(),
            (false, Language::En) => "I'm sorry, but I couldn't find relevant information for your question. Please try asking something else.".to_string(),
            (true, Language::Ja) => format!("以下の情報が見つかりました：\n\n{}", prompt.context),
            (true, Language::En) => format!("Here's the relevant information I found:\n\n{}", prompt.context),
        };
        Ok(text)
    }

    fn name(&self) -> String {
        "extractive".to_string()
    }
}
