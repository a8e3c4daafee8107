//! Prompt assembly from ranked passages.
use crate::lang::Language;
use crate::llm::Prompt;
use crate::retriever::RetrievedPassage;

const SYSTEM_EN: &str = "You are an assistant that answers questions using only the provided documents.
Follow these guidelines:
1. Only use information contained in the provided documents
2. Do not speculate or make assumptions beyond the given information
3. If information is not available in the documents, clearly state \"This information is not available in the provided documents\"
4. Cite the document names you relied on
5. Keep responses concise and clear, quoting specific numbers or data when relevant";

const SYSTEM_JA: &str = "あなたは提供された文書のみに基づいて質問に回答するアシスタントです。
以下のガイドラインに従ってください：
1. 文書に含まれている情報のみを使用してください
2. 推測や憶測は避けてください
3. 文書に情報がない場合は「提供された情報では確認できません」と明記してください
4. 参照した文書名を示してください
5. 回答は簡潔で分かりやすくし、必要に応じて数値や具体的なデータを引用してください";

const NO_CONTEXT_EN: &str = "No relevant information found.";
const NO_CONTEXT_JA: &str = "関連する情報が見つかりませんでした。";

/// Build the prompt for `question`, taking passages in rank order until
/// `max_context_chars` of passage text would be exceeded. The top passage
/// is always included. Returns the prompt and the passages it contains.
pub fn build_prompt<'a>(
    question: &str,
    passages: &'a [RetrievedPassage],
    language: Language,
    max_context_chars: usize,
) -> (Prompt, Vec<&'a RetrievedPassage>) {
    let mut ranked: Vec<&RetrievedPassage> = passages.iter().collect();
    ranked.sort_by_key(|p| p.rank);

    let mut included = Vec::new();
    let mut used = 0usize;
    for passage in ranked {
        let len = passage.chunk.text.chars().count();
        if !included.is_empty() && used + len > max_context_chars {
            break;
        }
        used += len;
        included.push(passage);
    }

    let context = if included.is_empty() {
        match language {
            Language::Ja => NO_CONTEXT_JA.to_string(),
            Language::En => NO_CONTEXT_EN.to_string(),
        }
    } else {
        included
            .iter()
            .map(|p| {
                format!(
                    "[Document {}: {} (Score: {:.3})]\n{}",
                    p.rank,
                    p.source(),
                    p.score,
                    p.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let system = match language {
        Language::Ja => SYSTEM_JA,
        Language::En => SYSTEM_EN,
    };

    let prompt = Prompt {
        system: system.to_string(),
        question: question.to_string(),
        context,
        has_context: !included.is_empty(),
        language,
    };
    (prompt, included)
}
