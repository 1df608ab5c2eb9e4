//! Answer generation from retrieved passages.
//!
//! The engine does not judge or post-process generated answers. It builds a
//! single prompt from the retrieved passages and the user's question and
//! hands it to an [`AnswerGenerator`]; any transport or service failure is
//! reported as [`RagError::GenerationUnavailable`](crate::RagError::GenerationUnavailable).

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// Default cap on the characters of retrieved context placed in a prompt.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;

/// Separator placed between passages in the prompt context.
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// A generative model that turns a prompt into free text.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Name of the model answering prompts, for logs and responses.
    fn model_name(&self) -> String;
}

/// Join retrieved passages into a prompt context of at most `max_chars`
/// characters (plus a trailing `...` when truncated).
///
/// Each passage is prefixed with its source file name in brackets.
pub fn build_context(results: &[SearchResult], max_chars: usize) -> String {
    let context = results
        .iter()
        .map(|r| format!("[{}]\n{}", r.metadata.filename, r.text))
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR);

    match context.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &context[..cut]),
        None => context,
    }
}

/// Build the full prompt handed to the generator.
pub fn build_prompt(question: &str, results: &[SearchResult], max_context_chars: usize) -> String {
    let context = build_context(results, max_context_chars);
    format!(
        "Answer the question using only the documents below.\n\n\
         Documents:\n{context}\n\n\
         Question: {question}\n\n\
         Answer accurately based on the documents. If the documents do not contain \
         the answer, say so."
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::document::DocumentMetadata;

    fn result(filename: &str, text: &str) -> SearchResult {
        SearchResult {
            chunk_id: "c".to_string(),
            document_id: "d".to_string(),
            text: text.to_string(),
            position: 0,
            offset: 0,
            metadata: DocumentMetadata {
                filename: filename.to_string(),
                file_type: "txt".to_string(),
                size: 0,
                upload_time: Utc::now(),
                word_count: 0,
                char_count: 0,
            },
            score: 1.0,
            threshold: 0.0,
        }
    }

    #[test]
    fn context_labels_and_separates_passages() {
        let context = build_context(&[result("a.txt", "alpha"), result("b.md", "beta")], 1000);
        assert_eq!(context, format!("[a.txt]\nalpha{PASSAGE_SEPARATOR}[b.md]\nbeta"));
    }

    #[test]
    fn context_is_truncated_on_char_boundary() {
        let context = build_context(&[result("k.txt", "가나다라마바사")], 10);
        assert_eq!(context, "[k.txt]\n가나...");
    }

    #[test]
    fn prompt_contains_question_and_context() {
        let results = [result("f.txt", "Paris is in France.")];
        let prompt = build_prompt("Where is Paris?", &results, 100);
        assert!(prompt.contains("Question: Where is Paris?"));
        assert!(prompt.contains("[f.txt]\nParis is in France."));
    }
}
