use crate::llm::{strip_code_fences, ChatMessage, Llm};
use crate::store::Flashcard;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of flashcards requested per topic.
pub const DEFAULT_FLASHCARD_COUNT: usize = 5;
const SUMMARY_SENTENCES: usize = 3;

/// Whether a summary covers the whole transcript or a single topic.
/// Only steers the prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryScope {
    Overall,
    Topic,
}

#[derive(Debug, Deserialize)]
struct FlashcardDraft {
    front: String,
    back: String,
}

/// Produces summaries and flashcards from transcript text.
///
/// Both operations are total: when no model is configured, the model call
/// fails, or its output does not validate, a deterministic extractive
/// result is returned instead.
pub struct StudyGenerator {
    llm: Option<Arc<dyn Llm>>,
}

impl StudyGenerator {
    pub fn new(llm: Option<Arc<dyn Llm>>) -> Self {
        Self { llm }
    }

    /// Summarize `text`. Never fails for non-empty input.
    pub async fn summarize(&self, text: &str, scope: SummaryScope) -> String {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }

        if let Some(llm) = &self.llm {
            let subject = match scope {
                SummaryScope::Overall => "the entire lecture transcript below",
                SummaryScope::Topic => "the lecture topic below",
            };
            let messages = vec![
                ChatMessage::system(format!(
                    "Summarize {} in 2 to 4 plain sentences. Respond with the \
                     summary only, no preamble.",
                    subject
                )),
                ChatMessage::user(text.to_string()),
            ];
            match llm.chat(messages).await {
                Ok(response) => {
                    let summary = response.content.trim();
                    if !summary.is_empty() {
                        return summary.to_string();
                    }
                    warn!("summary model returned empty output, using extractive summary");
                }
                Err(e) => warn!("summary model call failed, using extractive summary: {}", e),
            }
        }

        template_summary(text)
    }

    /// Generate up to `count` flashcards for `text`. Never fails for
    /// non-empty input; a shortfall from the model is returned as-is.
    pub async fn flashcards(&self, text: &str, count: usize) -> Vec<Flashcard> {
        let text = text.trim();
        if text.is_empty() || count == 0 {
            return Vec::new();
        }

        if let Some(llm) = &self.llm {
            match self.flashcards_with_llm(llm.as_ref(), text, count).await {
                Ok(cards) if !cards.is_empty() => return cards,
                Ok(_) => warn!("flashcard model returned no usable cards, using placeholders"),
                Err(e) => warn!("flashcard model call failed, using placeholders: {}", e),
            }
        }

        placeholder_cards(text, count)
    }

    async fn flashcards_with_llm(
        &self,
        llm: &dyn Llm,
        text: &str,
        count: usize,
    ) -> Result<Vec<Flashcard>> {
        let messages = vec![
            ChatMessage::system(format!(
                "Write {} study flashcards for the lecture content below. \
                 Respond with ONLY a JSON array, no prose and no code fences. \
                 Each element must be an object with string keys \"front\" \
                 (a question) and \"back\" (its answer).",
                count
            )),
            ChatMessage::user(text.to_string()),
        ];
        let response = llm.chat(messages).await?;
        debug!(
            "flashcard model replied with {} characters",
            response.content.len()
        );

        let drafts: Vec<FlashcardDraft> =
            serde_json::from_str(strip_code_fences(&response.content))
                .map_err(|e| anyhow!("model output is not a flashcard array: {}", e))?;

        // Drop malformed cards rather than rejecting the batch.
        let cards: Vec<Flashcard> = drafts
            .into_iter()
            .filter(|d| !d.front.trim().is_empty() && !d.back.trim().is_empty())
            .take(count)
            .map(|d| Flashcard {
                front: d.front.trim().to_string(),
                back: d.back.trim().to_string(),
            })
            .collect();
        Ok(cards)
    }
}

/// Extractive summary: the first few sentences of the text.
pub fn template_summary(text: &str) -> String {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
            if sentences.len() == SUMMARY_SENTENCES {
                break;
            }
        }
    }
    if sentences.is_empty() {
        let tail = current.trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }
    format!("In brief: {}", sentences.join(" "))
}

/// Deterministic flashcards referencing the section text.
pub fn placeholder_cards(text: &str, count: usize) -> Vec<Flashcard> {
    let sentences: Vec<&str> = text
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    (0..count)
        .map(|i| Flashcard {
            front: format!("Key point {} of this section?", i + 1),
            back: sentences
                .get(i % sentences.len().max(1))
                .map(|s| s.to_string())
                .unwrap_or_else(|| "Review the section content.".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;

    struct ScriptedLlm(String);

    #[async_trait]
    impl Llm for ScriptedLlm {
        async fn chat(&self, _messages: Vec<ChatMessage>) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.0.clone(),
                tokens_used: None,
            })
        }
        fn model(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_summarize_without_model_is_extractive() {
        let gen = StudyGenerator::new(None);
        let summary = gen
            .summarize("First point. Second point. Third point. Fourth point.", SummaryScope::Overall)
            .await;
        assert!(summary.starts_with("In brief: "));
        assert!(summary.contains("First point."));
        assert!(!summary.contains("Fourth point."));
    }

    #[tokio::test]
    async fn test_summarize_empty_text() {
        let gen = StudyGenerator::new(None);
        assert_eq!(gen.summarize("  ", SummaryScope::Topic).await, "");
    }

    #[tokio::test]
    async fn test_summarize_uses_model_output() {
        let gen = StudyGenerator::new(Some(Arc::new(ScriptedLlm(
            "A model-written summary.".to_string(),
        ))));
        let summary = gen.summarize("Some text.", SummaryScope::Topic).await;
        assert_eq!(summary, "A model-written summary.");
    }

    #[tokio::test]
    async fn test_flashcards_without_model_are_placeholders() {
        let gen = StudyGenerator::new(None);
        let cards = gen.flashcards("One. Two. Three.", 4).await;
        assert_eq!(cards.len(), 4);
        assert_eq!(cards[0].front, "Key point 1 of this section?");
        assert_eq!(cards[0].back, "One.");
        // Wraps around when sentences run out.
        assert_eq!(cards[3].back, "One.");
    }

    #[tokio::test]
    async fn test_flashcards_drop_malformed_entries() {
        let json = r#"[
            {"front": "Q1?", "back": "A1"},
            {"front": "", "back": "A2"},
            {"front": "Q3?", "back": "A3"}
        ]"#;
        let gen = StudyGenerator::new(Some(Arc::new(ScriptedLlm(json.to_string()))));
        let cards = gen.flashcards("Some text.", 5).await;
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].front, "Q3?");
    }

    #[tokio::test]
    async fn test_flashcards_truncated_to_requested_count() {
        let json = r#"[
            {"front": "Q1?", "back": "A1"},
            {"front": "Q2?", "back": "A2"},
            {"front": "Q3?", "back": "A3"}
        ]"#;
        let gen = StudyGenerator::new(Some(Arc::new(ScriptedLlm(json.to_string()))));
        let cards = gen.flashcards("Some text.", 2).await;
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_prose_flashcard_output_falls_back() {
        let gen = StudyGenerator::new(Some(Arc::new(ScriptedLlm(
            "Here are your flashcards!".to_string(),
        ))));
        let cards = gen.flashcards("One. Two.", 3).await;
        assert_eq!(cards.len(), 3);
        assert!(cards[0].front.starts_with("Key point"));
    }

    #[test]
    fn test_template_summary_no_punctuation() {
        let summary = template_summary("words with no terminal punctuation");
        assert_eq!(summary, "In brief: words with no terminal punctuation");
    }
}
