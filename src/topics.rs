use crate::error::{PipelineError, Stage};
use crate::llm::{strip_code_fences, ChatMessage, Llm};
use crate::store::Topic;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bounds for the deterministic fallback segmentation.
pub const MIN_FALLBACK_TOPICS: usize = 3;
pub const MAX_FALLBACK_TOPICS: usize = 5;
/// Synthetic duration assigned to each fallback topic.
pub const FALLBACK_TOPIC_SECONDS: f64 = 120.0;
const TITLE_MAX_CHARS: usize = 60;

const SEGMENT_PROMPT: &str = "You split lecture transcripts into topics. \
Given a transcript, partition it into 4 to 6 contiguous topics. \
Respond with ONLY a JSON array, no prose and no code fences. Each element \
must be an object with keys \"title\" (short string), \"start_time\" \
(seconds, number), \"end_time\" (seconds, number) and \"content\" (the \
transcript slice for that topic). Start times must strictly increase.";

/// Typed shape required from the model. Anything that does not parse into
/// this is discarded wholesale; loosely-shaped model output is never
/// trusted as a typed value.
#[derive(Debug, Deserialize)]
struct TopicDraft {
    title: String,
    start_time: f64,
    end_time: f64,
    content: String,
}

/// Splits a transcript into an ordered topic sequence.
///
/// Prefers one generative-model call, but the deterministic sentence
/// chunker is the correctness backstop: for any non-empty transcript the
/// segmenter returns a non-empty, strictly ordered sequence. Only a
/// literally empty transcript is an error.
pub struct TopicSegmenter {
    llm: Option<Arc<dyn Llm>>,
}

impl TopicSegmenter {
    pub fn new(llm: Option<Arc<dyn Llm>>) -> Self {
        Self { llm }
    }

    pub async fn segment(&self, transcript: &str) -> Result<Vec<Topic>, PipelineError> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(PipelineError::stage(
                Stage::Segmentation,
                "cannot segment an empty transcript",
            ));
        }

        if let Some(llm) = &self.llm {
            match self.segment_with_llm(llm.as_ref(), transcript).await {
                Ok(topics) => return Ok(topics),
                // No retries: fall straight through to the deterministic path.
                Err(e) => warn!("model segmentation failed, using fallback: {}", e),
            }
        }

        Ok(fallback_segments(transcript))
    }

    async fn segment_with_llm(&self, llm: &dyn Llm, transcript: &str) -> Result<Vec<Topic>> {
        let messages = vec![
            ChatMessage::system(SEGMENT_PROMPT),
            ChatMessage::user(transcript.to_string()),
        ];
        let response = llm.chat(messages).await?;
        debug!(
            "segmentation model replied with {} characters (tokens: {:?})",
            response.content.len(),
            response.tokens_used
        );

        let drafts: Vec<TopicDraft> = serde_json::from_str(strip_code_fences(&response.content))
            .map_err(|e| anyhow!("model output is not a topic array: {}", e))?;

        validate_drafts(&drafts)?;

        Ok(drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| Topic {
                id: i as u32,
                title: draft.title.trim().to_string(),
                start_time: draft.start_time,
                end_time: draft.end_time,
                content: draft.content.trim().to_string(),
                summary: None,
                flashcards: Vec::new(),
            })
            .collect())
    }
}

fn validate_drafts(drafts: &[TopicDraft]) -> Result<()> {
    if drafts.is_empty() {
        return Err(anyhow!("model returned zero topics"));
    }
    let mut last_start = f64::NEG_INFINITY;
    for (i, draft) in drafts.iter().enumerate() {
        if draft.title.trim().is_empty() || draft.content.trim().is_empty() {
            return Err(anyhow!("topic {} has an empty title or content", i));
        }
        if draft.start_time < 0.0 || draft.end_time <= draft.start_time {
            return Err(anyhow!("topic {} has an invalid time range", i));
        }
        if draft.start_time <= last_start {
            return Err(anyhow!("topic start times are not strictly increasing"));
        }
        last_start = draft.start_time;
    }
    Ok(())
}

/// Deterministic segmentation: contiguous, equal-sized sentence groups with
/// evenly spaced synthetic time ranges. Always yields between
/// `MIN_FALLBACK_TOPICS` and `MAX_FALLBACK_TOPICS` topics for non-empty
/// input.
pub fn fallback_segments(transcript: &str) -> Vec<Topic> {
    let sentences = split_sentences(transcript);
    let count = (sentences.len() / 4).clamp(MIN_FALLBACK_TOPICS, MAX_FALLBACK_TOPICS);

    let groups: Vec<String> = if sentences.len() >= count {
        chunk_evenly(&sentences, count)
            .into_iter()
            .map(|group| group.join(" "))
            .collect()
    } else {
        // Too few sentences to spread across the minimum topic count:
        // fall back to word-level chunks of the raw text.
        let words: Vec<String> = transcript.split_whitespace().map(str::to_string).collect();
        if words.len() >= count {
            chunk_evenly(&words, count)
                .into_iter()
                .map(|group| group.join(" "))
                .collect()
        } else {
            // Degenerate tiny input: repeat the whole text per topic.
            vec![transcript.trim().to_string(); count]
        }
    };

    groups
        .into_iter()
        .enumerate()
        .map(|(i, content)| Topic {
            id: i as u32,
            title: derive_title(&content, i),
            start_time: i as f64 * FALLBACK_TOPIC_SECONDS,
            end_time: (i + 1) as f64 * FALLBACK_TOPIC_SECONDS,
            content,
            summary: None,
            flashcards: Vec::new(),
        })
        .collect()
}

/// Split text into sentences on terminal punctuation. Keeps the
/// punctuation with its sentence.
fn split_sentences(text: &str) -> Vec<String> {
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
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Partition items into `count` contiguous groups whose sizes differ by at
/// most one. Requires `items.len() >= count`, so no group is empty.
fn chunk_evenly<T: Clone>(items: &[T], count: usize) -> Vec<Vec<T>> {
    let base = items.len() / count;
    let remainder = items.len() % count;
    let mut groups = Vec::with_capacity(count);
    let mut offset = 0;

    for i in 0..count {
        let size = base + usize::from(i < remainder);
        groups.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    groups
}

fn derive_title(content: &str, index: usize) -> String {
    let first_sentence = split_sentences(content)
        .into_iter()
        .next()
        .unwrap_or_else(|| format!("Part {}", index + 1));
    let title: String = first_sentence.chars().take(TITLE_MAX_CHARS).collect();
    title.trim_end().to_string()
}
