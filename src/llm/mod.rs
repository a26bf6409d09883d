pub mod provider;

use crate::config::LlmConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Chat message for generative-model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Seam for generative-model providers. Segmentation and study-material
/// generation depend on this trait, never on a concrete provider, so tests
/// can script responses.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse>;
    fn model(&self) -> &str;
}

/// Build the configured LLM, or `None` when no endpoint or key is set —
/// callers then take their deterministic fallback paths.
pub fn create_llm(config: &LlmConfig) -> Result<Option<Arc<dyn Llm>>> {
    if config.is_unconfigured() {
        return Ok(None);
    }
    let provider = provider::ChatCompletionsProvider::new(config)?;
    Ok(Some(Arc::new(provider)))
}

/// Strip a Markdown code fence wrapper, if present, from model output that
/// was asked for bare JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}
