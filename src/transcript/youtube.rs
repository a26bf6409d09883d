use super::{TranscriptOutcome, TranscriptStrategy, VideoSource};
use crate::config::CaptionConfig;
use crate::error::PipelineError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").expect("static regex"))
}

/// Extract the canonical video identifier from a YouTube URL.
///
/// Accepts `watch?v=`, `youtu.be/`, `/embed/`, `/shorts/` and `/live/`
/// shapes. Anything else is a validation error, raised before any network
/// call or job record is created.
pub fn extract_video_id(raw: &str) -> Result<String, PipelineError> {
    let url = Url::parse(raw)
        .map_err(|e| PipelineError::Validation(format!("not a valid URL: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::Validation(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| PipelineError::Validation("URL has no host".to_string()))?
        .trim_start_matches("www.")
        .trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => url.path_segments().and_then(|mut s| s.next()).map(str::to_string),
        "youtube.com" | "youtube-nocookie.com" => {
            let from_query = url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned());
            from_query.or_else(|| {
                let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
                match segments.as_slice() {
                    ["embed", id, ..] | ["shorts", id, ..] | ["live", id, ..] => {
                        Some((*id).to_string())
                    }
                    _ => None,
                }
            })
        }
        _ => {
            return Err(PipelineError::Validation(format!(
                "not a YouTube URL: {}",
                host
            )))
        }
    };

    match candidate {
        Some(id) if video_id_pattern().is_match(&id) => Ok(id),
        Some(id) => Err(PipelineError::Validation(format!(
            "malformed video id: {:?}",
            id
        ))),
        None => Err(PipelineError::Validation(
            "URL carries no video id".to_string(),
        )),
    }
}

/// Validate a URL submission into a `VideoSource`.
pub fn parse_source(raw: &str) -> Result<VideoSource, PipelineError> {
    let video_id = extract_video_id(raw)?;
    Ok(VideoSource {
        url: raw.to_string(),
        video_id,
    })
}

/// Hosted transcript (caption) service strategy: one GET keyed by the video
/// id, returning caption segments and optional title metadata.
pub struct CaptionApiStrategy {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    segments: Vec<CaptionSegment>,
}

#[derive(Debug, Deserialize)]
struct CaptionSegment {
    text: String,
}

impl CaptionApiStrategy {
    /// Returns `None` when the service is not configured; the acquisition
    /// chain simply skips to the next strategy.
    pub fn from_config(config: &CaptionConfig) -> Result<Option<Self>> {
        let (Some(endpoint), Some(api_key)) = (&config.endpoint, &config.api_key) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            client,
        }))
    }
}

#[async_trait]
impl TranscriptStrategy for CaptionApiStrategy {
    fn name(&self) -> &'static str {
        "caption-api"
    }

    async fn fetch(&self, source: &VideoSource, _scratch: &std::path::Path) -> Result<TranscriptOutcome> {
        let response = self
            .client
            .get(format!("{}/transcripts/{}", self.endpoint, source.video_id))
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "caption service returned status {}",
                response.status()
            ));
        }

        let parsed: CaptionResponse = response.json().await?;
        let text = parsed
            .segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return Err(anyhow!("caption service returned no caption text"));
        }

        Ok(TranscriptOutcome {
            text,
            title: parsed.title.filter(|t| !t.trim().is_empty()),
        })
    }
}
