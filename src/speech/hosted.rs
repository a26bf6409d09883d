use super::SpeechToText;
use crate::config::SpeechConfig;
use crate::error::SpeechError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Asynchronous speech-to-text against an AssemblyAI-shaped hosted API:
/// upload the audio, submit a transcription job, then poll its status at a
/// fixed interval up to a bounded attempt count.
pub struct HostedProvider {
    endpoint: String,
    api_key: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest {
    audio_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HostedProvider {
    /// Returns `None` when endpoint or API key is missing; the caller then
    /// degrades to the template fallback instead of failing the job.
    pub fn new(config: &SpeechConfig) -> Result<Option<Self>> {
        let (Some(endpoint), Some(api_key)) = (&config.endpoint, &config.api_key) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
            client,
        }))
    }

    async fn upload(&self, audio: Vec<u8>) -> Result<String, SpeechError> {
        let response = self
            .client
            .post(format!("{}/upload", self.endpoint))
            .header("authorization", &self.api_key)
            .body(audio)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpeechError::Provider(format!(
                "upload rejected with status {}",
                response.status()
            )));
        }

        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.upload_url)
    }

    async fn submit(&self, audio_url: String) -> Result<String, SpeechError> {
        let response = self
            .client
            .post(format!("{}/transcript", self.endpoint))
            .header("authorization", &self.api_key)
            .json(&SubmitRequest { audio_url })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpeechError::Provider(format!(
                "transcription submit rejected with status {}",
                response.status()
            )));
        }

        let parsed: SubmitResponse = response.json().await?;
        Ok(parsed.id)
    }

    /// Poll until the provider reports a terminal status or the attempt cap
    /// is hit. The cap surfaces as `SpeechError::Timeout`, which is a
    /// different failure class from a provider-reported error.
    async fn poll_until_complete(&self, transcript_id: &str) -> Result<String, SpeechError> {
        for attempt in 1..=self.max_poll_attempts {
            let response = self
                .client
                .get(format!("{}/transcript/{}", self.endpoint, transcript_id))
                .header("authorization", &self.api_key)
                .send()
                .await?;
            let poll: PollResponse = response.json().await?;

            debug!(
                "transcript {} poll attempt {}/{}: {}",
                transcript_id, attempt, self.max_poll_attempts, poll.status
            );

            match poll.status.as_str() {
                "completed" => {
                    let text = poll.text.unwrap_or_default().trim().to_string();
                    if text.is_empty() {
                        return Err(SpeechError::Provider(
                            "provider completed with an empty transcript".to_string(),
                        ));
                    }
                    return Ok(text);
                }
                "error" => {
                    let reason = poll
                        .error
                        .unwrap_or_else(|| "unspecified provider error".to_string());
                    return Err(SpeechError::Provider(reason));
                }
                // "queued" / "processing": keep waiting.
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }

        warn!(
            "transcript {} still pending after {} attempts",
            transcript_id, self.max_poll_attempts
        );
        Err(SpeechError::Timeout {
            attempts: self.max_poll_attempts,
        })
    }
}

#[async_trait]
impl SpeechToText for HostedProvider {
    fn name(&self) -> &'static str {
        "hosted-transcriber"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError> {
        let audio = tokio::fs::read(audio_path).await?;
        info!(
            "uploading {} bytes of audio to hosted transcriber",
            audio.len()
        );

        let audio_url = self.upload(audio).await?;
        let transcript_id = self.submit(audio_url).await?;
        info!("hosted transcription job {} submitted", transcript_id);

        let text = self.poll_until_complete(&transcript_id).await?;
        info!("hosted transcription produced {} characters", text.len());
        Ok(text)
    }
}
