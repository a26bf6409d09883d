pub mod template;
pub mod youtube;

use crate::audio::AudioExtractor;
use crate::config::Config;
use crate::speech::SpeechToText;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// A validated remote video source.
#[derive(Debug, Clone)]
pub struct VideoSource {
    pub url: String,
    pub video_id: String,
}

/// What a successful acquisition yields: the transcript text plus any title
/// metadata the source happened to return.
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
    pub text: String,
    pub title: Option<String>,
}

/// One way of obtaining a transcript for a remote source. Strategies are
/// tried in order; the first success wins and later strategies never run.
#[async_trait]
pub trait TranscriptStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, source: &VideoSource, scratch: &Path) -> Result<TranscriptOutcome>;
}

/// Ordered fallback chain for transcript acquisition.
///
/// Never fails: when every strategy has failed, the deterministic template
/// transcript is the backstop, so downstream stages always get non-empty
/// input. Per-strategy failures are captured and logged, not propagated.
pub struct TranscriptAcquirer {
    strategies: Vec<Box<dyn TranscriptStrategy>>,
}

impl TranscriptAcquirer {
    pub fn from_config(
        config: &Config,
        speech: Option<Arc<dyn SpeechToText>>,
    ) -> Result<Self> {
        let mut strategies: Vec<Box<dyn TranscriptStrategy>> = Vec::new();

        if let Some(strategy) = youtube::CaptionApiStrategy::from_config(&config.captions)? {
            strategies.push(Box::new(strategy));
        }
        if let Some(speech) = speech {
            strategies.push(Box::new(DownloadTranscribeStrategy::new(speech)));
        }

        Ok(Self { strategies })
    }

    #[cfg(test)]
    pub fn with_strategies(strategies: Vec<Box<dyn TranscriptStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn acquire(&self, source: &VideoSource, scratch: &Path) -> TranscriptOutcome {
        let mut failures: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            match strategy.fetch(source, scratch).await {
                Ok(outcome) if !outcome.text.trim().is_empty() => {
                    info!(
                        "transcript for {} acquired via {} ({} characters)",
                        source.video_id,
                        strategy.name(),
                        outcome.text.len()
                    );
                    return outcome;
                }
                Ok(_) => {
                    warn!("{} returned an empty transcript", strategy.name());
                    failures.push(format!("{}: empty transcript", strategy.name()));
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", strategy.name(), source.video_id, e);
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        info!(
            "all {} acquisition strategies failed for {} ({}), using template transcript",
            self.strategies.len(),
            source.video_id,
            failures.join("; ")
        );
        TranscriptOutcome {
            text: template::template_transcript(&source.video_id),
            title: None,
        }
    }
}

/// Download the media with yt-dlp, extract audio, and run speech-to-text.
/// Any sub-step failing fails the strategy as a whole.
pub struct DownloadTranscribeStrategy {
    extractor: AudioExtractor,
    speech: Arc<dyn SpeechToText>,
}

impl DownloadTranscribeStrategy {
    pub fn new(speech: Arc<dyn SpeechToText>) -> Self {
        Self {
            extractor: AudioExtractor::new(),
            speech,
        }
    }

    async fn download_media(&self, source: &VideoSource, scratch: &Path) -> Result<std::path::PathBuf> {
        let media_path = scratch.join("media.m4a");

        let output = Command::new("yt-dlp")
            .args(["-f", "bestaudio[ext=m4a]/bestaudio", "--no-progress", "-o"])
            .arg(&media_path)
            .arg(&source.url)
            .output()
            .await
            .map_err(|e| anyhow!("failed to launch yt-dlp: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(2).collect::<Vec<_>>().join(" | ");
            return Err(anyhow!("yt-dlp failed: {}", tail));
        }
        if !media_path.exists() {
            return Err(anyhow!("yt-dlp reported success but downloaded nothing"));
        }
        Ok(media_path)
    }
}

#[async_trait]
impl TranscriptStrategy for DownloadTranscribeStrategy {
    fn name(&self) -> &'static str {
        "download-transcribe"
    }

    async fn fetch(&self, source: &VideoSource, scratch: &Path) -> Result<TranscriptOutcome> {
        let media_path = self.download_media(source, scratch).await?;
        let wav_path = self.extractor.extract_to_wav(&media_path, scratch).await?;
        let text = self.speech.transcribe(&wav_path).await?;
        if text.trim().is_empty() {
            return Err(anyhow!("transcription produced no text"));
        }
        Ok(TranscriptOutcome { text, title: None })
    }
}
