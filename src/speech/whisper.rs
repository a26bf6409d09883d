use super::SpeechToText;
use crate::config::SpeechConfig;
use crate::error::SpeechError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Synchronous speech-to-text via a local whisper CLI (whisper.cpp's
/// `whisper-cli`, or anything argument-compatible). One subprocess call in,
/// transcript text out.
pub struct LocalWhisperProvider {
    binary: String,
    model: String,
}

impl LocalWhisperProvider {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            binary: config.whisper_binary.clone(),
            model: config.whisper_model.clone(),
        }
    }

    async fn binary_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--help")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn model_path(&self) -> Option<String> {
        let candidate = format!("models/ggml-{}.bin", self.model);
        std::path::Path::new(&candidate).exists().then_some(candidate)
    }
}

#[async_trait]
impl SpeechToText for LocalWhisperProvider {
    fn name(&self) -> &'static str {
        "local-whisper"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError> {
        if !self.binary_available().await {
            return Err(SpeechError::NotConfigured);
        }

        let out_base = audio_path.with_extension("");
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-f")
            .arg(audio_path)
            .arg("-otxt")
            .arg("-of")
            .arg(&out_base)
            .arg("-np");
        if let Some(model_path) = self.model_path() {
            cmd.arg("-m").arg(model_path);
        }

        info!("running {} on {}", self.binary, audio_path.display());
        debug!("whisper command: {:?}", cmd);

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(SpeechError::Provider(format!(
                "{} exited with {}: {}",
                self.binary, output.status, tail
            )));
        }

        let text_path = out_base.with_extension("txt");
        let text = tokio::fs::read_to_string(&text_path).await?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(SpeechError::Provider(
                "whisper produced an empty transcript".to_string(),
            ));
        }

        info!("local transcription produced {} characters", text.len());
        Ok(text)
    }
}
