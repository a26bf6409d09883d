use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Extracts speech-recognition-ready audio from video or audio media by
/// shelling out to ffmpeg. All intermediate files land in the caller's
/// scratch directory, which the owning job removes on every exit path.
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    /// 16kHz is what whisper-family models expect.
    target_sample_rate: u32,
    /// Test seam: copy the media through instead of running ffmpeg.
    #[cfg(test)]
    passthrough: bool,
}

impl AudioExtractor {
    pub fn new() -> Self {
        Self {
            target_sample_rate: 16_000,
            #[cfg(test)]
            passthrough: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn passthrough() -> Self {
        Self {
            target_sample_rate: 16_000,
            passthrough: true,
        }
    }

    /// Convert a media file to mono 16-bit PCM WAV inside `scratch`.
    pub async fn extract_to_wav(&self, media_path: &Path, scratch: &Path) -> Result<PathBuf> {
        let wav_path = scratch.join("audio.wav");

        #[cfg(test)]
        if self.passthrough {
            tokio::fs::copy(media_path, &wav_path).await?;
            return Ok(wav_path);
        }

        info!("extracting audio from {}", media_path.display());

        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(media_path)
            .args([
                "-vn", // drop the video stream
                "-acodec",
                "pcm_s16le",
                "-ar",
                &self.target_sample_rate.to_string(),
                "-ac",
                "1",
                "-f",
                "wav",
                "-y",
            ])
            .arg(&wav_path)
            .output()
            .await
            .map_err(|e| anyhow!("failed to launch ffmpeg: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(anyhow!(
                "ffmpeg failed for {}: {}",
                media_path.display(),
                tail
            ));
        }
        if !wav_path.exists() {
            return Err(anyhow!("ffmpeg reported success but produced no output"));
        }

        debug!("extracted audio to {}", wav_path.display());
        Ok(wav_path)
    }

    /// Write uploaded media bytes into `scratch` and extract audio from
    /// them. The upload itself is consumed here and never retained.
    pub async fn write_and_extract(&self, media: &[u8], scratch: &Path) -> Result<PathBuf> {
        if media.is_empty() {
            return Err(anyhow!("uploaded media is empty"));
        }
        let media_path = scratch.join("upload.media");
        tokio::fs::write(&media_path, media).await?;
        self.extract_to_wav(&media_path, scratch).await
    }
}

impl Default for AudioExtractor {
    fn default() -> Self {
        Self::new()
    }
}
