pub mod hosted;
pub mod whisper;

use crate::config::{SpeechConfig, SpeechProviderKind};
use crate::error::SpeechError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Seam for speech-to-text providers.
///
/// Implementations come in two shapes: synchronous (one call returns text)
/// and asynchronous (upload, then poll a provider job until terminal). Both
/// hide behind this trait; the orchestrator only sees the result.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &'static str;
    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError>;
}

/// Build the configured provider, or `None` when the hosted provider is
/// selected but has no endpoint/key — transcription then degrades to the
/// template fallback at the acquisition level.
pub fn create_provider(config: &SpeechConfig) -> Result<Option<Arc<dyn SpeechToText>>> {
    match config.provider {
        SpeechProviderKind::Local => Ok(Some(Arc::new(whisper::LocalWhisperProvider::new(config)))),
        SpeechProviderKind::Hosted => match hosted::HostedProvider::new(config)? {
            Some(provider) => Ok(Some(Arc::new(provider))),
            None => Ok(None),
        },
    }
}
