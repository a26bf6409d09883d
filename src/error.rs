use thiserror::Error;

/// Pipeline stages that can fail a job. Acquisition, audio extraction and
/// summarization never appear here: those stages degrade to their
/// deterministic fallbacks instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcription,
    Segmentation,
    Export,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Transcription => "transcription",
            Stage::Segmentation => "topic segmentation",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the pipeline to its HTTP callers.
///
/// Validation variants are rejected synchronously, before any job record
/// exists. Stage errors are what ends up in `AnalysisJob.error` when a job
/// fails; pollers only ever see the job-level view.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("unknown analysis job: {0}")]
    NotFound(String),

    #[error("{stage} failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }
}

/// Errors from speech-to-text providers.
///
/// `Provider` carries a reason the remote service reported; `Timeout` means
/// the bounded polling loop gave up. The two are classified differently by
/// the orchestrator, so they must stay distinct variants.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("transcription provider error: {0}")]
    Provider(String),

    #[error("transcription polling gave up after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("no speech-to-text provider configured")]
    NotConfigured,

    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
