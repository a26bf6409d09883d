/// clipnotes - video analysis pipeline
///
/// Turns lecture videos (YouTube URLs or direct uploads) into transcripts,
/// topic breakdowns, summaries and flashcards behind a small REST API.
/// Every external provider is optional; deterministic fallbacks keep the
/// pipeline total.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod speech;
pub mod store;
pub mod study;
pub mod topics;
pub mod transcript;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{PipelineError, SpeechError, Stage};
pub use crate::pipeline::{ArtifactScope, MaterializeReport, Pipeline};
pub use crate::store::{AnalysisJob, Flashcard, JobStatus, JobStore, SourceKind, Topic};
pub use crate::study::{StudyGenerator, SummaryScope};
pub use crate::topics::TopicSegmenter;
pub use crate::transcript::{TranscriptAcquirer, TranscriptStrategy, VideoSource};
