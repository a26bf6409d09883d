use crate::audio::AudioExtractor;
use crate::config::Config;
use crate::error::{PipelineError, SpeechError, Stage};
use crate::llm;
use crate::speech::{self, SpeechToText};
use crate::store::{AnalysisJob, JobStatus, JobStore, SourceKind, Topic};
use crate::study::{StudyGenerator, SummaryScope, DEFAULT_FLASHCARD_COUNT};
use crate::topics::TopicSegmenter;
use crate::transcript::{template, youtube, TranscriptAcquirer, TranscriptOutcome, VideoSource};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{info, warn};

/// Progress checkpoints reported through the job record. Values only ever
/// move forward; the store enforces that.
pub const PROGRESS_CREATED: u8 = 0;
pub const PROGRESS_ACQUIRING: u8 = 10;
pub const PROGRESS_TRANSCRIPT: u8 = 50;
pub const PROGRESS_TOPICS: u8 = 80;
pub const PROGRESS_DONE: u8 = 100;

/// Which part of a completed analysis a derived artifact targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactScope {
    Overall,
    Topic(u32),
}

/// What a materialization run produced.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializeReport {
    pub notes_created: usize,
    pub flashcards_created: usize,
}

enum JobInput {
    Url(VideoSource),
    Upload { filename: String, media: Vec<u8> },
}

/// The analysis pipeline: validates submissions, runs the staged background
/// jobs, and serves follow-up artifact requests against completed jobs.
///
/// Cheap to clone; every spawned job carries its own handle.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<JobStore>,
    config: Arc<Config>,
    acquirer: Arc<TranscriptAcquirer>,
    extractor: Arc<AudioExtractor>,
    speech: Option<Arc<dyn SpeechToText>>,
    segmenter: Arc<TopicSegmenter>,
    study: Arc<StudyGenerator>,
    client: reqwest::Client,
}

impl Pipeline {
    pub fn new(config: Config, store: Arc<JobStore>) -> anyhow::Result<Self> {
        let llm = llm::create_llm(&config.llm)?;
        let speech = speech::create_provider(&config.speech)?;
        let acquirer = Arc::new(TranscriptAcquirer::from_config(&config, speech.clone())?);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.materialize.request_timeout_secs))
            .build()?;

        Ok(Self {
            store,
            config: Arc::new(config),
            acquirer,
            extractor: Arc::new(AudioExtractor::new()),
            speech,
            segmenter: Arc::new(TopicSegmenter::new(llm.clone())),
            study: Arc::new(StudyGenerator::new(llm)),
            client,
        })
    }

    /// Validate a URL submission, persist the job record, and spawn the
    /// background run. Returns the freshly created record.
    pub async fn submit_url(&self, owner: &str, url: &str) -> Result<AnalysisJob, PipelineError> {
        let source = youtube::parse_source(url)?;
        let title = format!("YouTube video {}", source.video_id);
        let job = AnalysisJob::new(owner, &title, SourceKind::Youtube, &source.url);
        self.store.create(job.clone()).await?;

        info!("job {} submitted for {}", job.id, source.url);
        self.spawn_run(job.id.clone(), JobInput::Url(source));
        Ok(job)
    }

    /// Validate an upload submission. Rejections happen before any job
    /// record exists, so a rejected upload leaves no trace in the store.
    pub async fn submit_upload(
        &self,
        owner: &str,
        filename: &str,
        content_type: &str,
        media: Vec<u8>,
    ) -> Result<AnalysisJob, PipelineError> {
        let ingest = &self.config.ingest;
        if !ingest
            .allowed_mime_types
            .iter()
            .any(|m| m == content_type)
        {
            return Err(PipelineError::UnsupportedMedia(content_type.to_string()));
        }
        if media.len() as u64 > ingest.max_upload_bytes {
            return Err(PipelineError::TooLarge {
                limit: ingest.max_upload_bytes,
            });
        }
        if media.is_empty() {
            return Err(PipelineError::Validation(
                "uploaded file is empty".to_string(),
            ));
        }

        let title = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Uploaded media")
            .to_string();
        let job = AnalysisJob::new(owner, &title, SourceKind::Upload, "");
        self.store.create(job.clone()).await?;

        info!(
            "job {} submitted for upload {} ({} bytes, {})",
            job.id,
            filename,
            media.len(),
            content_type
        );
        self.spawn_run(
            job.id.clone(),
            JobInput::Upload {
                filename: filename.to_string(),
                media,
            },
        );
        Ok(job)
    }

    fn spawn_run(&self, job_id: String, input: JobInput) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_job(job_id, input).await;
        });
    }

    async fn run_job(self, job_id: String, input: JobInput) {
        // Per-job scratch directory; dropping it removes every
        // intermediate file even when a stage bails early.
        let scratch = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => {
                self.fail_job(&job_id, &format!("could not create scratch space: {}", e))
                    .await;
                return;
            }
        };

        match self.execute_stages(&job_id, input, scratch.path()).await {
            Ok(()) => info!("job {} completed", job_id),
            Err(e) => {
                warn!("job {} failed: {}", job_id, e);
                self.fail_job(&job_id, &e.to_string()).await;
            }
        }
    }

    async fn fail_job(&self, job_id: &str, message: &str) {
        let result = self
            .store
            .update(job_id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some(message.to_string());
            })
            .await;
        if let Err(e) = result {
            warn!("could not record failure for job {}: {}", job_id, e);
        }
    }

    async fn execute_stages(
        &self,
        job_id: &str,
        input: JobInput,
        scratch: &Path,
    ) -> Result<(), PipelineError> {
        self.store
            .update(job_id, |job| job.progress = PROGRESS_ACQUIRING)
            .await?;

        let outcome = match input {
            JobInput::Url(source) => self.acquirer.acquire(&source, scratch).await,
            JobInput::Upload { filename, media } => {
                self.transcribe_upload(&filename, &media, scratch).await?
            }
        };

        self.store
            .update(job_id, |job| {
                job.transcript = outcome.text.clone();
                if let Some(title) = &outcome.title {
                    job.title = title.clone();
                }
                job.progress = PROGRESS_TRANSCRIPT;
            })
            .await?;

        let topics = self.segmenter.segment(&outcome.text).await?;
        self.store
            .update(job_id, |job| {
                job.topics = topics.clone();
                job.progress = PROGRESS_TOPICS;
            })
            .await?;

        let summary = self.study.summarize(&outcome.text, SummaryScope::Overall).await;
        self.store
            .update(job_id, |job| {
                job.summary = Some(summary.clone());
                job.status = JobStatus::Completed;
                job.progress = PROGRESS_DONE;
            })
            .await?;

        Ok(())
    }

    /// Transcribe uploaded media. Provider-reported errors and polling
    /// timeouts are fatal to the job; extraction, transport and
    /// configuration problems degrade to the template transcript, seeded by
    /// the uploaded filename.
    async fn transcribe_upload(
        &self,
        filename: &str,
        media: &[u8],
        scratch: &Path,
    ) -> Result<TranscriptOutcome, PipelineError> {
        let wav_path = match self.extractor.write_and_extract(media, scratch).await {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    "audio extraction failed for {} ({}), using template transcript",
                    filename, e
                );
                return Ok(TranscriptOutcome {
                    text: template::template_transcript(filename),
                    title: None,
                });
            }
        };

        if let Some(speech) = &self.speech {
            match speech.transcribe(&wav_path).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(TranscriptOutcome { text, title: None });
                }
                Ok(_) => {
                    warn!("{} returned an empty transcript for upload", speech.name());
                }
                Err(SpeechError::Provider(reason)) => {
                    return Err(PipelineError::stage(Stage::Transcription, reason));
                }
                Err(e @ SpeechError::Timeout { .. }) => {
                    return Err(PipelineError::stage(Stage::Transcription, e.to_string()));
                }
                Err(e) => {
                    warn!(
                        "{} unavailable ({}), using template transcript",
                        speech.name(),
                        e
                    );
                }
            }
        }

        Ok(TranscriptOutcome {
            text: template::template_transcript(filename),
            title: None,
        })
    }

    #[cfg(test)]
    fn with_speech(mut self, speech: Arc<dyn SpeechToText>) -> Self {
        self.speech = Some(speech);
        self
    }

    #[cfg(test)]
    fn with_passthrough_extraction(mut self) -> Self {
        self.extractor = Arc::new(AudioExtractor::passthrough());
        self
    }

    /// Regenerate a summary for a completed analysis, either overall or for
    /// a single topic. The refreshed record is returned.
    pub async fn generate_summary(
        &self,
        job_id: &str,
        scope: ArtifactScope,
    ) -> Result<AnalysisJob, PipelineError> {
        let job = self.completed_job(job_id).await?;

        match scope {
            ArtifactScope::Overall => {
                let summary = self
                    .study
                    .summarize(&job.transcript, SummaryScope::Overall)
                    .await;
                Ok(self
                    .store
                    .update(job_id, |job| job.summary = Some(summary.clone()))
                    .await?)
            }
            ArtifactScope::Topic(topic_id) => {
                let topic = job.topic(topic_id).ok_or_else(|| {
                    PipelineError::NotFound(format!("topic {} of job {}", topic_id, job_id))
                })?;
                let summary = self.study.summarize(&topic.content, SummaryScope::Topic).await;
                Ok(self
                    .store
                    .update(job_id, |job| {
                        if let Some(topic) = job.topics.iter_mut().find(|t| t.id == topic_id) {
                            topic.summary = Some(summary.clone());
                        }
                    })
                    .await?)
            }
        }
    }

    /// Generate flashcards for one topic of a completed analysis and attach
    /// them to the record. Returns the refreshed topic.
    pub async fn generate_flashcards(
        &self,
        job_id: &str,
        topic_id: u32,
        count: Option<usize>,
    ) -> Result<Topic, PipelineError> {
        let count = count.unwrap_or(DEFAULT_FLASHCARD_COUNT);
        let job = self.completed_job(job_id).await?;
        let topic = job.topic(topic_id).ok_or_else(|| {
            PipelineError::NotFound(format!("topic {} of job {}", topic_id, job_id))
        })?;

        let cards = self.study.flashcards(&topic.content, count).await;
        let updated = self
            .store
            .update(job_id, |job| {
                if let Some(topic) = job.topics.iter_mut().find(|t| t.id == topic_id) {
                    topic.flashcards = cards.clone();
                }
            })
            .await?;

        updated
            .topic(topic_id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("topic {} of job {}", topic_id, job_id)))
    }

    /// Push a completed analysis to the configured external notes sink.
    /// Without a configured sink this still reports what would be exported.
    pub async fn materialize(&self, job_id: &str) -> Result<MaterializeReport, PipelineError> {
        let job = self.completed_job(job_id).await?;

        let notes: Vec<ExportNote> = std::iter::once(ExportNote {
            title: job.title.clone(),
            body: job.summary.clone().unwrap_or_else(|| job.transcript.clone()),
        })
        .chain(job.topics.iter().map(|topic| ExportNote {
            title: topic.title.clone(),
            body: topic
                .summary
                .clone()
                .unwrap_or_else(|| topic.content.clone()),
        }))
        .collect();
        let flashcards: Vec<crate::store::Flashcard> = job
            .topics
            .iter()
            .flat_map(|t| t.flashcards.iter().cloned())
            .collect();

        let report = MaterializeReport {
            notes_created: notes.len(),
            flashcards_created: flashcards.len(),
        };

        if let Some(endpoint) = &self.config.materialize.endpoint {
            let payload = ExportPayload {
                job_id: job.id.clone(),
                title: job.title.clone(),
                notes,
                flashcards,
            };
            let response = self
                .client
                .post(endpoint)
                .json(&payload)
                .send()
                .await
                .map_err(|e| PipelineError::stage(Stage::Export, e.to_string()))?;
            if !response.status().is_success() {
                return Err(PipelineError::stage(
                    Stage::Export,
                    format!("sink responded with {}", response.status()),
                ));
            }
            info!(
                "job {} materialized to {}: {} notes, {} flashcards",
                job_id, endpoint, report.notes_created, report.flashcards_created
            );
        } else {
            info!(
                "job {} materialized locally: {} notes, {} flashcards (no sink configured)",
                job_id, report.notes_created, report.flashcards_created
            );
        }

        Ok(report)
    }

    async fn completed_job(&self, job_id: &str) -> Result<AnalysisJob, PipelineError> {
        let job = self
            .store
            .get(job_id)
            .await
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))?;
        match job.status {
            JobStatus::Completed => Ok(job),
            JobStatus::Processing => Err(PipelineError::Validation(
                "analysis is still processing".to_string(),
            )),
            JobStatus::Failed => Err(PipelineError::Validation(
                "analysis failed and has no artifacts".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportNote {
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct ExportPayload {
    job_id: String,
    title: String,
    notes: Vec<ExportNote>,
    flashcards: Vec<crate::store::Flashcard>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    async fn pipeline_with_dir(dir: &Path) -> Pipeline {
        let config = ConfigBuilder::new()
            .with_jobs_dir(dir.to_path_buf())
            .build();
        let store = Arc::new(JobStore::new(dir.to_path_buf()).await.unwrap());
        Pipeline::new(config, store).unwrap()
    }

    async fn wait_for_terminal(pipeline: &Pipeline, job_id: &str) -> AnalysisJob {
        for _ in 0..200 {
            if let Some(job) = pipeline.store.get(job_id).await {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} never reached a terminal status", job_id);
    }

    #[test]
    fn test_progress_checkpoints_are_increasing() {
        let schedule = [
            PROGRESS_CREATED,
            PROGRESS_ACQUIRING,
            PROGRESS_TRANSCRIPT,
            PROGRESS_TOPICS,
            PROGRESS_DONE,
        ];
        for pair in schedule.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(PROGRESS_DONE, 100);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_a_record() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path()).await;

        let err = pipeline
            .submit_url("alice", "https://example.com/watch?v=abc123XYZ")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(pipeline.store.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_url_job_completes_via_fallbacks() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path()).await;

        let job = pipeline
            .submit_url("alice", "https://youtu.be/abc123XYZ")
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, PROGRESS_CREATED);

        let done = wait_for_terminal(&pipeline, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, PROGRESS_DONE);
        assert!(!done.transcript.is_empty());
        assert!(done.topics.len() >= 3);
        assert!(done.summary.is_some());
        for pair in done.topics.windows(2) {
            assert!(pair[0].start_time < pair[1].start_time);
        }
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .with_jobs_dir(dir.path().to_path_buf())
            .with_max_upload_bytes(8)
            .build();
        let store = Arc::new(JobStore::new(dir.path().to_path_buf()).await.unwrap());
        let pipeline = Pipeline::new(config, store).unwrap();

        let err = pipeline
            .submit_upload("bob", "notes.txt", "text/plain", vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMedia(_)));

        let err = pipeline
            .submit_upload("bob", "clip.mp4", "video/mp4", vec![0; 16])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TooLarge { limit: 8 }));

        let err = pipeline
            .submit_upload("bob", "clip.mp4", "video/mp4", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        assert_eq!(pipeline.store.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_upload_extraction_failure_degrades_to_template() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path()).await;

        // Bogus bytes: ffmpeg rejects them (or is absent entirely), but the
        // job still completes on the template transcript.
        let job = pipeline
            .submit_upload("bob", "lecture-3.mp4", "video/mp4", vec![0; 64])
            .await
            .unwrap();
        assert_eq!(job.title, "lecture-3");
        assert_eq!(job.source_kind, SourceKind::Upload);
        assert_eq!(job.source_location, "");

        let done = wait_for_terminal(&pipeline, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, PROGRESS_DONE);
        assert!(done.error.is_none());
        // The template is seeded by the uploaded filename.
        assert!(done.transcript.contains("lecture-3.mp4"));
        assert!(done.topics.len() >= 3);
    }

    struct FixedSpeech(&'static str);

    #[async_trait::async_trait]
    impl SpeechToText for FixedSpeech {
        fn name(&self) -> &'static str {
            "fixed-speech"
        }
        async fn transcribe(&self, _audio_path: &Path) -> Result<String, SpeechError> {
            Ok(self.0.to_string())
        }
    }

    struct ErringSpeech(&'static str);

    #[async_trait::async_trait]
    impl SpeechToText for ErringSpeech {
        fn name(&self) -> &'static str {
            "erring-speech"
        }
        async fn transcribe(&self, _audio_path: &Path) -> Result<String, SpeechError> {
            Err(SpeechError::Provider(self.0.to_string()))
        }
    }

    struct StalledSpeech;

    #[async_trait::async_trait]
    impl SpeechToText for StalledSpeech {
        fn name(&self) -> &'static str {
            "stalled-speech"
        }
        async fn transcribe(&self, _audio_path: &Path) -> Result<String, SpeechError> {
            Err(SpeechError::Timeout { attempts: 3 })
        }
    }

    struct UnreachableSpeech;

    #[async_trait::async_trait]
    impl SpeechToText for UnreachableSpeech {
        fn name(&self) -> &'static str {
            "unreachable-speech"
        }
        async fn transcribe(&self, _audio_path: &Path) -> Result<String, SpeechError> {
            Err(SpeechError::NotConfigured)
        }
    }

    #[tokio::test]
    async fn test_upload_completes_with_the_provider_transcript() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path())
            .await
            .with_passthrough_extraction()
            .with_speech(Arc::new(FixedSpeech("Hello world. This is a test.")));

        let job = pipeline
            .submit_upload("bob", "clip.mp4", "video/mp4", vec![0; 64])
            .await
            .unwrap();
        let done = wait_for_terminal(&pipeline, &job.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.transcript, "Hello world. This is a test.");
        assert!(done.topics.len() >= 3);
        assert!(done.summary.is_some());
    }

    #[tokio::test]
    async fn test_upload_provider_error_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path())
            .await
            .with_passthrough_extraction()
            .with_speech(Arc::new(ErringSpeech("audio format not supported")));

        let job = pipeline
            .submit_upload("bob", "clip.mp4", "video/mp4", vec![0; 64])
            .await
            .unwrap();
        let done = wait_for_terminal(&pipeline, &job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        let error = done.error.unwrap();
        assert!(error.contains("transcription failed"));
        assert!(error.contains("audio format not supported"));
    }

    #[tokio::test]
    async fn test_upload_polling_timeout_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path())
            .await
            .with_passthrough_extraction()
            .with_speech(Arc::new(StalledSpeech));

        let job = pipeline
            .submit_upload("bob", "clip.mp4", "video/mp4", vec![0; 64])
            .await
            .unwrap();
        let done = wait_for_terminal(&pipeline, &job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("3 attempts"));
    }

    #[tokio::test]
    async fn test_upload_unavailable_provider_degrades_to_template() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path())
            .await
            .with_passthrough_extraction()
            .with_speech(Arc::new(UnreachableSpeech));

        let job = pipeline
            .submit_upload("bob", "talk.webm", "video/webm", vec![0; 64])
            .await
            .unwrap();
        let done = wait_for_terminal(&pipeline, &job.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.transcript.contains("talk.webm"));
    }

    #[tokio::test]
    async fn test_artifacts_require_a_completed_job() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path()).await;

        let err = pipeline
            .generate_summary("no-such-job", ArtifactScope::Overall)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_artifact_generation_on_completed_job() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with_dir(dir.path()).await;

        let job = pipeline
            .submit_url("alice", "https://youtu.be/abc123XYZ")
            .await
            .unwrap();
        let done = wait_for_terminal(&pipeline, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        let topic_id = done.topics[0].id;

        let refreshed = pipeline
            .generate_summary(&job.id, ArtifactScope::Topic(topic_id))
            .await
            .unwrap();
        let topic = refreshed.topic(topic_id).unwrap();
        assert!(topic.summary.as_deref().is_some_and(|s| !s.is_empty()));

        let topic = pipeline
            .generate_flashcards(&job.id, topic_id, Some(2))
            .await
            .unwrap();
        assert_eq!(topic.flashcards.len(), 2);

        let err = pipeline
            .generate_flashcards(&job.id, 999, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));

        let report = pipeline.materialize(&job.id).await.unwrap();
        assert_eq!(report.notes_created, 1 + refreshed.topics.len());
        assert_eq!(report.flashcards_created, 2);
    }
}
