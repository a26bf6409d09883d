//! End-to-end pipeline tests through the public crate API.
//!
//! No external providers are configured, so jobs complete through the
//! deterministic fallback paths.

use clipnotes::{
    AnalysisJob, ArtifactScope, ConfigBuilder, JobStatus, JobStore, Pipeline, PipelineError,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn pipeline_at(dir: &Path) -> (Pipeline, Arc<JobStore>) {
    let config = ConfigBuilder::new()
        .with_jobs_dir(dir.to_path_buf())
        .build();
    let store = Arc::new(JobStore::new(dir.to_path_buf()).await.unwrap());
    let pipeline = Pipeline::new(config, store.clone()).unwrap();
    (pipeline, store)
}

async fn wait_for_terminal(store: &JobStore, job_id: &str) -> AnalysisJob {
    for _ in 0..200 {
        if let Some(job) = store.get(job_id).await {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} never reached a terminal status", job_id);
}

#[tokio::test]
async fn test_url_submission_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let (pipeline, store) = pipeline_at(dir.path()).await;

    let job = pipeline
        .submit_url("alice", "https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.progress, 0);

    let done = wait_for_terminal(&store, &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    // With no providers the transcript is the deterministic template,
    // which references the video id.
    assert!(done.transcript.contains("dQw4w9WgXcQ"));
    assert!(done.topics.len() >= 3);
    for pair in done.topics.windows(2) {
        assert!(pair[0].start_time < pair[1].start_time);
    }
    assert!(done.summary.as_deref().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn test_completed_job_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let job_id = {
        let (pipeline, store) = pipeline_at(dir.path()).await;
        let job = pipeline
            .submit_url("alice", "https://youtu.be/abc123XYZ")
            .await
            .unwrap();
        wait_for_terminal(&store, &job.id).await;
        job.id
    };

    // Fresh store over the same directory, as after a process restart.
    let store = JobStore::new(dir.path().to_path_buf()).await.unwrap();
    let job = store.get(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(!job.transcript.is_empty());
    assert!(job.topics.len() >= 3);
}

#[tokio::test]
async fn test_artifacts_attach_without_disturbing_terminal_state() {
    let dir = TempDir::new().unwrap();
    let (pipeline, store) = pipeline_at(dir.path()).await;

    let job = pipeline
        .submit_url("alice", "https://youtu.be/abc123XYZ")
        .await
        .unwrap();
    let done = wait_for_terminal(&store, &job.id).await;
    let topic_id = done.topics[0].id;

    let refreshed = pipeline
        .generate_summary(&job.id, ArtifactScope::Topic(topic_id))
        .await
        .unwrap();
    assert_eq!(refreshed.status, JobStatus::Completed);
    assert_eq!(refreshed.progress, 100);
    assert!(refreshed.topic(topic_id).unwrap().summary.is_some());

    let topic = pipeline
        .generate_flashcards(&job.id, topic_id, None)
        .await
        .unwrap();
    assert_eq!(topic.flashcards.len(), 5);
}

#[tokio::test]
async fn test_rejected_submissions_leave_no_record() {
    let dir = TempDir::new().unwrap();
    let (pipeline, store) = pipeline_at(dir.path()).await;

    for url in [
        "not a url",
        "ftp://youtube.com/watch?v=abc123XYZ",
        "https://vimeo.com/12345678",
        "https://www.youtube.com/watch",
    ] {
        let err = pipeline.submit_url("alice", url).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)), "{}", url);
    }

    let err = pipeline
        .submit_upload("alice", "doc.pdf", "application/pdf", vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedMedia(_)));

    assert_eq!(store.stats().await.total, 0);
}
