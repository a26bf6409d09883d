use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Where the analyzed video came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Youtube,
    Upload,
}

/// Job lifecycle status. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A question/answer pair derived from a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// A contiguous, time-bounded slice of the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// Stable within the parent job.
    pub id: u32,
    pub title: String,
    /// Estimated offset into the source, seconds.
    pub start_time: f64,
    pub end_time: f64,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

/// One record per submitted video. Mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub source_kind: SourceKind,
    /// URL for `youtube` sources; empty for uploads (the file is consumed
    /// immediately and not retained).
    pub source_location: String,
    pub status: JobStatus,
    /// 0-100, non-decreasing while processing.
    pub progress: u8,
    pub transcript: String,
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(owner: &str, title: &str, source_kind: SourceKind, source_location: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            title: title.to_string(),
            source_kind,
            source_location: source_location.to_string(),
            status: JobStatus::Processing,
            progress: 0,
            transcript: String::new(),
            topics: Vec::new(),
            summary: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn topic(&self, topic_id: u32) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == topic_id)
    }
}

/// Persistent store for analysis jobs: one JSON file per job under a base
/// directory, fronted by an in-memory cache so status polls never touch disk.
#[derive(Debug, Clone)]
pub struct JobStore {
    jobs_dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, AnalysisJob>>>,
}

/// Aggregate counts, used by the health endpoint and logs.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStore {
    /// Open the store, loading any job files already on disk.
    pub async fn new(jobs_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&jobs_dir).await?;

        let store = Self {
            jobs_dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
        };
        let loaded = store.load_existing().await?;
        info!("job store opened with {} persisted jobs", loaded);

        Ok(store)
    }

    async fn load_existing(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.jobs_dir).await?;
        let mut loaded = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                match self.load_job_file(&path).await {
                    Ok(job) => {
                        self.cache.write().await.insert(job.id.clone(), job);
                        loaded += 1;
                    }
                    Err(e) => {
                        warn!("skipping unreadable job file {}: {}", path.display(), e);
                    }
                }
            }
        }

        debug!("loaded {} job files from disk", loaded);
        Ok(loaded)
    }

    async fn load_job_file(&self, path: &Path) -> Result<AnalysisJob> {
        let content = fs::read_to_string(path).await?;
        let job: AnalysisJob = serde_json::from_str(&content)?;
        Ok(job)
    }

    /// Persist a newly created job.
    pub async fn create(&self, job: AnalysisJob) -> Result<()> {
        self.persist(&job).await?;
        self.cache.write().await.insert(job.id.clone(), job);
        Ok(())
    }

    /// Point-in-time snapshot of a job.
    pub async fn get(&self, job_id: &str) -> Option<AnalysisJob> {
        self.cache.read().await.get(job_id).cloned()
    }

    /// Apply a mutation to a job and persist the result.
    ///
    /// Invariant guards live here rather than in callers: a terminal job
    /// keeps its status and progress no matter what the mutator wrote
    /// (derived artifacts may still be merged in), and progress never
    /// regresses while processing. `updated_at` is bumped on every write.
    pub async fn update<F>(&self, job_id: &str, mutate: F) -> Result<AnalysisJob>
    where
        F: FnOnce(&mut AnalysisJob),
    {
        let snapshot = {
            let mut cache = self.cache.write().await;
            let job = cache
                .get_mut(job_id)
                .ok_or_else(|| anyhow!("unknown job: {}", job_id))?;

            let prev_status = job.status;
            let prev_progress = job.progress;

            mutate(job);

            if prev_status.is_terminal() {
                job.status = prev_status;
                job.progress = prev_progress;
            } else {
                if job.progress < prev_progress {
                    job.progress = prev_progress;
                }
                match job.status {
                    JobStatus::Completed => job.progress = 100,
                    // Progress freezes at its last value on failure.
                    JobStatus::Failed => job.progress = prev_progress,
                    JobStatus::Processing => {}
                }
            }
            job.updated_at = Utc::now();
            job.clone()
        };

        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    /// Fail any job left `processing` longer than `stale_after`.
    ///
    /// Runs once at startup: in-flight jobs do not survive a process
    /// restart, so anything stale can only be an abandoned job.
    pub async fn recover_stale(&self, stale_after: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - stale_after;
        let stale_ids: Vec<String> = {
            let cache = self.cache.read().await;
            cache
                .values()
                .filter(|job| job.status == JobStatus::Processing && job.updated_at < cutoff)
                .map(|job| job.id.clone())
                .collect()
        };

        for id in &stale_ids {
            warn!("failing stale job {} (interrupted by restart)", id);
            self.update(id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some("processing interrupted by a restart".to_string());
            })
            .await?;
        }

        if !stale_ids.is_empty() {
            info!("recovery scan failed {} stale jobs", stale_ids.len());
        }
        Ok(stale_ids.len())
    }

    pub async fn stats(&self) -> StoreStats {
        let cache = self.cache.read().await;
        let mut stats = StoreStats {
            total: cache.len(),
            processing: 0,
            completed: 0,
            failed: 0,
        };
        for job in cache.values() {
            match job.status {
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    async fn persist(&self, job: &AnalysisJob) -> Result<()> {
        let path = self.jobs_dir.join(format!("{}.json", job.id));
        let json = serde_json::to_string_pretty(job)?;
        fs::write(&path, json).await?;
        debug!("persisted job {} ({:?}, {}%)", job.id, job.status, job.progress);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> JobStore {
        JobStore::new(dir.path().to_path_buf()).await.unwrap()
    }

    fn sample_job() -> AnalysisJob {
        AnalysisJob::new("user-1", "Test video", SourceKind::Youtube, "https://youtu.be/abc123XYZ")
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let job = sample_job();
        let id = job.id.clone();

        store.create(job).await.unwrap();
        let fetched = store.get(&id).await.unwrap();

        assert_eq!(fetched.status, JobStatus::Processing);
        assert_eq!(fetched.progress, 0);
        assert!(fetched.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let job = sample_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();

        store.update(&id, |j| j.progress = 50).await.unwrap();
        let snapshot = store.update(&id, |j| j.progress = 10).await.unwrap();

        assert_eq!(snapshot.progress, 50);
    }

    #[tokio::test]
    async fn test_terminal_state_is_frozen() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let job = sample_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();

        store
            .update(&id, |j| {
                j.progress = 80;
                j.status = JobStatus::Failed;
                j.error = Some("boom".to_string());
            })
            .await
            .unwrap();

        let snapshot = store
            .update(&id, |j| {
                j.status = JobStatus::Processing;
                j.progress = 99;
            })
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.progress, 80);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_completed_pins_progress_to_100() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let job = sample_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();

        let snapshot = store
            .update(&id, |j| j.status = JobStatus::Completed)
            .await
            .unwrap();

        assert_eq!(snapshot.progress, 100);
    }

    #[tokio::test]
    async fn test_artifacts_merge_into_terminal_jobs() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let job = sample_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();

        store
            .update(&id, |j| j.status = JobStatus::Completed)
            .await
            .unwrap();
        let snapshot = store
            .update(&id, |j| j.summary = Some("an overall summary".to_string()))
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.summary.as_deref(), Some("an overall summary"));
    }

    #[tokio::test]
    async fn test_jobs_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open_store(&dir).await;
            let job = sample_job();
            let id = job.id.clone();
            store.create(job).await.unwrap();
            store.update(&id, |j| j.progress = 50).await.unwrap();
            id
        };

        let reopened = open_store(&dir).await;
        let job = reopened.get(&id).await.unwrap();
        assert_eq!(job.progress, 50);
    }

    #[tokio::test]
    async fn test_recovery_scan_fails_stale_processing_jobs() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut stale = sample_job();
        stale.updated_at = Utc::now() - chrono::Duration::hours(2);
        let stale_id = stale.id.clone();
        // Insert without the update path so the old timestamp sticks.
        store.cache.write().await.insert(stale_id.clone(), stale);

        let fresh = sample_job();
        let fresh_id = fresh.id.clone();
        store.create(fresh).await.unwrap();

        let recovered = store
            .recover_stale(chrono::Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(recovered, 1);
        assert_eq!(store.get(&stale_id).await.unwrap().status, JobStatus::Failed);
        assert_eq!(
            store.get(&fresh_id).await.unwrap().status,
            JobStatus::Processing
        );
    }
}
