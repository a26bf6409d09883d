//! Request and response types for the HTTP API.

use crate::error::PipelineError;
use crate::store::{AnalysisJob, JobStatus, SourceKind, Topic};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SubmitUrlRequest {
    pub url: String,
    #[serde(default = "default_owner")]
    pub owner: String,
}

fn default_owner() -> String {
    "anonymous".to_string()
}

/// Scope for summary regeneration: `"overall"` or a topic id in digits.
#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub struct FlashcardRequest {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "healthy",
            service: "clipnotes",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }
    }
}

/// Job record as the API exposes it.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub source_kind: SourceKind,
    pub status: JobStatus,
    pub progress: u8,
    pub transcript: String,
    pub topics: Vec<Topic>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AnalysisJob> for JobResponse {
    fn from(job: AnalysisJob) -> Self {
        Self {
            id: job.id,
            owner: job.owner,
            title: job.title,
            source_kind: job.source_kind,
            status: job.status,
            progress: job.progress,
            transcript: job.transcript,
            topics: job.topics,
            summary: job.summary,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Pipeline errors mapped onto HTTP statuses.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PipelineError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Stage { .. } | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
