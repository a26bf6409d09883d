//! HTTP request handlers.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use tracing::debug;

use super::models::{
    ApiError, FlashcardRequest, HealthResponse, JobResponse, SubmitUrlRequest, SummaryRequest,
};
use super::server::AppState;
use crate::error::PipelineError;
use crate::pipeline::ArtifactScope;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.store.stats().await;
    debug!(
        "health check: {} jobs ({} processing)",
        stats.total, stats.processing
    );
    Json(HealthResponse::ok())
}

/// Accepts a URL submission and returns the new job with 202.
pub async fn submit_url(
    State(state): State<AppState>,
    Json(request): Json<SubmitUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.pipeline.submit_url(&request.owner, &request.url).await?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job))))
}

/// Accepts a multipart upload. Expected parts: an optional `owner` text
/// field and a `file` part carrying the media.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut owner = "anonymous".to_string();
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let limit = state.config.ingest.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        match field.name() {
            Some("owner") => {
                owner = field.text().await.map_err(|e| multipart_error(e, limit))?;
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (filename, content_type, media) = file.ok_or_else(|| {
        PipelineError::Validation("multipart body is missing a `file` part".to_string())
    })?;
    let job = state
        .pipeline
        .submit_upload(&owner, &filename, &content_type, media)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job))))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .store
        .get(&job_id)
        .await
        .ok_or_else(|| PipelineError::NotFound(job_id))?;
    Ok(Json(JobResponse::from(job)))
}

pub async fn generate_summary(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<SummaryRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    let scope = parse_scope(&request.scope)?;
    let job = state.pipeline.generate_summary(&job_id, scope).await?;
    Ok(Json(JobResponse::from(job)))
}

pub async fn generate_flashcards(
    State(state): State<AppState>,
    Path((job_id, topic_id)): Path<(String, u32)>,
    request: Option<Json<FlashcardRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let count = request.and_then(|Json(r)| r.count);
    let topic = state
        .pipeline
        .generate_flashcards(&job_id, topic_id, count)
        .await?;
    Ok(Json(topic))
}

pub async fn materialize(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.pipeline.materialize(&job_id).await?;
    Ok(Json(report))
}

/// A body that blows through the router's size limit surfaces mid-read as a
/// multipart error; report it as the payload cap, not a malformed body.
fn multipart_error(err: MultipartError, limit: u64) -> PipelineError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PipelineError::TooLarge { limit }
    } else {
        PipelineError::Validation(format!("malformed multipart body: {}", err))
    }
}

fn parse_scope(raw: &str) -> Result<ArtifactScope, PipelineError> {
    if raw.eq_ignore_ascii_case("overall") {
        return Ok(ArtifactScope::Overall);
    }
    raw.parse::<u32>()
        .map(ArtifactScope::Topic)
        .map_err(|_| {
            PipelineError::Validation(format!(
                "scope must be \"overall\" or a topic id, got {:?}",
                raw
            ))
        })
}
