use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{GenerationJob, JobStage, JobStatus},
    services::{jobs::DEFAULT_ETA_SECS, GenerationRequest},
};

use super::AppState;

/// Upper bound on a caller-requested list size
const MAX_TARGET_COUNT: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateBody {
    pub target_count: Option<usize>,
    /// Free-text taste signal from friends or curated profiles
    pub peer_signal: Option<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationStarted {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub eta_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub owner: i64,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub error: Option<String>,
    pub eta_seconds: u64,
}

impl JobView {
    fn new(job: GenerationJob, eta: f64) -> Self {
        Self {
            job_id: job.id,
            owner: job.owner,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            started_at: job.started_at,
            completed_at: job.completed_at,
            duration_secs: job.duration_secs,
            error: job.error,
            eta_seconds: eta.round() as u64,
        }
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let running = state.live_runs().await;
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "running_generations": running })),
    )
}

/// Starts a generation job and runs the pipeline in the background
///
/// Any run already in flight for the owner is superseded.
pub async fn generate(
    State(state): State<AppState>,
    Path(owner): Path<i64>,
    request_id: Option<Extension<RequestId>>,
    body: Option<Json<GenerateBody>>,
) -> AppResult<(StatusCode, Json<GenerationStarted>)> {
    if owner <= 0 {
        return Err(AppError::InvalidInput(format!("invalid owner id {}", owner)));
    }
    let body = body.map(|Json(b)| b).unwrap_or_default();
    if let Some(count) = body.target_count {
        if count == 0 || count > MAX_TARGET_COUNT {
            return Err(AppError::InvalidInput(format!(
                "target_count must be between 1 and {}",
                MAX_TARGET_COUNT
            )));
        }
    }

    let (job, cancel) = state.start_run(owner).await?;
    let eta = state
        .tracker()
        .estimate_eta(&job)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(job_id = %job.id, error = %e, "ETA unavailable, using default");
            DEFAULT_ETA_SECS
        });

    let request_id = request_id
        .map(|Extension(id)| id.to_string())
        .unwrap_or_else(|| "none".to_string());
    tracing::info!(owner, job_id = %job.id, request_id = %request_id, "Generation requested");

    let response = GenerationStarted {
        job_id: job.id,
        status: job.status,
        eta_seconds: eta.round() as u64,
    };

    let request = GenerationRequest {
        owner,
        target_count: body.target_count,
        peer_signal: body.peer_signal,
        avoid: body.avoid,
    };
    let job_id = job.id;
    tokio::spawn(async move {
        match state.pipeline.generate(request, Some(job), cancel).await {
            Ok(job) => {
                tracing::info!(job_id = %job.id, status = %job.status, "Background generation ended");
            }
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Background generation could not run"),
        }
        state.end_run(owner, job_id).await;
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Drops the owner's saved list
pub async fn clear_recommendations(
    State(state): State<AppState>,
    Path(owner): Path<i64>,
) -> AppResult<StatusCode> {
    if owner <= 0 {
        return Err(AppError::InvalidInput(format!("invalid owner id {}", owner)));
    }
    state.pipeline.recommendations().clear_previous(owner).await?;
    tracing::info!(owner, "Recommendations cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// Latest job for the owner with its ETA
pub async fn generation_status(
    State(state): State<AppState>,
    Path(owner): Path<i64>,
) -> AppResult<Json<JobView>> {
    let job = state
        .tracker()
        .latest(owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No generation job for owner {}", owner)))?;
    let eta = state.tracker().estimate_eta(&job).await?;

    Ok(Json(JobView::new(job, eta)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<JobView>> {
    let job = state
        .tracker()
        .get(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Generation job {}", job_id)))?;
    let eta = state.tracker().estimate_eta(&job).await?;

    Ok(Json(JobView::new(job, eta)))
}
