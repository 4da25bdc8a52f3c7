//! Job lifecycle bookkeeping on top of a [`JobStore`].
//!
//! The store is the source of truth: every checkpoint re-reads the stored
//! record, so a run whose job was cancelled by a newer request stops at its
//! next checkpoint.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::JobStore,
    error::{AppError, AppResult},
    models::{GenerationJob, JobStage, JobStatus},
};

/// ETA used when no completed job has a usable duration
pub const DEFAULT_ETA_SECS: f64 = 90.0;
const MIN_SANE_DURATION: f64 = 10.0;
const MAX_SANE_DURATION: f64 = 600.0;

/// Mean of durations strictly between 10 s and 600 s, or the default
pub fn average_duration(durations: &[f64]) -> f64 {
    let sane: Vec<f64> = durations
        .iter()
        .copied()
        .filter(|d| *d > MIN_SANE_DURATION && *d < MAX_SANE_DURATION)
        .collect();

    if sane.is_empty() {
        DEFAULT_ETA_SECS
    } else {
        sane.iter().sum::<f64>() / sane.len() as f64
    }
}

/// Seconds left for a job given the historical average
pub fn remaining_secs(average: f64, elapsed: f64) -> f64 {
    (average - elapsed).max(0.0)
}

#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Creates a running job, cancelling the owner's live jobs first
    pub async fn start(&self, owner: i64) -> AppResult<GenerationJob> {
        let now = Utc::now();

        for mut live in self.store.live_jobs(owner).await? {
            if live.cancel(now).is_ok() && self.store.update(&live).await? {
                tracing::info!(job_id = %live.id, owner, "Superseded generation job cancelled");
            }
        }

        let job = GenerationJob::start(owner, now);
        self.store.insert(&job).await?;
        tracing::info!(job_id = %job.id, owner, "Generation job started");
        Ok(job)
    }

    /// Fails with [`AppError::Cancelled`] once the stored job is terminal
    async fn ensure_live(&self, job: &GenerationJob) -> AppResult<()> {
        match self.store.get(job.id).await? {
            Some(stored) if stored.status == JobStatus::Cancelled => Err(AppError::Cancelled),
            Some(stored) if stored.is_terminal() => Err(AppError::InvalidTransition(format!(
                "job {} already {}",
                job.id, stored.status
            ))),
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Generation job {}", job.id))),
        }
    }

    async fn persist(&self, job: &GenerationJob) -> AppResult<()> {
        if self.store.update(job).await? {
            Ok(())
        } else {
            Err(AppError::Cancelled)
        }
    }

    pub async fn advance(&self, job: &mut GenerationJob, stage: JobStage) -> AppResult<()> {
        self.ensure_live(job).await?;
        job.advance(stage)?;
        self.persist(job).await?;
        tracing::info!(job_id = %job.id, stage = %stage, progress = job.progress, "Generation stage");
        Ok(())
    }

    pub async fn complete(&self, job: &mut GenerationJob) -> AppResult<()> {
        self.ensure_live(job).await?;
        job.complete(Utc::now())?;
        self.persist(job).await?;
        tracing::info!(job_id = %job.id, duration_secs = ?job.duration_secs, "Generation job completed");
        Ok(())
    }

    /// Records the failure; a job already terminal in the store is left alone
    pub async fn fail(&self, job: &mut GenerationJob, message: &str) -> AppResult<()> {
        job.fail(message, Utc::now())?;
        if self.store.update(job).await? {
            tracing::error!(job_id = %job.id, error = %message, "Generation job failed");
        }
        Ok(())
    }

    pub async fn cancel(&self, job: &mut GenerationJob) -> AppResult<()> {
        job.cancel(Utc::now())?;
        self.store.update(job).await?;
        Ok(())
    }

    pub async fn get(&self, id: uuid::Uuid) -> AppResult<Option<GenerationJob>> {
        self.store.get(id).await
    }

    pub async fn latest(&self, owner: i64) -> AppResult<Option<GenerationJob>> {
        self.store.latest_for_owner(owner).await
    }

    pub async fn average_duration(&self) -> AppResult<f64> {
        Ok(average_duration(&self.store.completed_durations().await?))
    }

    /// Estimated seconds remaining; zero for terminal jobs
    pub async fn estimate_eta(&self, job: &GenerationJob) -> AppResult<f64> {
        if job.is_terminal() {
            return Ok(0.0);
        }
        let average = self.average_duration().await?;
        Ok(remaining_secs(average, job.elapsed_secs(Utc::now())))
    }
}
