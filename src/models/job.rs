use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lifecycle status of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(AppError::Internal(format!("unknown job status '{}'", other))),
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline checkpoint, each with a fixed progress percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Starting,
    LoadingRatings,
    FanOut,
    Collaborative,
    Aggregating,
    Enriching,
    Diversity,
    Saving,
    Completed,
}

impl JobStage {
    pub fn progress(&self) -> u8 {
        match self {
            JobStage::Starting => 0,
            JobStage::LoadingRatings => 5,
            JobStage::FanOut => 10,
            JobStage::Collaborative => 60,
            JobStage::Aggregating => 70,
            JobStage::Enriching => 75,
            JobStage::Diversity => 90,
            JobStage::Saving => 95,
            JobStage::Completed => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Starting => "starting",
            JobStage::LoadingRatings => "loading_ratings",
            JobStage::FanOut => "fan_out",
            JobStage::Collaborative => "collaborative",
            JobStage::Aggregating => "aggregating",
            JobStage::Enriching => "enriching",
            JobStage::Diversity => "diversity",
            JobStage::Saving => "saving",
            JobStage::Completed => "completed",
        }
    }
}

impl std::str::FromStr for JobStage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(JobStage::Starting),
            "loading_ratings" => Ok(JobStage::LoadingRatings),
            "fan_out" => Ok(JobStage::FanOut),
            "collaborative" => Ok(JobStage::Collaborative),
            "aggregating" => Ok(JobStage::Aggregating),
            "enriching" => Ok(JobStage::Enriching),
            "diversity" => Ok(JobStage::Diversity),
            "saving" => Ok(JobStage::Saving),
            "completed" => Ok(JobStage::Completed),
            other => Err(AppError::Internal(format!("unknown job stage '{}'", other))),
        }
    }
}

impl Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked record of one end-to-end pipeline run
///
/// Jobs begin in `Running` and only move forward. Once terminal, every
/// further transition is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub id: Uuid,
    pub owner: i64,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub error: Option<String>,
}

impl GenerationJob {
    pub fn start(owner: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            status: JobStatus::Running,
            stage: JobStage::Starting,
            progress: JobStage::Starting.progress(),
            started_at: now,
            completed_at: None,
            duration_secs: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_live(&self, action: &str) -> AppResult<()> {
        if self.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "cannot {} job {} in status {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    /// Moves to a checkpoint; progress never decreases
    pub fn advance(&mut self, stage: JobStage) -> AppResult<()> {
        self.ensure_live("advance")?;
        self.stage = stage;
        self.progress = self.progress.max(stage.progress());
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_live("complete")?;
        self.status = JobStatus::Completed;
        self.stage = JobStage::Completed;
        self.progress = 100;
        self.completed_at = Some(now);
        self.duration_secs = Some(elapsed_secs(self.started_at, now));
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_live("fail")?;
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.completed_at = Some(now);
        self.duration_secs = Some(elapsed_secs(self.started_at, now));
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_live("cancel")?;
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        elapsed_secs(self.started_at, now)
    }
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds().max(0) as f64) / 1000.0
}
