//! Persistence seams consumed by the generation pipeline.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{GenerationJob, RankedRecommendation, RatedItem, TitleId},
};

/// Historical ratings for an owner
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingsStore: Send + Sync {
    async fn get_ratings(&self, owner: i64) -> AppResult<Vec<RatedItem>>;

    async fn get_watched_ids(&self, owner: i64) -> AppResult<HashSet<TitleId>>;
}

/// The persisted recommendation list for an owner
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn clear_previous(&self, owner: i64) -> AppResult<()>;

    /// Replaces the owner's list with this one, stored in rank order
    ///
    /// The previous list survives untouched if the save fails.
    async fn save_ranked_list(&self, owner: i64, recommendations: &[RankedRecommendation]) -> AppResult<()>;
}

/// Generation job records
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Non-terminal jobs for the owner
    async fn live_jobs(&self, owner: i64) -> AppResult<Vec<GenerationJob>>;

    async fn insert(&self, job: &GenerationJob) -> AppResult<()>;

    /// Writes the job unless the stored record is already terminal
    ///
    /// Returns whether the write happened.
    async fn update(&self, job: &GenerationJob) -> AppResult<bool>;

    async fn get(&self, id: Uuid) -> AppResult<Option<GenerationJob>>;

    async fn latest_for_owner(&self, owner: i64) -> AppResult<Option<GenerationJob>>;

    /// Durations of all completed jobs, in seconds
    async fn completed_durations(&self) -> AppResult<Vec<f64>>;
}
