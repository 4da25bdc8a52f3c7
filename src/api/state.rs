use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::GenerationJob,
    services::{GenerationPipeline, JobTracker},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GenerationPipeline>,
    /// Job id and cancellation handle of each owner's in-flight run
    runs: Arc<Mutex<HashMap<i64, (Uuid, CancellationToken)>>>,
}

impl AppState {
    pub fn new(pipeline: Arc<GenerationPipeline>) -> Self {
        Self {
            pipeline,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        self.pipeline.tracker()
    }

    /// Starts a job for the owner and registers its run, cancelling the one it replaces
    ///
    /// The run table stays locked while the job is created so that concurrent
    /// requests for one owner are serialized and exactly one of them survives.
    pub async fn start_run(&self, owner: i64) -> AppResult<(GenerationJob, CancellationToken)> {
        let mut runs = self.runs.lock().await;
        let job = self.tracker().start(owner).await?;
        let token = CancellationToken::new();
        if let Some((previous_job, previous_token)) = runs.insert(owner, (job.id, token.clone())) {
            previous_token.cancel();
            tracing::info!(owner, job_id = %previous_job, "In-flight generation superseded");
        }
        Ok((job, token))
    }

    /// Forgets the run unless a newer one has already replaced it
    pub async fn end_run(&self, owner: i64, job_id: Uuid) {
        let mut runs = self.runs.lock().await;
        if runs.get(&owner).is_some_and(|(current, _)| *current == job_id) {
            runs.remove(&owner);
        }
    }

    pub async fn live_runs(&self) -> usize {
        self.runs.lock().await.len()
    }
}
