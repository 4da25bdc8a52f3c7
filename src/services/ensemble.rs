//! Concurrent fan-out over every active opinion source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{Proposal, SourceId, TasteContext},
    services::sources::{propose_isolated, OpinionSource},
};

#[derive(Debug, Default)]
pub struct FanOutResult {
    /// Every invoked source, including those that came back empty
    pub proposals: BTreeMap<SourceId, Vec<Proposal>>,
    pub elapsed: Duration,
}

impl FanOutResult {
    pub fn total(&self) -> usize {
        self.proposals.values().map(Vec::len).sum()
    }

    /// Sources that returned at least one proposal
    pub fn responding(&self) -> usize {
        self.proposals.values().filter(|p| !p.is_empty()).count()
    }
}

pub struct FanOut {
    sources: Vec<Arc<dyn OpinionSource>>,
    timeout: Duration,
}

impl FanOut {
    pub fn new(sources: Vec<Arc<dyn OpinionSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Runs all sources in parallel tasks and waits for each to finish or time out
    ///
    /// Wall-clock time tracks the slowest source. Cancelling `cancel` aborts the
    /// outstanding tasks and returns [`AppError::Cancelled`].
    pub async fn run(
        &self,
        context: Arc<TasteContext>,
        count: usize,
        cancel: &CancellationToken,
    ) -> AppResult<FanOutResult> {
        let started = Instant::now();

        if self.sources.is_empty() {
            tracing::info!("No active opinion sources, skipping fan-out");
            return Ok(FanOutResult::default());
        }

        let ids: Vec<SourceId> = self.sources.iter().map(|s| s.id()).collect();
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let context = Arc::clone(&context);
                let budget = self.timeout;
                tokio::spawn(async move {
                    propose_isolated(source.as_ref(), &context, count, budget).await
                })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let outcomes = tokio::select! {
            _ = cancel.cancelled() => {
                aborts.iter().for_each(|a| a.abort());
                tracing::info!(sources = ids.len(), "Fan-out cancelled");
                return Err(AppError::Cancelled);
            }
            outcomes = join_all(handles) => outcomes,
        };

        let mut proposals = BTreeMap::new();
        for (id, outcome) in ids.into_iter().zip(outcomes) {
            let list = outcome.unwrap_or_else(|e| {
                tracing::warn!(source = %id, error = %e, "Opinion source task failed");
                Vec::new()
            });
            proposals.insert(id, list);
        }

        let result = FanOutResult {
            proposals,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            sources = result.proposals.len(),
            responding = result.responding(),
            proposals = result.total(),
            elapsed_secs = result.elapsed.as_secs_f64(),
            "Fan-out complete"
        );
        Ok(result)
    }
}
