//! Opinion sources: anything that proposes movies for a taste context.
//!
//! Every provider is identified by a [`SourceId`] variant. New sources are
//! added by extending that enum and implementing [`OpinionSource`].

use std::time::Duration;

use crate::{
    error::AppResult,
    models::{Proposal, SourceId, TasteContext},
};

/// Uniform contract for recommendation providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OpinionSource: Send + Sync {
    /// Stable identifier used for weighting and attribution
    fn id(&self) -> SourceId;

    /// Produce up to `count` proposals, surfacing any failure to the caller
    ///
    /// Callers in the pipeline go through [`propose_isolated`], which turns
    /// errors and timeouts into an empty contribution.
    async fn try_propose(&self, context: &TasteContext, count: usize) -> AppResult<Vec<Proposal>>;
}

/// Runs one source under a time budget, swallowing its failures
///
/// An error or timeout is logged and yields no proposals, so a single
/// misbehaving source never blocks or corrupts its siblings. Proposals are
/// stamped with the source's identifier.
pub async fn propose_isolated(
    source: &dyn OpinionSource,
    context: &TasteContext,
    count: usize,
    budget: Duration,
) -> Vec<Proposal> {
    let id = source.id();

    match tokio::time::timeout(budget, source.try_propose(context, count)).await {
        Ok(Ok(proposals)) => {
            tracing::info!(source = %id, proposals = proposals.len(), "Opinion source responded");
            proposals
                .into_iter()
                .map(|mut p| {
                    p.source = id;
                    p
                })
                .collect()
        }
        Ok(Err(e)) => {
            tracing::warn!(source = %id, error = %e, "Opinion source failed");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(
                source = %id,
                budget_secs = budget.as_secs_f64(),
                "Opinion source timed out"
            );
            Vec::new()
        }
    }
}
