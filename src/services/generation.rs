//! End-to-end recommendation generation for one owner.
//!
//! Stages run in a fixed order and each checkpoint goes through the
//! [`JobTracker`], which stops the run once a newer request has cancelled
//! its job. Source failures, catalog misses and category shortfalls are
//! absorbed along the way; anything else fails the job.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::PipelineSettings,
    db::{RatingsStore, RecommendationStore},
    error::{AppError, AppResult},
    models::{GenerationJob, JobStage, RankedRecommendation, TitleId},
    services::{
        aggregator::aggregate,
        diversity::DiversityEnforcer,
        enrichment::{enrich_ranked, SeenSet},
        ensemble::FanOut,
        jobs::JobTracker,
        providers::MetadataProvider,
        sources::{propose_isolated, OpinionSource},
        taste::build_context,
    },
};

/// Share of the target that already-watched titles may occupy
const WATCHED_SHARE: f64 = 0.4;
const WATCHED_SCORE_FACTOR: f64 = 0.5;
/// Backfill scores at most this share of the weakest organic score
const FILL_SCORE_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub owner: i64,
    /// Falls back to the configured target when absent
    pub target_count: Option<usize>,
    pub peer_signal: Option<String>,
    pub avoid: Vec<String>,
}

impl GenerationRequest {
    pub fn for_owner(owner: i64) -> Self {
        Self {
            owner,
            ..Default::default()
        }
    }
}

/// Collaborators wired once at startup
pub struct PipelineDeps {
    pub ratings: Arc<dyn RatingsStore>,
    pub recommendations: Arc<dyn RecommendationStore>,
    pub tracker: JobTracker,
    pub metadata: Arc<dyn MetadataProvider>,
    pub advisors: Vec<Arc<dyn OpinionSource>>,
    pub collaborative: Option<Arc<dyn OpinionSource>>,
    pub fill: Option<Arc<dyn OpinionSource>>,
    pub settings: PipelineSettings,
}

pub struct GenerationPipeline {
    ratings: Arc<dyn RatingsStore>,
    recommendations: Arc<dyn RecommendationStore>,
    tracker: JobTracker,
    metadata: Arc<dyn MetadataProvider>,
    fan_out: FanOut,
    collaborative: Option<Arc<dyn OpinionSource>>,
    diversity: DiversityEnforcer,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let settings = deps.settings;
        Self {
            fan_out: FanOut::new(deps.advisors, settings.source_timeout),
            diversity: DiversityEnforcer::new(
                deps.fill,
                Arc::clone(&deps.metadata),
                settings.min_per_category,
                settings.source_timeout,
            ),
            ratings: deps.ratings,
            recommendations: deps.recommendations,
            tracker: deps.tracker,
            metadata: deps.metadata,
            collaborative: deps.collaborative,
            settings,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn recommendations(&self) -> &Arc<dyn RecommendationStore> {
        &self.recommendations
    }

    /// Runs the pipeline and returns the job in its terminal state
    ///
    /// A job is started when none is supplied. Pipeline errors are recorded on
    /// the job rather than returned; only failing to start the job is an `Err`.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        job: Option<GenerationJob>,
        cancel: CancellationToken,
    ) -> AppResult<GenerationJob> {
        let mut job = match job {
            Some(job) => job,
            None => self.tracker.start(request.owner).await?,
        };

        match self.run(&request, &mut job, &cancel).await {
            Ok(saved) => {
                tracing::info!(job_id = %job.id, owner = request.owner, saved, "Generation finished");
            }
            Err(AppError::Cancelled) => {
                tracing::info!(job_id = %job.id, owner = request.owner, "Generation superseded, results discarded");
                if !job.is_terminal() {
                    if let Err(e) = self.tracker.cancel(&mut job).await {
                        tracing::debug!(job_id = %job.id, error = %e, "Cancelled job not recorded");
                    }
                }
            }
            Err(e) => {
                if !job.is_terminal() {
                    if let Err(store_err) = self.tracker.fail(&mut job, &e.to_string()).await {
                        tracing::error!(job_id = %job.id, error = %store_err, "Failed to record job failure");
                    }
                }
            }
        }

        Ok(job)
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        job: &mut GenerationJob,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        let owner = request.owner;
        let target = request.target_count.unwrap_or(self.settings.target_count);

        self.checkpoint(job, JobStage::LoadingRatings, cancel).await?;
        let ratings: Vec<_> = self
            .ratings
            .get_ratings(owner)
            .await?
            .into_iter()
            .filter(|r| r.has_valid_rating())
            .collect();
        if ratings.is_empty() {
            return Err(AppError::NoRatings);
        }
        let watched = self.ratings.get_watched_ids(owner).await?;
        let context = Arc::new(build_context(
            ratings,
            watched,
            request.peer_signal.clone(),
            request.avoid.clone(),
        ));
        tracing::info!(
            owner,
            ratings = context.ratings.len(),
            watched = context.watched.len(),
            style = context.profile.style.as_str(),
            "Taste context built"
        );

        self.checkpoint(job, JobStage::FanOut, cancel).await?;
        let fan_out = self
            .fan_out
            .run(Arc::clone(&context), self.settings.proposals_per_source, cancel)
            .await?;

        self.checkpoint(job, JobStage::Collaborative, cancel).await?;
        let collaborative = match &self.collaborative {
            Some(source) => tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                proposals = propose_isolated(
                    source.as_ref(),
                    &context,
                    self.settings.cf_count,
                    self.settings.source_timeout,
                ) => proposals,
            },
            None => Vec::new(),
        };

        self.checkpoint(job, JobStage::Aggregating, cancel).await?;
        let ranked = aggregate(&fan_out.proposals, &collaborative);
        if ranked.is_empty() {
            return Err(AppError::NoProposals);
        }

        self.checkpoint(job, JobStage::Enriching, cancel).await?;
        let mut seen = SeenSet::default();
        let enriched = enrich_ranked(
            self.metadata.as_ref(),
            &ranked,
            target,
            ranked.len(),
            &mut seen,
            cancel,
        )
        .await?;
        let mut recommendations = enriched.recommendations;
        let mut cursor = enriched.inspected;

        self.checkpoint(job, JobStage::Diversity, cancel).await?;
        self.diversity
            .enforce(&context, &mut recommendations, &mut seen, cancel)
            .await?;

        if recommendations.len() < self.settings.min_total {
            let needed = self.settings.min_total - recommendations.len();
            let extra = enrich_ranked(
                self.metadata.as_ref(),
                &ranked[cursor..],
                needed,
                needed * 2,
                &mut seen,
                cancel,
            )
            .await?;
            cursor += extra.inspected;
            recommendations.extend(extra.recommendations);

            if recommendations.len() < self.settings.min_total {
                tracing::warn!(
                    have = recommendations.len(),
                    minimum = self.settings.min_total,
                    inspected = cursor,
                    "Still below the minimum after the shortfall pass"
                );
            }
        }

        let ordered = rank_fill_last(order_watched(recommendations, &context.watched, target));

        self.checkpoint(job, JobStage::Saving, cancel).await?;
        self.recommendations.save_ranked_list(owner, &ordered).await?;

        self.tracker.complete(job).await?;
        Ok(ordered.len())
    }

    async fn checkpoint(
        &self,
        job: &mut GenerationJob,
        stage: JobStage,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        self.tracker.advance(job, stage).await
    }
}

/// Puts unwatched titles first and demotes watched ones
///
/// Watched titles keep their relative order, score half as much and are
/// capped at 40% of `target`.
pub fn order_watched(
    recommendations: Vec<RankedRecommendation>,
    watched: &HashSet<TitleId>,
    target: usize,
) -> Vec<RankedRecommendation> {
    let cap = (target as f64 * WATCHED_SHARE) as usize;
    let (unwatched, rewatched): (Vec<_>, Vec<_>) = recommendations
        .into_iter()
        .partition(|r| !watched.contains(&r.metadata.external_id));

    let mut ordered = unwatched;
    ordered.extend(rewatched.into_iter().take(cap).map(|mut r| {
        r.score *= WATCHED_SCORE_FACTOR;
        r
    }));
    ordered
}

/// Moves backfilled titles below every organically ranked one
///
/// Fill keeps its relative order and is rescored under the weakest organic
/// score, so list position and score agree.
pub fn rank_fill_last(recommendations: Vec<RankedRecommendation>) -> Vec<RankedRecommendation> {
    let (organic, fill): (Vec<_>, Vec<_>) = recommendations.into_iter().partition(|r| !r.fill);
    let weakest = organic.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);

    let mut ordered = organic;
    ordered.extend(fill.into_iter().map(|mut r| {
        if weakest.is_finite() {
            r.score = r.score.min(weakest * FILL_SCORE_FACTOR);
        }
        r
    }));
    ordered
}
