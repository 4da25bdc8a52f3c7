//! Per-category minimums for the final list.
//!
//! Categories below the minimum are backfilled from the genre-fill source,
//! scoped to the category and excluding titles already selected. Backfilled
//! items carry [`FILL_SCORE`] and are marked as fill; the saved list ranks
//! them below every organic item.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{RankedRecommendation, TasteContext},
    services::{
        enrichment::{lookup, SeenSet},
        providers::MetadataProvider,
        sources::{propose_isolated, OpinionSource},
    },
};

pub const TARGET_CATEGORIES: [&str; 6] = [
    "Action",
    "Comedy",
    "Drama",
    "Science Fiction",
    "Horror",
    "Romance",
];

/// Provisional score of backfilled items, capped under organic scores before saving
pub const FILL_SCORE: f64 = 0.5;
/// Fill requests per category before giving up
pub const MAX_FILL_ROUNDS: usize = 2;
/// Extra proposals requested beyond the gap, to absorb misses and duplicates
const FILL_HEADROOM: usize = 5;

/// Categories under `minimum` with how many items each still needs
pub fn category_shortfalls(
    recommendations: &[RankedRecommendation],
    minimum: usize,
) -> Vec<(&'static str, usize)> {
    TARGET_CATEGORIES
        .iter()
        .filter_map(|category| {
            let count = count_in(recommendations, category);
            (count < minimum).then(|| (*category, minimum - count))
        })
        .collect()
}

fn count_in(recommendations: &[RankedRecommendation], category: &str) -> usize {
    recommendations
        .iter()
        .filter(|r| r.metadata.has_genre(category))
        .count()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiversityReport {
    pub added: usize,
    /// Categories still under the minimum after all rounds
    pub unmet: Vec<String>,
}

pub struct DiversityEnforcer {
    fill: Option<Arc<dyn OpinionSource>>,
    provider: Arc<dyn MetadataProvider>,
    min_per_category: usize,
    timeout: Duration,
}

impl DiversityEnforcer {
    pub fn new(
        fill: Option<Arc<dyn OpinionSource>>,
        provider: Arc<dyn MetadataProvider>,
        min_per_category: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            fill,
            provider,
            min_per_category,
            timeout,
        }
    }

    /// Backfills under-represented categories in place
    ///
    /// Hitting the round ceiling leaves the category short and is logged; it is
    /// not an error. Only cancellation is surfaced.
    pub async fn enforce(
        &self,
        context: &TasteContext,
        recommendations: &mut Vec<RankedRecommendation>,
        seen: &mut SeenSet,
        cancel: &CancellationToken,
    ) -> AppResult<DiversityReport> {
        let mut report = DiversityReport::default();
        let shortfalls = category_shortfalls(recommendations, self.min_per_category);

        if shortfalls.is_empty() {
            tracing::info!("All target categories meet the minimum");
            return Ok(report);
        }

        for (category, initial_need) in shortfalls {
            tracing::info!(category, needed = initial_need, "Category under minimum");

            let Some(fill) = &self.fill else {
                tracing::warn!(category, "No genre-fill source configured, category left short");
                report.unmet.push(category.to_string());
                continue;
            };

            for round in 1..=MAX_FILL_ROUNDS {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                let needed = self
                    .min_per_category
                    .saturating_sub(count_in(recommendations, category));
                if needed == 0 {
                    break;
                }

                let added = self
                    .fill_round(fill.as_ref(), context, category, needed, recommendations, seen)
                    .await;
                report.added += added;
                tracing::debug!(category, round, added, "Genre fill round finished");
            }

            let count = count_in(recommendations, category);
            if count < self.min_per_category {
                tracing::warn!(
                    category,
                    count,
                    minimum = self.min_per_category,
                    rounds = MAX_FILL_ROUNDS,
                    "Category still under minimum after fill rounds"
                );
                report.unmet.push(category.to_string());
            }
        }

        tracing::info!(added = report.added, unmet = ?report.unmet, "Diversity pass complete");
        Ok(report)
    }

    async fn fill_round(
        &self,
        fill: &dyn OpinionSource,
        context: &TasteContext,
        category: &str,
        needed: usize,
        recommendations: &mut Vec<RankedRecommendation>,
        seen: &mut SeenSet,
    ) -> usize {
        let exclude = recommendations
            .iter()
            .map(|r| r.metadata.title.clone())
            .collect();
        let focused = context.focused(category, exclude);
        let proposals =
            propose_isolated(fill, &focused, needed + FILL_HEADROOM, self.timeout).await;

        let mut added = 0;
        for proposal in proposals {
            if added >= needed {
                break;
            }
            if seen.contains_title(&proposal.title) {
                continue;
            }

            let metadata = match lookup(
                self.provider.as_ref(),
                &proposal.title,
                proposal.year,
                proposal.external_id.as_ref(),
            )
            .await
            {
                Ok(Some(metadata)) => metadata,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(title = %proposal.title, error = %e, "Fill lookup failed");
                    continue;
                }
            };

            if !metadata.has_genre(category) || !seen.insert(&metadata) {
                continue;
            }

            let rationales = if proposal.rationale.trim().is_empty() {
                Vec::new()
            } else {
                vec![proposal.rationale.clone()]
            };
            recommendations.push(RankedRecommendation {
                metadata,
                score: FILL_SCORE,
                sources: vec![proposal.source],
                rationales,
                fill: true,
            });
            added += 1;
        }
        added
    }
}
