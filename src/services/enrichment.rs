//! Resolves ranked candidates to catalog metadata.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{MovieMetadata, RankedRecommendation, ScoredCandidate, TitleId},
    services::providers::MetadataProvider,
};

/// Titles and ids already placed in the final list
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    ids: HashSet<TitleId>,
    titles: HashSet<String>,
}

impl SeenSet {
    pub fn contains(&self, metadata: &MovieMetadata) -> bool {
        self.ids.contains(&metadata.external_id)
            || self.titles.contains(&metadata.title.to_lowercase())
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.titles.contains(&title.to_lowercase())
    }

    /// Records the item; false when it was already present
    pub fn insert(&mut self, metadata: &MovieMetadata) -> bool {
        if self.contains(metadata) {
            return false;
        }
        self.ids.insert(metadata.external_id.clone());
        self.titles.insert(metadata.title.to_lowercase());
        true
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct EnrichOutcome {
    pub recommendations: Vec<RankedRecommendation>,
    /// How many candidates from the front of the slice were looked at
    pub inspected: usize,
}

/// Looks up one title: direct details when the id is known, search otherwise
pub async fn lookup(
    provider: &dyn MetadataProvider,
    title: &str,
    year: Option<i32>,
    external_id: Option<&TitleId>,
) -> AppResult<Option<MovieMetadata>> {
    match external_id {
        Some(id) => provider.details(id).await,
        None => provider.resolve(title, year).await,
    }
}

/// Enriches candidates in rank order until `want` are resolved
///
/// At most `max_inspect` candidates are tried. Unresolvable candidates and
/// lookup errors are skipped, as are items whose title or id is already in
/// `seen`.
pub async fn enrich_ranked(
    provider: &dyn MetadataProvider,
    candidates: &[ScoredCandidate],
    want: usize,
    max_inspect: usize,
    seen: &mut SeenSet,
    cancel: &CancellationToken,
) -> AppResult<EnrichOutcome> {
    let mut outcome = EnrichOutcome::default();

    for candidate in candidates.iter().take(max_inspect) {
        if outcome.recommendations.len() >= want {
            break;
        }
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        outcome.inspected += 1;

        let found = lookup(
            provider,
            &candidate.title,
            candidate.year,
            candidate.external_id.as_ref(),
        )
        .await;

        match found {
            Ok(Some(metadata)) => {
                if seen.insert(&metadata) {
                    outcome
                        .recommendations
                        .push(RankedRecommendation::from_candidate(candidate, metadata));
                } else {
                    tracing::debug!(title = %candidate.title, "Duplicate after enrichment, skipping");
                }
            }
            Ok(None) => {
                tracing::debug!(title = %candidate.title, year = ?candidate.year, "Not found in catalog, skipping");
            }
            Err(e) => {
                tracing::debug!(title = %candidate.title, error = %e, "Enrichment lookup failed, skipping");
            }
        }
    }

    tracing::info!(
        enriched = outcome.recommendations.len(),
        inspected = outcome.inspected,
        "Enrichment pass complete"
    );
    Ok(outcome)
}
