//! Statistical opinion source: ranks the popular pool by predicted rating.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{CandidateItem, Proposal, SourceId, TasteContext, TitleId},
    services::{providers::CandidatePool, sources::OpinionSource},
};

mod model;

pub use model::{FitOptions, LatentFactorModel, MIN_RATINGS};

const POOL_PAGES: [u32; 2] = [1, 2];

pub struct CollaborativeSource {
    pool: Arc<dyn CandidatePool>,
    options: FitOptions,
}

impl CollaborativeSource {
    pub fn new(pool: Arc<dyn CandidatePool>) -> Self {
        Self {
            pool,
            options: FitOptions::default(),
        }
    }

    async fn load_pool(&self) -> AppResult<Vec<CandidateItem>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for page in POOL_PAGES {
            for item in self.pool.popular_candidates(page).await? {
                if seen.insert(item.external_id.clone()) {
                    candidates.push(item);
                }
            }
        }
        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl OpinionSource for CollaborativeSource {
    fn id(&self) -> SourceId {
        SourceId::Collaborative
    }

    async fn try_propose(&self, context: &TasteContext, count: usize) -> AppResult<Vec<Proposal>> {
        let Some(model) = LatentFactorModel::fit(&context.ratings, self.options) else {
            tracing::info!(
                ratings = context.ratings.len(),
                required = MIN_RATINGS,
                "Not enough ratings for collaborative filtering"
            );
            return Ok(Vec::new());
        };

        let excluded: HashSet<&TitleId> = context
            .ratings
            .iter()
            .map(|r| &r.item_id)
            .chain(context.watched.iter())
            .collect();

        let pool = self.load_pool().await?;
        let mut scored: Vec<(f32, CandidateItem)> = pool
            .into_iter()
            .filter(|c| !excluded.contains(&c.external_id))
            .map(|c| (model.predict(&c.genres), c))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        if let Some((score, top)) = scored.first() {
            tracing::debug!(title = %top.title, predicted = score, "Top collaborative prediction");
        }

        Ok(scored
            .into_iter()
            .take(count)
            .map(|(predicted, item)| {
                Proposal::new(SourceId::Collaborative, item.title, item.year)
                    .with_external_id(item.external_id)
                    .with_categories(item.genres)
                    .with_rationale(format!(
                        "Predicted rating: {:.1}/5.0 based on your preferences",
                        predicted
                    ))
            })
            .collect())
    }
}
