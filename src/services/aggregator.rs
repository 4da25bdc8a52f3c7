//! Weighted consensus aggregation of proposals into ranked candidates.

use std::collections::{BTreeMap, HashMap};

use crate::models::{MergeKey, Proposal, ScoredCandidate, SourceId};

/// Weight shared by all advisors that responded in a run
pub const LLM_BUDGET: f64 = 0.80;
/// Fixed weight of the collaborative model
pub const CF_WEIGHT: f64 = 0.20;
/// Added per distinct source beyond the first
pub const CONSENSUS_BONUS: f64 = 0.10;

/// Per-source weights for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    per_advisor: f64,
    active: Vec<SourceId>,
}

impl Weights {
    /// Splits [`LLM_BUDGET`] evenly across advisors that returned a usable title
    pub fn for_run(fan_out: &BTreeMap<SourceId, Vec<Proposal>>) -> Self {
        let active: Vec<SourceId> = fan_out
            .iter()
            .filter(|(id, proposals)| id.is_advisor() && proposals.iter().any(has_title))
            .map(|(id, _)| *id)
            .collect();

        let per_advisor = if active.is_empty() {
            0.0
        } else {
            LLM_BUDGET / active.len() as f64
        };

        Self {
            per_advisor,
            active,
        }
    }

    pub fn weight(&self, source: SourceId) -> f64 {
        match source {
            SourceId::Advisor(_) if self.active.contains(&source) => self.per_advisor,
            SourceId::Advisor(_) => 0.0,
            SourceId::Collaborative => CF_WEIGHT,
            SourceId::GenreFill(_) => 0.0,
        }
    }

    pub fn per_advisor(&self) -> f64 {
        self.per_advisor
    }

    pub fn active_advisors(&self) -> &[SourceId] {
        &self.active
    }

    /// Sum of advisor weights; equals the budget whenever any advisor responded
    pub fn advisor_total(&self) -> f64 {
        self.per_advisor * self.active.len() as f64
    }
}

/// Folds every proposal into one candidate per merge key and ranks them
///
/// Scores are the sum of source weights plus the consensus bonus; ties go to
/// the candidate with more distinct sources. Nothing is truncated here.
pub fn aggregate(
    fan_out: &BTreeMap<SourceId, Vec<Proposal>>,
    collaborative: &[Proposal],
) -> Vec<ScoredCandidate> {
    let weights = Weights::for_run(fan_out);
    tracing::info!(
        active_advisors = weights.active_advisors().len(),
        per_advisor = weights.per_advisor(),
        "Aggregating proposals"
    );

    let mut index: HashMap<MergeKey, usize> = HashMap::new();
    let mut candidates: Vec<ScoredCandidate> = Vec::new();

    let all = fan_out
        .values()
        .flatten()
        .chain(collaborative.iter())
        .filter(|p| has_title(p));

    for proposal in all {
        let key = MergeKey::of(proposal);
        let slot = *index.entry(key).or_insert_with(|| {
            candidates.push(ScoredCandidate::seed(proposal));
            candidates.len() - 1
        });
        candidates[slot].absorb(proposal, weights.weight(proposal.source));
    }

    for candidate in candidates.iter_mut() {
        let extra = candidate.source_count().saturating_sub(1);
        if extra > 0 {
            candidate.score += extra as f64 * CONSENSUS_BONUS;
            tracing::debug!(
                title = %candidate.title,
                sources = candidate.source_count(),
                "Consensus bonus applied"
            );
        }
    }

    rank(&mut candidates);

    if let Some(top) = candidates.first() {
        tracing::info!(
            unique = candidates.len(),
            top_title = %top.title,
            top_score = top.score,
            "Aggregation complete"
        );
    }
    candidates
}

fn has_title(proposal: &Proposal) -> bool {
    !proposal.title.trim().is_empty()
}

/// Stable sort by score, then distinct-source count, both descending
fn rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.source_count().cmp(&a.source_count()))
    });
}
