use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{MovieMetadata, Proposal, SourceId, TitleId};

/// Case-folds a title and strips punctuation so spelling variants share a key
///
/// "Spider-Man: Across the Spider-Verse" and "spiderman across the spiderverse"
/// normalize identically. Whitespace runs collapse to a single space.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity of a candidate across sources: normalized title plus release year
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MergeKey {
    pub title: String,
    pub year: Option<i32>,
}

impl MergeKey {
    pub fn new(title: &str, year: Option<i32>) -> Self {
        Self {
            title: normalize_title(title),
            year,
        }
    }

    pub fn of(proposal: &Proposal) -> Self {
        Self::new(&proposal.title, proposal.year)
    }
}

impl Display for MergeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({})", self.title, year),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Merged, weighted unit produced by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub key: MergeKey,
    pub title: String,
    pub year: Option<i32>,
    pub score: f64,
    pub sources: Vec<SourceId>,
    pub rationales: Vec<String>,
    pub external_id: Option<TitleId>,
    pub streaming_hint: Option<String>,
}

impl ScoredCandidate {
    /// Starts an empty candidate for the proposal's identity
    pub fn seed(proposal: &Proposal) -> Self {
        Self {
            key: MergeKey::of(proposal),
            title: proposal.title.clone(),
            year: proposal.year,
            score: 0.0,
            sources: Vec::new(),
            rationales: Vec::new(),
            external_id: None,
            streaming_hint: None,
        }
    }

    /// Folds one proposal into this candidate with the given source weight
    ///
    /// A source counts once per candidate; rationales are kept in arrival
    /// order without duplicates.
    pub fn absorb(&mut self, proposal: &Proposal, weight: f64) {
        self.score += weight;

        if !self.sources.contains(&proposal.source) {
            self.sources.push(proposal.source);
        }

        let rationale = proposal.rationale.trim();
        if !rationale.is_empty() && !self.rationales.iter().any(|r| r == rationale) {
            self.rationales.push(rationale.to_string());
        }

        if self.external_id.is_none() {
            self.external_id = proposal.external_id.clone();
        }
        if self.streaming_hint.is_none() {
            self.streaming_hint = proposal.streaming_hint.clone();
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// A fully resolved recommendation ready to persist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedRecommendation {
    pub metadata: MovieMetadata,
    pub score: f64,
    pub sources: Vec<SourceId>,
    pub rationales: Vec<String>,
    /// True when added by the diversity backfill rather than aggregation
    pub fill: bool,
}

impl RankedRecommendation {
    pub fn from_candidate(candidate: &ScoredCandidate, metadata: MovieMetadata) -> Self {
        Self {
            metadata,
            score: candidate.score,
            sources: candidate.sources.clone(),
            rationales: candidate.rationales.clone(),
            fill: false,
        }
    }

    /// Source recorded against the persisted row
    pub fn primary_source(&self) -> String {
        self.sources
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn primary_rationale(&self) -> &str {
        self.rationales.first().map(String::as_str).unwrap_or("")
    }

    /// Lower-cased title used for duplicate detection
    pub fn title_key(&self) -> String {
        self.metadata.title.to_lowercase()
    }
}
