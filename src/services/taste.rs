//! Derives the taste profile and assembles the context handed to sources.

use std::collections::{BTreeMap, HashSet};

use crate::models::{RatedItem, RatingStyle, TasteContext, TasteProfile, TitleId};

const FAVOURITE_THRESHOLD: f32 = 4.0;
const MAX_FAVOURITES: usize = 15;
const LOW_RATING_THRESHOLD: f32 = 2.5;
const MIN_GENRE_SAMPLES: usize = 3;
const MAX_LOW_EXAMPLES: usize = 5;

/// Summarises a rating history
///
/// Ratings outside the valid scale are ignored.
pub fn build_profile(ratings: &[RatedItem]) -> TasteProfile {
    let valid: Vec<&RatedItem> = ratings.iter().filter(|r| r.has_valid_rating()).collect();
    if valid.is_empty() {
        return TasteProfile::empty();
    }

    let n = valid.len() as f32;
    let avg = valid.iter().map(|r| r.rating).sum::<f32>() / n;
    let variance = valid.iter().map(|r| (r.rating - avg).powi(2)).sum::<f32>() / n;

    let mut per_genre: BTreeMap<&str, Vec<f32>> = BTreeMap::new();
    for item in &valid {
        for genre in &item.genres {
            per_genre.entry(genre.as_str()).or_default().push(item.rating);
        }
    }
    let mut genre_averages: Vec<(String, f32)> = per_genre
        .into_iter()
        .filter(|(_, scores)| scores.len() >= MIN_GENRE_SAMPLES)
        .map(|(genre, scores)| {
            let mean = scores.iter().sum::<f32>() / scores.len() as f32;
            (genre.to_string(), round2(mean))
        })
        .collect();
    genre_averages.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut favourites: Vec<RatedItem> = valid
        .iter()
        .filter(|r| r.rating >= FAVOURITE_THRESHOLD)
        .map(|r| (*r).clone())
        .collect();
    favourites.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    favourites.truncate(MAX_FAVOURITES);

    let (disliked_genres, low_rated_examples) = anti_preferences(&valid);

    TasteProfile {
        total: valid.len(),
        avg_rating: round2(avg),
        std_dev: round2(variance.sqrt()),
        style: RatingStyle::from_average(avg),
        genre_averages,
        favourites,
        disliked_genres,
        low_rated_examples,
    }
}

/// Genres common among low-rated items, plus the worst-rated examples
fn anti_preferences(valid: &[&RatedItem]) -> (Vec<String>, Vec<String>) {
    let mut low: Vec<&RatedItem> = valid
        .iter()
        .copied()
        .filter(|r| r.rating <= LOW_RATING_THRESHOLD)
        .collect();
    if low.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in &low {
        for genre in &item.genres {
            *counts.entry(genre.as_str()).or_default() += 1;
        }
    }
    let total = low.len() as f32;
    let disliked = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2 && *count as f32 / total >= 0.3)
        .map(|(genre, _)| genre.to_string())
        .collect();

    low.sort_by(|a, b| a.rating.total_cmp(&b.rating));
    let examples = low
        .iter()
        .take(MAX_LOW_EXAMPLES)
        .map(|r| format!("{} ({:.1}★)", r.title, r.rating))
        .collect();

    (disliked, examples)
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Bundles everything an opinion source sees for one run
pub fn build_context(
    ratings: Vec<RatedItem>,
    watched: HashSet<TitleId>,
    peer_signal: Option<String>,
    avoid: Vec<String>,
) -> TasteContext {
    let profile = build_profile(&ratings);
    TasteContext {
        ratings,
        profile,
        watched,
        peer_signal: peer_signal.filter(|p| !p.trim().is_empty()),
        avoid,
        focus: None,
    }
}
