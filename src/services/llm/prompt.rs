//! Prompt rendering shared by every advisor vendor.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{RatedItem, TasteContext, TasteProfile};

const MAX_PER_BUCKET: usize = 15;
const MAX_LISTED_GENRES: usize = 3;
const TOP_FAVOURITES: usize = 10;

pub const SYSTEM_PROMPT: &str =
    "You are a movie recommendation expert. Analyze user preferences and suggest films they'll love.";

const DIVERSITY_INSTRUCTION: &str = "IMPORTANT: Ensure GENRE DIVERSITY - include at least 3-4 movies from EACH of these genres:
- Action (including thrillers with action)
- Comedy (including dark comedy, romantic comedy)
- Drama (character-driven stories)
- Sci-Fi/Fantasy
- Horror/Thriller
- Romance";

const RESPONSE_FORMAT: &str = r#"Format as JSON array:
[
  {
    "title": "Movie Title",
    "year": 2023,
    "reasoning": "You'll love this because...",
    "streaming": "Netflix, Prime Video",
    "genres": ["Drama", "Thriller"]
  }
]

Return only the JSON array, no other text."#;

/// Ratings grouped by score, highest first, one line per title
pub fn format_ratings(ratings: &[RatedItem]) -> String {
    if ratings.is_empty() {
        return "No ratings provided.".to_string();
    }

    // Half-star ratings keyed in tenths so they order exactly
    let mut buckets: BTreeMap<i32, Vec<&RatedItem>> = BTreeMap::new();
    for item in ratings {
        buckets
            .entry((item.rating * 10.0).round() as i32)
            .or_default()
            .push(item);
    }

    let mut out = String::new();
    for (tenths, items) in buckets.iter().rev() {
        let _ = writeln!(out, "\n{:.1}★:", *tenths as f32 / 10.0);
        for item in items.iter().take(MAX_PER_BUCKET) {
            let year = item
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let genres = item
                .genres
                .iter()
                .take(MAX_LISTED_GENRES)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "  - {} ({}) [{}]", item.title, year, genres);
        }
    }
    out
}

fn format_profile(profile: &TasteProfile) -> String {
    if profile.total == 0 {
        return String::new();
    }

    let mut out = format!(
        "Taste profile: {} ratings, average {:.2} (std dev {:.2}), a {} rater.\n",
        profile.total,
        profile.avg_rating,
        profile.std_dev,
        profile.style.as_str()
    );

    if !profile.genre_averages.is_empty() {
        let genres = profile
            .genre_averages
            .iter()
            .take(8)
            .map(|(genre, avg)| format!("{} {:.1}", genre, avg))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "Genre averages: {}", genres);
    }
    if !profile.disliked_genres.is_empty() {
        let _ = writeln!(
            out,
            "Genres I tend to rate poorly: {}",
            profile.disliked_genres.join(", ")
        );
    }
    if !profile.low_rated_examples.is_empty() {
        let _ = writeln!(
            out,
            "Examples I disliked: {}",
            profile.low_rated_examples.join(", ")
        );
    }
    out
}

/// Full advisor prompt for a general recommendation request
pub fn build(context: &TasteContext, count: usize) -> String {
    if let Some(focus) = &context.focus {
        return build_focused(context, &focus.category, &focus.exclude_titles, count);
    }

    let mut prompt = format!(
        "Based on these Letterboxd ratings:\n{}\nMy top favorites: {}\n\n",
        format_ratings(&context.ratings),
        context.top_titles(TOP_FAVOURITES).join(", ")
    );

    let profile = format_profile(&context.profile);
    if !profile.is_empty() {
        prompt.push_str(&profile);
        prompt.push('\n');
    }
    if let Some(peer) = &context.peer_signal {
        let _ = writeln!(prompt, "Friends with similar taste enjoyed: {}\n", peer);
    }
    if !context.avoid.is_empty() {
        let _ = writeln!(
            prompt,
            "Do NOT recommend any of these: {}\n",
            context.avoid.join(", ")
        );
    }

    let _ = write!(
        prompt,
        "Please recommend {} movies I haven't seen that I would likely enjoy.\n\n{}\n\n\
         Consider:\n\
         1. Recent acclaimed films in similar genres\n\
         2. Hidden gems and cult classics that match my taste\n\
         3. Movies from different eras that share themes with my favorites\n\
         4. International cinema that fits my preferences\n\n\
         For each movie, provide:\n\
         - Title (Year)\n\
         - One sentence explaining why I'd like it based on my rating patterns\n\
         - Streaming availability if known (e.g., \"Netflix\", \"Prime Video\", \"Max\")\n\
         - Its main genres\n\n\
         PRIORITIZE GENRE DIVERSITY while matching my taste.\n\n{}",
        count, DIVERSITY_INSTRUCTION, RESPONSE_FORMAT
    );
    prompt
}

/// Narrow prompt asking for titles in a single category
fn build_focused(
    context: &TasteContext,
    category: &str,
    exclude_titles: &[String],
    count: usize,
) -> String {
    let mut prompt = format!(
        "Based on these movie ratings:\n{}\nMy top favorites: {}\n\n\
         Recommend exactly {} {} movies I would enjoy.\n\
         Every movie MUST be primarily a {} film.\n",
        format_ratings(&context.ratings),
        context.top_titles(TOP_FAVOURITES).join(", "),
        count,
        category,
        category
    );

    let excluded: Vec<&str> = exclude_titles
        .iter()
        .chain(context.avoid.iter())
        .map(String::as_str)
        .collect();
    if !excluded.is_empty() {
        let _ = writeln!(prompt, "Do NOT recommend any of these: {}", excluded.join(", "));
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}
