use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{RatedItem, TitleId};

/// How generously the owner rates overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingStyle {
    Generous,
    Balanced,
    Selective,
    Harsh,
    Unknown,
}

impl RatingStyle {
    pub fn from_average(avg: f32) -> Self {
        if avg >= 4.2 {
            RatingStyle::Generous
        } else if avg >= 3.8 {
            RatingStyle::Balanced
        } else if avg >= 3.4 {
            RatingStyle::Selective
        } else {
            RatingStyle::Harsh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RatingStyle::Generous => "generous",
            RatingStyle::Balanced => "balanced",
            RatingStyle::Selective => "selective",
            RatingStyle::Harsh => "harsh",
            RatingStyle::Unknown => "unknown",
        }
    }
}

/// Preference summary derived from rating history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TasteProfile {
    pub total: usize,
    pub avg_rating: f32,
    pub std_dev: f32,
    pub style: RatingStyle,
    /// Genres ordered by average rating, highest first
    pub genre_averages: Vec<(String, f32)>,
    pub favourites: Vec<RatedItem>,
    pub disliked_genres: Vec<String>,
    pub low_rated_examples: Vec<String>,
}

impl TasteProfile {
    pub fn empty() -> Self {
        Self {
            total: 0,
            avg_rating: 0.0,
            std_dev: 0.0,
            style: RatingStyle::Unknown,
            genre_averages: Vec::new(),
            favourites: Vec::new(),
            disliked_genres: Vec::new(),
            low_rated_examples: Vec::new(),
        }
    }
}

/// Restricts a request to one category, excluding titles already chosen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryFocus {
    pub category: String,
    pub exclude_titles: Vec<String>,
}

/// Everything an opinion source may consult about the owner's taste
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TasteContext {
    pub ratings: Vec<RatedItem>,
    pub profile: TasteProfile,
    pub watched: HashSet<TitleId>,
    /// Free-text signal from friends or curated taste profiles
    pub peer_signal: Option<String>,
    /// Explicit titles or themes the owner does not want
    pub avoid: Vec<String>,
    pub focus: Option<CategoryFocus>,
}

impl TasteContext {
    /// Same context narrowed to a single category
    pub fn focused(&self, category: &str, exclude_titles: Vec<String>) -> Self {
        Self {
            focus: Some(CategoryFocus {
                category: category.to_string(),
                exclude_titles,
            }),
            ..self.clone()
        }
    }

    /// Titles of the best-rated items, highest first
    pub fn top_titles(&self, limit: usize) -> Vec<String> {
        let mut sorted: Vec<&RatedItem> = self.ratings.iter().collect();
        sorted.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        sorted
            .into_iter()
            .take(limit)
            .map(|r| r.title.clone())
            .collect()
    }
}
