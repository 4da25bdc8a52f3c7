use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::TitleId;

pub const MIN_RATING: f32 = 0.5;
pub const MAX_RATING: f32 = 5.0;

/// A historical rating recorded by the owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatedItem {
    pub item_id: TitleId,
    pub title: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub rating: f32,
    pub watched_at: Option<NaiveDate>,
}

impl RatedItem {
    /// Returns true when the rating lies on the half-star scale bounds
    pub fn has_valid_rating(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}
