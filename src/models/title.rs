use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// External identifier for a movie
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TitleId {
    /// TMDB numeric ID
    Tmdb(u64),
    /// IMDB ID (e.g., "tt1375666")
    Imdb(String),
}

impl Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TitleId::Tmdb(id) => write!(f, "tmdb:{}", id),
            TitleId::Imdb(id) => write!(f, "imdb:{}", id),
        }
    }
}

impl std::str::FromStr for TitleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("tmdb", id)) => id
                .parse::<u64>()
                .map(TitleId::Tmdb)
                .map_err(|e| format!("invalid tmdb id '{}': {}", id, e)),
            Some(("imdb", id)) if !id.is_empty() => Ok(TitleId::Imdb(id.to_string())),
            _ => Err(format!("unrecognised title id '{}'", s)),
        }
    }
}

/// One provider entry in a streaming section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderLink {
    pub name: String,
    pub logo: Option<String>,
}

/// US streaming availability grouped by offer type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamingProviders {
    pub subscription: Vec<ProviderLink>,
    pub rent: Vec<ProviderLink>,
    pub buy: Vec<ProviderLink>,
}

impl StreamingProviders {
    pub fn is_empty(&self) -> bool {
        self.subscription.is_empty() && self.rent.is_empty() && self.buy.is_empty()
    }
}

/// Catalog metadata resolved for a recommended title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieMetadata {
    pub external_id: TitleId,
    pub imdb_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub poster_url: Option<String>,
    pub overview: String,
    pub streaming: StreamingProviders,
    pub vote_average: Option<f32>,
}

impl MovieMetadata {
    /// Case-sensitive genre membership, matching catalog genre names
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }
}

/// An item from the candidate pool used for collaborative filtering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub external_id: TitleId,
    pub title: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
}
