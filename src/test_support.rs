//! Builders shared by unit tests across modules.

use std::collections::HashSet;

use crate::models::{
    MovieMetadata, RatedItem, StreamingProviders, TasteContext, TasteProfile, TitleId,
};

pub(crate) fn empty_context() -> TasteContext {
    TasteContext {
        ratings: Vec::new(),
        profile: TasteProfile::empty(),
        watched: HashSet::new(),
        peer_signal: None,
        avoid: Vec::new(),
        focus: None,
    }
}

pub(crate) fn rated(id: u64, title: &str, genres: &[&str], rating: f32) -> RatedItem {
    RatedItem {
        item_id: TitleId::Tmdb(id),
        title: title.to_string(),
        year: Some(2000),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        rating,
        watched_at: None,
    }
}

pub(crate) fn metadata(id: u64, title: &str, genres: &[&str]) -> MovieMetadata {
    MovieMetadata {
        external_id: TitleId::Tmdb(id),
        imdb_id: None,
        title: title.to_string(),
        year: Some(2000),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        poster_url: None,
        overview: String::new(),
        streaming: StreamingProviders::default(),
        vote_average: None,
    }
}
