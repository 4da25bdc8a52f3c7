/// Catalog data providers
///
/// The pipeline consumes two capabilities from a movie catalog: resolving a
/// recommended title to full metadata (enrichment, diversity backfill) and
/// listing a pool of popular candidates (collaborative filtering). TMDB
/// implements both.
use crate::{
    error::AppResult,
    models::{CandidateItem, MovieMetadata, TitleId},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Resolves titles to catalog metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search by title (and year when known); `None` when the catalog has no match
    async fn resolve(&self, title: &str, year: Option<i32>) -> AppResult<Option<MovieMetadata>>;

    /// Direct lookup by external id; `None` when the id is unknown
    async fn details(&self, id: &TitleId) -> AppResult<Option<MovieMetadata>>;
}

/// Supplies candidates for the collaborative model to rank
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CandidatePool: Send + Sync {
    async fn popular_candidates(&self, page: u32) -> AppResult<Vec<CandidateItem>>;
}
