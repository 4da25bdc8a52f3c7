/// TMDB provider
///
/// Resolves recommended titles to metadata and supplies the popular-movie
/// candidate pool.
///
/// API Flow:
/// 1. Search: /search/movie → first result's TMDB ID
/// 2. Details: /movie/{id}?append_to_response=watch/providers → genres, poster, US providers
/// 3. Pool: /movie/popular?page=N → listings with genre IDs
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{CandidateItem, MovieMetadata, ProviderLink, StreamingProviders, TitleId},
    services::providers::{CandidatePool, MetadataProvider},
};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

const SEARCH_CACHE_TTL: u64 = 86400; // 1 day
const DETAILS_CACHE_TTL: u64 = 2592000; // 30 days
const POPULAR_CACHE_TTL: u64 = 86400; // 1 day
const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";
const LOGO_BASE_URL: &str = "https://image.tmdb.org/t/p/original";
const PROVIDER_REGION: &str = "US";

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Option<Cache>,
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default)]
    results: Vec<TmdbListing>,
}

#[derive(Debug, Clone, Deserialize)]
struct TmdbListing {
    id: u64,
    title: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    genre_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<TmdbListing>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    id: u64,
    title: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    vote_average: Option<f32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(rename = "watch/providers", default)]
    watch_providers: Option<WatchProviders>,
}

#[derive(Debug, Deserialize)]
struct WatchProviders {
    #[serde(default)]
    results: HashMap<String, RegionProviders>,
}

#[derive(Debug, Default, Deserialize)]
struct RegionProviders {
    #[serde(default)]
    flatrate: Vec<TmdbProviderEntry>,
    #[serde(default)]
    rent: Vec<TmdbProviderEntry>,
    #[serde(default)]
    buy: Vec<TmdbProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct TmdbProviderEntry {
    provider_name: String,
    #[serde(default)]
    logo_path: Option<String>,
}

/// Maps TMDB's fixed movie genre IDs to their display names
fn genre_name(id: u32) -> Option<&'static str> {
    let name = match id {
        28 => "Action",
        12 => "Adventure",
        16 => "Animation",
        35 => "Comedy",
        80 => "Crime",
        99 => "Documentary",
        18 => "Drama",
        10751 => "Family",
        14 => "Fantasy",
        36 => "History",
        27 => "Horror",
        10402 => "Music",
        9648 => "Mystery",
        10749 => "Romance",
        878 => "Science Fiction",
        10770 => "TV Movie",
        53 => "Thriller",
        10752 => "War",
        37 => "Western",
        _ => return None,
    };
    Some(name)
}

/// Extracts the year from a "YYYY-MM-DD" release date; empty strings yield None
fn release_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

fn provider_links(entries: Vec<TmdbProviderEntry>) -> Vec<ProviderLink> {
    entries
        .into_iter()
        .map(|p| ProviderLink {
            name: p.provider_name,
            logo: p.logo_path.map(|path| format!("{}{}", LOGO_BASE_URL, path)),
        })
        .collect()
}

impl From<TmdbMovie> for MovieMetadata {
    fn from(movie: TmdbMovie) -> Self {
        let region = movie
            .watch_providers
            .and_then(|mut w| w.results.remove(PROVIDER_REGION))
            .unwrap_or_default();

        MovieMetadata {
            external_id: TitleId::Tmdb(movie.id),
            imdb_id: movie.imdb_id.filter(|id| !id.is_empty()),
            title: movie.title,
            year: release_year(movie.release_date.as_deref()),
            genres: movie.genres.into_iter().map(|g| g.name).collect(),
            poster_url: movie
                .poster_path
                .map(|path| format!("{}{}", IMAGE_BASE_URL, path)),
            overview: movie.overview.unwrap_or_default(),
            streaming: StreamingProviders {
                subscription: provider_links(region.flatrate),
                rent: provider_links(region.rent),
                buy: provider_links(region.buy),
            },
            vote_average: movie.vote_average.map(|v| (v * 10.0).round() / 10.0),
        }
    }
}

impl From<TmdbListing> for CandidateItem {
    fn from(listing: TmdbListing) -> Self {
        CandidateItem {
            external_id: TitleId::Tmdb(listing.id),
            year: release_year(listing.release_date.as_deref()),
            title: listing.title,
            genres: listing
                .genre_ids
                .into_iter()
                .filter_map(genre_name)
                .map(str::to_string)
                .collect(),
        }
    }
}

impl TmdbProvider {
    pub fn new(http_client: HttpClient, cache: Option<Cache>, api_key: String, api_url: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            cache,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<Option<T>> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(Some(response.json().await?))
    }

    async fn fetch_details(&self, tmdb_id: u64) -> AppResult<Option<MovieMetadata>> {
        let movie: Option<TmdbMovie> = self
            .get_json(
                &format!("/movie/{}", tmdb_id),
                &[("append_to_response", "watch/providers".to_string())],
            )
            .await?;

        let metadata = movie.map(MovieMetadata::from);
        tracing::debug!(tmdb_id, found = metadata.is_some(), "TMDB details fetched");
        Ok(metadata)
    }

    async fn fetch_search(&self, title: &str, year: Option<i32>) -> AppResult<Option<MovieMetadata>> {
        let mut query = vec![("query", title.to_string()), ("page", "1".to_string())];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
            query.push(("primary_release_year", year.to_string()));
        }

        let page: Option<ListingPage> = self.get_json("/search/movie", &query).await?;
        let Some(best) = page.and_then(|p| p.results.into_iter().next()) else {
            tracing::debug!(title = %title, year = ?year, "No TMDB search results");
            return Ok(None);
        };

        self.details_by_tmdb_id(best.id).await
    }

    async fn fetch_popular(&self, page: u32) -> AppResult<Vec<CandidateItem>> {
        let listing: Option<ListingPage> = self
            .get_json("/movie/popular", &[("page", page.to_string())])
            .await?;

        let candidates: Vec<CandidateItem> = listing
            .map(|l| l.results.into_iter().map(CandidateItem::from).collect())
            .unwrap_or_default();

        tracing::info!(page, candidates = candidates.len(), provider = "tmdb", "Popular page fetched");
        Ok(candidates)
    }

    async fn details_by_tmdb_id(&self, tmdb_id: u64) -> AppResult<Option<MovieMetadata>> {
        cached!(
            self.cache.as_ref(),
            CacheKey::MovieDetails(tmdb_id),
            DETAILS_CACHE_TTL,
            self.fetch_details(tmdb_id)
        )
    }

    /// Translates an IMDB ID to TMDB via the /find endpoint
    async fn find_by_imdb(&self, imdb_id: &str) -> AppResult<Option<u64>> {
        let found: Option<FindResponse> = self
            .get_json(
                &format!("/find/{}", imdb_id),
                &[("external_source", "imdb_id".to_string())],
            )
            .await?;

        Ok(found.and_then(|f| f.movie_results.first().map(|m| m.id)))
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn resolve(&self, title: &str, year: Option<i32>) -> AppResult<Option<MovieMetadata>> {
        if title.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search title cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache.as_ref(),
            CacheKey::MovieSearch {
                title: title.to_string(),
                year
            },
            SEARCH_CACHE_TTL,
            self.fetch_search(title, year)
        )
    }

    async fn details(&self, id: &TitleId) -> AppResult<Option<MovieMetadata>> {
        let tmdb_id = match id {
            TitleId::Tmdb(tmdb_id) => *tmdb_id,
            TitleId::Imdb(imdb_id) => match self.find_by_imdb(imdb_id).await? {
                Some(tmdb_id) => tmdb_id,
                None => return Ok(None),
            },
        };

        self.details_by_tmdb_id(tmdb_id).await
    }
}

#[async_trait::async_trait]
impl CandidatePool for TmdbProvider {
    async fn popular_candidates(&self, page: u32) -> AppResult<Vec<CandidateItem>> {
        cached!(
            self.cache.as_ref(),
            CacheKey::PopularPage(page),
            POPULAR_CACHE_TTL,
            self.fetch_popular(page)
        )
    }
}
