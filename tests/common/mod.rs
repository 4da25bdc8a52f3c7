#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use feedmovie_api::{
    config::PipelineSettings,
    db::{JobStore, RatingsStore, RecommendationStore},
    error::{AppError, AppResult},
    models::{
        GenerationJob, JobStatus, MovieMetadata, Proposal, RankedRecommendation, RatedItem, SourceId,
        StreamingProviders, TasteContext, TitleId,
    },
    services::{
        providers::MetadataProvider, GenerationPipeline, JobTracker, OpinionSource, PipelineDeps,
    },
};

/// Ratings, recommendations and jobs held in memory
#[derive(Default)]
pub struct MemoryStore {
    pub ratings: Mutex<HashMap<i64, Vec<RatedItem>>>,
    pub watched: Mutex<HashMap<i64, HashSet<TitleId>>>,
    pub saved: Mutex<HashMap<i64, Vec<RankedRecommendation>>>,
    pub jobs: Mutex<Vec<GenerationJob>>,
    /// Makes every list save fail
    pub fail_saves: AtomicBool,
    /// Makes duration history unreadable
    pub fail_durations: AtomicBool,
}

impl MemoryStore {
    pub fn with_ratings(owner: i64, ratings: Vec<RatedItem>) -> Self {
        let store = Self::default();
        store.ratings.lock().unwrap().insert(owner, ratings);
        store
    }

    pub fn saved_for(&self, owner: i64) -> Vec<RankedRecommendation> {
        self.saved.lock().unwrap().get(&owner).cloned().unwrap_or_default()
    }

    pub fn jobs_for(&self, owner: i64) -> Vec<GenerationJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.owner == owner)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl RatingsStore for MemoryStore {
    async fn get_ratings(&self, owner: i64) -> AppResult<Vec<RatedItem>> {
        Ok(self.ratings.lock().unwrap().get(&owner).cloned().unwrap_or_default())
    }

    async fn get_watched_ids(&self, owner: i64) -> AppResult<HashSet<TitleId>> {
        let mut ids: HashSet<TitleId> = self
            .ratings
            .lock()
            .unwrap()
            .get(&owner)
            .map(|r| r.iter().map(|item| item.item_id.clone()).collect())
            .unwrap_or_default();
        if let Some(extra) = self.watched.lock().unwrap().get(&owner) {
            ids.extend(extra.iter().cloned());
        }
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryStore {
    async fn clear_previous(&self, owner: i64) -> AppResult<()> {
        self.saved.lock().unwrap().remove(&owner);
        Ok(())
    }

    async fn save_ranked_list(&self, owner: i64, recommendations: &[RankedRecommendation]) -> AppResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::Internal("recommendations table unavailable".to_string()));
        }
        self.saved
            .lock()
            .unwrap()
            .insert(owner, recommendations.to_vec());
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryStore {
    async fn live_jobs(&self, owner: i64) -> AppResult<Vec<GenerationJob>> {
        Ok(self
            .jobs_for(owner)
            .into_iter()
            .filter(|j| !j.is_terminal())
            .collect())
    }

    async fn insert(&self, job: &GenerationJob) -> AppResult<()> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn update(&self, job: &GenerationJob) -> AppResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(stored) if stored.is_terminal() => Ok(false),
            Some(stored) => {
                *stored = job.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<GenerationJob>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn latest_for_owner(&self, owner: i64) -> AppResult<Option<GenerationJob>> {
        Ok(self.jobs_for(owner).into_iter().max_by_key(|j| j.started_at))
    }

    async fn completed_durations(&self) -> AppResult<Vec<f64>> {
        if self.fail_durations.load(Ordering::SeqCst) {
            return Err(AppError::Internal("job history unavailable".to_string()));
        }
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .filter_map(|j| j.duration_secs)
            .collect())
    }
}

/// Catalog keyed by lower-cased title
#[derive(Default)]
pub struct FakeCatalog {
    entries: HashMap<String, MovieMetadata>,
}

impl FakeCatalog {
    pub fn with(mut self, id: u64, title: &str, genres: &[&str]) -> Self {
        self.entries
            .insert(title.to_lowercase(), movie(id, title, genres));
        self
    }
}

#[async_trait::async_trait]
impl MetadataProvider for FakeCatalog {
    async fn resolve(&self, title: &str, _year: Option<i32>) -> AppResult<Option<MovieMetadata>> {
        Ok(self.entries.get(&title.to_lowercase()).cloned())
    }

    async fn details(&self, id: &TitleId) -> AppResult<Option<MovieMetadata>> {
        Ok(self.entries.values().find(|m| &m.external_id == id).cloned())
    }
}

/// Returns a fixed list, optionally after a delay or as a failure
pub struct ScriptedSource {
    pub id: SourceId,
    pub proposals: Vec<Proposal>,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl ScriptedSource {
    pub fn new(id: SourceId, titles: &[&str]) -> Self {
        Self {
            id,
            proposals: titles
                .iter()
                .map(|t| Proposal::new(id, *t, Some(2000)).with_rationale(format!("{} says {}", id, t)))
                .collect(),
            delay: None,
            fail: false,
        }
    }

    pub fn failing(id: SourceId) -> Self {
        Self {
            fail: true,
            ..Self::new(id, &[])
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl OpinionSource for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn try_propose(&self, _context: &TasteContext, count: usize) -> AppResult<Vec<Proposal>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AppError::ExternalApi("scripted failure".to_string()));
        }
        Ok(self.proposals.iter().take(count).cloned().collect())
    }
}

/// Answers category-focused requests from a per-category list
pub struct CategoryFillSource {
    pub id: SourceId,
    pub by_category: HashMap<String, Vec<String>>,
}

#[async_trait::async_trait]
impl OpinionSource for CategoryFillSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn try_propose(&self, context: &TasteContext, count: usize) -> AppResult<Vec<Proposal>> {
        let Some(focus) = &context.focus else {
            return Ok(Vec::new());
        };
        Ok(self
            .by_category
            .get(&focus.category)
            .map(|titles| {
                titles
                    .iter()
                    .filter(|t| !focus.exclude_titles.contains(t))
                    .take(count)
                    .map(|t| Proposal::new(self.id, t.as_str(), Some(2000)))
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn movie(id: u64, title: &str, genres: &[&str]) -> MovieMetadata {
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

pub fn rating(id: u64, title: &str, genres: &[&str], value: f32) -> RatedItem {
    RatedItem {
        item_id: TitleId::Tmdb(id),
        title: title.to_string(),
        year: Some(1999),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        rating: value,
        watched_at: None,
    }
}

/// Ten ratings across a few genres
pub fn ten_ratings() -> Vec<RatedItem> {
    (1..=10)
        .map(|i| {
            let genres: &[&str] = if i % 2 == 0 { &["Drama"] } else { &["Action"] };
            rating(i, &format!("Rated {}", i), genres, 2.5 + (i % 5) as f32 * 0.5)
        })
        .collect()
}

/// Settings that leave diversity and shortfall passes idle
pub fn quiet_settings() -> PipelineSettings {
    PipelineSettings {
        source_timeout: Duration::from_secs(5),
        proposals_per_source: 20,
        target_count: 50,
        min_total: 0,
        min_per_category: 0,
        cf_count: 15,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub pipeline: Arc<GenerationPipeline>,
}

pub fn harness(
    store: MemoryStore,
    catalog: FakeCatalog,
    advisors: Vec<Arc<dyn OpinionSource>>,
    collaborative: Option<Arc<dyn OpinionSource>>,
    fill: Option<Arc<dyn OpinionSource>>,
    settings: PipelineSettings,
) -> Harness {
    let store = Arc::new(store);
    let pipeline = GenerationPipeline::new(PipelineDeps {
        ratings: store.clone(),
        recommendations: store.clone(),
        tracker: JobTracker::new(store.clone()),
        metadata: Arc::new(catalog),
        advisors,
        collaborative,
        fill,
        settings,
    });
    Harness {
        store,
        pipeline: Arc::new(pipeline),
    }
}
