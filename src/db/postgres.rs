use std::collections::HashSet;

use sqlx::{postgres::PgPoolOptions, postgres::PgRow, types::Json, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    db::{JobStore, RatingsStore, RecommendationStore},
    error::{AppError, AppResult},
    models::{GenerationJob, MovieMetadata, RankedRecommendation, RatedItem, SourceId, TitleId},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed ratings, recommendation and job stores
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn delete_recommendations<'e, E>(executor: E, owner: i64) -> AppResult<u64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM recommendations WHERE owner = $1")
            .bind(owner)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Inserts or refreshes a catalog entry, returning its row id
    async fn upsert_movie(
        tx: &mut Transaction<'_, Postgres>,
        metadata: &MovieMetadata,
    ) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO movies (external_id, imdb_id, title, year, genres, poster_url, overview, streaming, vote_average, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (external_id) DO UPDATE SET
                imdb_id = COALESCE(EXCLUDED.imdb_id, movies.imdb_id),
                title = EXCLUDED.title,
                year = EXCLUDED.year,
                genres = EXCLUDED.genres,
                poster_url = EXCLUDED.poster_url,
                overview = EXCLUDED.overview,
                streaming = EXCLUDED.streaming,
                vote_average = EXCLUDED.vote_average,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(metadata.external_id.to_string())
        .bind(&metadata.imdb_id)
        .bind(&metadata.title)
        .bind(metadata.year)
        .bind(Json(&metadata.genres))
        .bind(&metadata.poster_url)
        .bind(&metadata.overview)
        .bind(Json(&metadata.streaming))
        .bind(metadata.vote_average)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.try_get("id")?)
    }
}

fn parse_title_id(raw: &str) -> AppResult<TitleId> {
    raw.parse()
        .map_err(|e: String| AppError::Internal(format!("Corrupt movie id in database: {}", e)))
}

fn rated_item_from_row(row: &PgRow) -> AppResult<RatedItem> {
    let external_id: String = row.try_get("external_id")?;
    let genres: Json<Vec<String>> = row.try_get("genres")?;

    Ok(RatedItem {
        item_id: parse_title_id(&external_id)?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        genres: genres.0,
        rating: row.try_get("rating")?,
        watched_at: row.try_get("watched_at")?,
    })
}

fn job_from_row(row: &PgRow) -> AppResult<GenerationJob> {
    let status: String = row.try_get("status")?;
    let stage: String = row.try_get("stage")?;
    let progress: i16 = row.try_get("progress")?;

    Ok(GenerationJob {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        status: status.parse()?,
        stage: stage.parse()?,
        progress: progress.clamp(0, 100) as u8,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        duration_secs: row.try_get("duration_secs")?,
        error: row.try_get("error")?,
    })
}

const JOB_COLUMNS: &str =
    "id, owner, status, stage, progress, started_at, completed_at, duration_secs, error";

#[async_trait::async_trait]
impl RatingsStore for PgStore {
    async fn get_ratings(&self, owner: i64) -> AppResult<Vec<RatedItem>> {
        let rows = sqlx::query(
            r#"
            SELECT m.external_id, m.title, m.year, m.genres, r.rating, r.watched_at
            FROM ratings r
            JOIN movies m ON m.id = r.movie_id
            WHERE r.owner = $1
            ORDER BY r.rating DESC, m.title
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rated_item_from_row).collect()
    }

    async fn get_watched_ids(&self, owner: i64) -> AppResult<HashSet<TitleId>> {
        let rows = sqlx::query(
            r#"
            SELECT m.external_id FROM ratings r JOIN movies m ON m.id = r.movie_id WHERE r.owner = $1
            UNION
            SELECT m.external_id FROM watched w JOIN movies m ON m.id = w.movie_id WHERE w.owner = $1
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("external_id")?;
                parse_title_id(&raw)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn clear_previous(&self, owner: i64) -> AppResult<()> {
        let removed = Self::delete_recommendations(&self.pool, owner).await?;
        tracing::debug!(owner, removed, "Previous recommendations cleared");
        Ok(())
    }

    async fn save_ranked_list(&self, owner: i64, recommendations: &[RankedRecommendation]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let removed = Self::delete_recommendations(&mut *tx, owner).await?;
        tracing::debug!(owner, removed, "Replacing previous recommendations");

        for (rank, rec) in recommendations.iter().enumerate() {
            let movie_id = Self::upsert_movie(&mut tx, &rec.metadata).await?;
            let sources: Vec<String> = rec.sources.iter().map(SourceId::to_string).collect();

            sqlx::query(
                r#"
                INSERT INTO recommendations (owner, movie_id, rank, score, primary_source, sources, rationale, rationales, is_fill)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(owner)
            .bind(movie_id)
            .bind(rank as i32 + 1)
            .bind(rec.score)
            .bind(rec.primary_source())
            .bind(Json(&sources))
            .bind(rec.primary_rationale())
            .bind(Json(&rec.rationales))
            .bind(rec.fill)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(owner, saved = recommendations.len(), "Recommendations saved");
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for PgStore {
    async fn live_jobs(&self, owner: i64) -> AppResult<Vec<GenerationJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM generation_jobs WHERE owner = $1 AND status IN ('pending', 'running')",
            JOB_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn insert(&self, job: &GenerationJob) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs (id, owner, status, stage, progress, started_at, completed_at, duration_secs, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(job.owner)
        .bind(job.status.as_str())
        .bind(job.stage.as_str())
        .bind(job.progress as i16)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.duration_secs)
        .bind(&job.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, job: &GenerationJob) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = $2, stage = $3, progress = $4, completed_at = $5, duration_secs = $6, error = $7
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.stage.as_str())
        .bind(job.progress as i16)
        .bind(job.completed_at)
        .bind(job.duration_secs)
        .bind(&job.error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<GenerationJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM generation_jobs WHERE id = $1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn latest_for_owner(&self, owner: i64) -> AppResult<Option<GenerationJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM generation_jobs WHERE owner = $1 ORDER BY started_at DESC LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn completed_durations(&self) -> AppResult<Vec<f64>> {
        let rows = sqlx::query(
            "SELECT duration_secs FROM generation_jobs WHERE status = 'completed' AND duration_secs IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<f64, _>("duration_secs").map_err(AppError::from))
            .collect()
    }
}
