//! Redis cache for TMDB lookups.
//!
//! Reads go straight to Redis. Writes are queued and applied by a single
//! writer task so provider calls never wait on them.

use std::fmt;

use redis::{AsyncCommands, Client};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};

/// Namespaced keys for cached TMDB responses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MovieSearch { title: String, year: Option<i32> },
    MovieDetails(u64),
    PopularPage(u32),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::MovieSearch { title, year } => {
                let title = title.trim().to_lowercase();
                match year {
                    Some(year) => write!(f, "tmdb:search:{}:{}", title, year),
                    None => write!(f, "tmdb:search:{}:any", title),
                }
            }
            CacheKey::MovieDetails(id) => write!(f, "tmdb:movie:{}", id),
            CacheKey::PopularPage(page) => write!(f, "tmdb:popular:{}", page),
        }
    }
}

struct PendingWrite {
    key: String,
    json: String,
    ttl_secs: u64,
}

#[derive(Clone)]
pub struct Cache {
    client: Client,
    writes: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the writer after it has applied every queued write
pub struct CacheWriterHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer ended abnormally");
        }
    }
}

impl Cache {
    /// Opens a client for `redis_url` and starts the writer task
    ///
    /// No connection is made until the first read or write.
    pub fn connect(redis_url: &str) -> anyhow::Result<(Self, CacheWriterHandle)> {
        let client = Client::open(redis_url)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> (Self, CacheWriterHandle) {
        let (writes, queue) = mpsc::unbounded_channel();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run_writer(client.clone(), queue, stopped));

        (Self { client, writes }, CacheWriterHandle { stop, task })
    }

    /// Cached value for `key`, if present and decodable
    pub async fn lookup<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(key.to_string()).await?;

        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AppError::Internal(format!("Undecodable cache entry {}: {}", key, e)))
        })
        .transpose()
    }

    /// Queues a write; failures are logged by the writer
    pub fn store_later<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Value not cacheable");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            json,
            ttl_secs,
        };
        if self.writes.send(write).is_err() {
            tracing::warn!(key = %key, "Cache writer stopped, write dropped");
        }
    }
}

async fn run_writer(
    client: Client,
    mut queue: mpsc::UnboundedReceiver<PendingWrite>,
    mut stopped: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            Some(write) = queue.recv() => apply(&client, write).await,
            _ = &mut stopped => break,
        }
    }

    // Clones of the cache may still hold senders, so only drain what is queued.
    let mut flushed = 0;
    while let Ok(write) = queue.try_recv() {
        apply(&client, write).await;
        flushed += 1;
    }
    tracing::info!(flushed, "Cache writer stopped");
}

async fn apply(client: &Client, write: PendingWrite) {
    let PendingWrite { key, json, ttl_secs } = write;
    if let Err(e) = set_with_ttl(client, &key, json, ttl_secs).await {
        tracing::warn!(error = %e, key = %key, "Cache write failed");
    }
}

async fn set_with_ttl(client: &Client, key: &str, json: String, ttl_secs: u64) -> AppResult<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: () = conn.set_ex(key, json, ttl_secs).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_search_keys_ignore_case_and_padding() {
        let key = CacheKey::MovieSearch {
            title: "  Blade Runner ".to_string(),
            year: Some(1982),
        };
        assert_eq!(key.to_string(), "tmdb:search:blade runner:1982");

        let any_year = CacheKey::MovieSearch {
            title: "THE MATRIX".to_string(),
            year: None,
        };
        assert_eq!(any_year.to_string(), "tmdb:search:the matrix:any");
    }

    #[test]
    fn test_details_and_popular_keys() {
        assert_eq!(CacheKey::MovieDetails(78).to_string(), "tmdb:movie:78");
        assert_eq!(CacheKey::PopularPage(2).to_string(), "tmdb:popular:2");
    }

    #[tokio::test]
    async fn test_shutdown_returns_while_clones_are_alive() {
        let (cache, handle) = Cache::connect("redis://127.0.0.1:1").unwrap();
        let clone = cache.clone();

        cache.store_later(&CacheKey::MovieDetails(1), &"Heat", 60);
        tokio::time::timeout(Duration::from_secs(10), handle.shutdown())
            .await
            .expect("writer did not stop");

        clone.store_later(&CacheKey::MovieDetails(2), &"Ronin", 60);
    }

    #[tokio::test]
    async fn test_lookup_against_unreachable_redis_is_an_error() {
        let (cache, handle) = Cache::connect("redis://127.0.0.1:1").unwrap();
        let result: AppResult<Option<String>> = cache.lookup(&CacheKey::MovieDetails(1)).await;
        assert!(result.is_err());
        handle.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_queued_write_is_readable_after_shutdown() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let (cache, handle) = Cache::connect(&redis_url).unwrap();

        let key = CacheKey::MovieDetails(u64::MAX);
        let genres = vec!["Drama".to_string(), "Romance".to_string()];
        cache.store_later(&key, &genres, 60);
        handle.shutdown().await;

        let cached: Option<Vec<String>> = cache.lookup(&key).await.unwrap();
        assert_eq!(cached, Some(genres));
    }
}
