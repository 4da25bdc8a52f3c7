/// Read-through caching for provider lookups.
///
/// `$cache` is an `Option<&Cache>`. With no cache configured the block simply
/// runs. A failed cache read is logged and treated as a miss, so a Redis outage
/// degrades to uncached lookups instead of failing them.
///
/// # Arguments
/// * `$cache`: `Option<&Cache>`.
/// * `$key`: The `CacheKey` to read and write.
/// * `$ttl`: Time-to-live for the stored value in seconds.
/// * `$block`: Future computing the value on a miss; must resolve to `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let movie = cached!(self.cache.as_ref(), CacheKey::MovieDetails(id), TTL, async move {
///     fetch_movie(id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache {
            Some(cache) => {
                let key = $key;
                let hit = match cache.lookup(&key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                        None
                    }
                };
                match hit {
                    Some(cached) => Ok(cached),
                    None => {
                        let value = $block.await?;
                        cache.store_later(&key, &value, $ttl);
                        Ok(value)
                    }
                }
            }
            None => $block.await,
        }
    }};
}
