pub mod postgres;
pub mod redis;
pub mod store;

pub use postgres::{create_pool, PgStore};
pub use redis::{Cache, CacheKey};
pub use store::{JobStore, RatingsStore, RecommendationStore};

#[cfg(test)]
pub use store::{MockJobStore, MockRatingsStore, MockRecommendationStore};
