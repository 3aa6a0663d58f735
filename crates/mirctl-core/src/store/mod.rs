//! Shared key-value store used for GPU leases and labeling-project metadata.
//!
//! The store is shared with other controller processes, so it only offers the handful of
//! sorted-set and hash operations the controller needs. Backends are dumb adapters.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{config::StoreConfig, error::StoreError};

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Insert or update `member` with `score`.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Remove members scored strictly below `cutoff`. Returns how many went away.
    async fn zrem_below(&self, key: &str, cutoff: f64) -> Result<usize, StoreError>;

    /// All members with their scores, ascending by score.
    async fn zrange_all(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Returns whether the field existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError>;
}

/// Build the store described by `cfg`: redis when a URL is set, memory otherwise.
pub async fn connect(cfg: &StoreConfig) -> Result<Arc<dyn SharedStore>, StoreError> {
    match &cfg.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(RedisStore::new(url).await?)),
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(StoreError::Backend(
            "redis_url set but built without the `redis` feature".to_string(),
        )),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
