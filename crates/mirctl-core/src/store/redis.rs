//! Redis [`SharedStore`] backend.
//!
//! Holds one [`MultiplexedConnection`]; every call clones it, and all clones share the
//! underlying TCP connection.
use ::redis::{AsyncCommands, aio::MultiplexedConnection};
use async_trait::async_trait;

use super::SharedStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `redis://[:<password>@]<host>:<port>[/<db>]`. Fails fast.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::Backend(format!("failed to create redis client: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn })
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn map_redis_error(err: ::redis::RedisError, key: &str) -> StoreError {
    StoreError::Backend(format!("redis error for key {key}: {err}"))
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(key, member, score)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(())
    }

    async fn zrem_below(&self, key: &str, cutoff: f64) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn
            .zrembyscore(key, "-inf", format!("({cutoff}"))
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(removed)
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = conn
            .zrange_withscores(key, 0, -1)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(members)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .hset(key, field, value)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .hget(key, field)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(value)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(key, field)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(removed > 0)
    }
}
