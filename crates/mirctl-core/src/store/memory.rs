use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::SharedStore;
use crate::error::StoreError;

/// Process-local [`SharedStore`]. Only shared between clones.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    zsets: HashMap<String, Vec<(String, f64)>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let set = inner.zsets.entry(key.to_string()).or_default();
        match set.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 = score,
            None => set.push((member.to_string(), score)),
        }
        Ok(())
    }

    async fn zrem_below(&self, key: &str, cutoff: f64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.zsets.get_mut(key) else {
            return Ok(0);
        };
        let before = set.len();
        set.retain(|(_, score)| *score >= cutoff);
        Ok(before - set.len())
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let mut out = self.inner.lock().zsets.get(key).cloned().unwrap_or_default();
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Ok(out)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get_mut(key)
            .is_some_and(|h| h.remove(field).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zadd_updates_existing_member() {
        let store = MemoryStore::new();
        store.zadd("locks", "0", 10.0).await.unwrap();
        store.zadd("locks", "1", 5.0).await.unwrap();
        store.zadd("locks", "0", 20.0).await.unwrap();

        let all = store.zrange_all("locks").await.unwrap();
        assert_eq!(all, vec![("1".to_string(), 5.0), ("0".to_string(), 20.0)]);
    }

    #[tokio::test]
    async fn zrem_below_is_strict() {
        let store = MemoryStore::new();
        store.zadd("locks", "0", 10.0).await.unwrap();
        store.zadd("locks", "1", 11.0).await.unwrap();

        assert_eq!(store.zrem_below("locks", 11.0).await.unwrap(), 1);
        assert_eq!(store.zrange_all("locks").await.unwrap().len(), 1);
        assert_eq!(store.zrem_below("missing", 11.0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hash_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.hget("h", "f").await.unwrap(), None);
        store.hset("h", "f", "v").await.unwrap();
        assert_eq!(store.hget("h", "f").await.unwrap().as_deref(), Some("v"));
        assert!(store.hdel("h", "f").await.unwrap());
        assert!(!store.hdel("h", "f").await.unwrap());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.hset("h", "f", "v").await.unwrap();
        assert!(b.hget("h", "f").await.unwrap().is_some());
    }
}
