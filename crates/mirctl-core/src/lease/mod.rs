//! GPU lease scheduling over a shared sorted set.
//!
//! The set maps `gpu_id -> lease timestamp`. A lease is a claim, not a lock: it is never
//! released explicitly and simply ages out after the lease duration. Probing, eviction and
//! claiming are separate store calls, so two controllers racing on the same set can both
//! claim the same device.
use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    config::GpuConfig,
    error::CoreError,
    progress::unix_now_f64,
    store::SharedStore,
};

mod probe;
pub use probe::{GpuProbe, GpuStatus, NvidiaSmiProbe, StaticProbe, parse_smi};

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// A GPU counts as free when its free ratio is strictly above this.
    pub free_threshold: f64,
    pub lease_duration: Duration,
    pub lock_key: String,
}

impl From<&GpuConfig> for LeaseConfig {
    fn from(cfg: &GpuConfig) -> Self {
        Self {
            free_threshold: cfg.free_threshold,
            lease_duration: cfg.lease_duration(),
            lock_key: cfg.lock_key.clone(),
        }
    }
}

pub struct GpuLeaseScheduler {
    probe: Arc<dyn GpuProbe>,
    store: Arc<dyn SharedStore>,
    cfg: LeaseConfig,
}

impl GpuLeaseScheduler {
    pub fn new(probe: Arc<dyn GpuProbe>, store: Arc<dyn SharedStore>, cfg: LeaseConfig) -> Self {
        Self { probe, store, cfg }
    }

    /// Lease `gpu_count` devices, all or nothing.
    ///
    /// Returns the comma-joined device ids, or an empty string when fewer than `gpu_count`
    /// are available. With `lock`, the returned devices are stamped with the current time.
    pub async fn lease(&self, gpu_count: usize, lock: bool) -> Result<String, CoreError> {
        self.lease_at(gpu_count, lock, unix_now_f64()).await
    }

    pub async fn lease_at(
        &self,
        gpu_count: usize,
        lock: bool,
        now: f64,
    ) -> Result<String, CoreError> {
        if gpu_count == 0 {
            return Ok(String::new());
        }
        let available = self.available_at(now).await?;
        if available.len() < gpu_count {
            debug!(
                wanted = gpu_count,
                available = available.len(),
                "not enough free gpus"
            );
            return Ok(String::new());
        }

        let picked = &available[..gpu_count];
        if lock {
            for id in picked {
                self.store.zadd(&self.cfg.lock_key, id, now).await?;
            }
        }
        let ids = picked.join(",");
        info!(gpus = %ids, lock, "gpus leased");
        Ok(ids)
    }

    /// Devices that are free by memory and not under a live lease, in probe order.
    ///
    /// Expired leases are evicted as a side effect.
    pub async fn available_at(&self, now: f64) -> Result<Vec<String>, CoreError> {
        let free: Vec<String> = self
            .probe
            .query()
            .await?
            .into_iter()
            .filter(|g| g.free_ratio > self.cfg.free_threshold)
            .map(|g| g.id)
            .collect();

        let cutoff = now - self.cfg.lease_duration.as_secs_f64();
        let evicted = self.store.zrem_below(&self.cfg.lock_key, cutoff).await?;
        if evicted > 0 {
            debug!(evicted, "expired gpu leases evicted");
        }

        let locked = self.store.zrange_all(&self.cfg.lock_key).await?;
        Ok(free
            .into_iter()
            .filter(|id| !locked.iter().any(|(m, _)| m == id))
            .collect())
    }

    pub async fn available_count(&self) -> Result<usize, CoreError> {
        Ok(self.available_at(unix_now_f64()).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const KEY: &str = "locks";

    fn scheduler(gpus: &[(&str, f64)], store: Arc<MemoryStore>) -> GpuLeaseScheduler {
        GpuLeaseScheduler::new(
            Arc::new(StaticProbe::new(gpus.iter().copied())),
            store,
            LeaseConfig {
                free_threshold: 0.8,
                lease_duration: Duration::from_secs(30),
                lock_key: KEY.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn stale_lock_is_evicted_and_gpus_leased() {
        let store = Arc::new(MemoryStore::new());
        store.zadd(KEY, "1", 100.0).await.unwrap();
        let s = scheduler(&[("0", 0.95), ("1", 0.9), ("2", 0.1)], store.clone());

        let got = s.lease_at(2, true, 200.0).await.unwrap();
        assert_eq!(got, "0,1");
        let locks = store.zrange_all(KEY).await.unwrap();
        assert_eq!(locks, vec![("0".into(), 200.0), ("1".into(), 200.0)]);
    }

    #[tokio::test]
    async fn live_lock_hides_gpu() {
        let store = Arc::new(MemoryStore::new());
        store.zadd(KEY, "0", 190.0).await.unwrap();
        let s = scheduler(&[("0", 0.95), ("1", 0.9)], store);

        assert_eq!(s.lease_at(1, false, 200.0).await.unwrap(), "1");
        assert_eq!(s.lease_at(2, false, 200.0).await.unwrap(), "");
    }

    #[tokio::test]
    async fn all_or_nothing_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let s = scheduler(&[("0", 0.95)], store.clone());

        assert_eq!(s.lease_at(2, true, 200.0).await.unwrap(), "");
        assert!(store.zrange_all(KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn threshold_is_strict() {
        let store = Arc::new(MemoryStore::new());
        let s = scheduler(&[("0", 0.8), ("1", 0.81)], store);
        assert_eq!(s.available_at(0.0).await.unwrap(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn zero_gpus_is_trivially_satisfied() {
        let store = Arc::new(MemoryStore::new());
        let s = scheduler(&[], store.clone());
        assert_eq!(s.lease_at(0, true, 0.0).await.unwrap(), "");
        assert!(store.zrange_all(KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lease_without_lock_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let s = scheduler(&[("0", 0.95), ("1", 0.95)], store.clone());
        assert_eq!(s.lease_at(2, false, 50.0).await.unwrap(), "0,1");
        assert!(store.zrange_all(KEY).await.unwrap().is_empty());
    }
}
