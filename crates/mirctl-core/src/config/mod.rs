//! Controller configuration, loaded from TOML.
//!
//! Every table is optional; missing keys fall back to the defaults below.
use std::{path::Path, path::PathBuf, time::Duration};

use mirctl_observe::LoggerConfig;
use serde::Deserialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Root of all user repositories and task work directories.
    pub sandbox_root: PathBuf,
    /// Shared media (asset) storage handed to the dataset tool.
    pub assets_location: PathBuf,
    /// Model package storage.
    pub models_location: PathBuf,
    pub tool: ToolConfig,
    pub workers: WorkerConfig,
    pub gpu: GpuConfig,
    pub store: StoreConfig,
    pub monitor: MonitorConfig,
    pub label_tool: LabelToolConfig,
    pub container: ContainerConfig,
    pub http: HttpConfig,
    pub logger: LoggerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("/data/sandbox"),
            assets_location: PathBuf::from("/data/assets"),
            models_location: PathBuf::from("/data/models"),
            tool: ToolConfig::default(),
            workers: WorkerConfig::default(),
            gpu: GpuConfig::default(),
            store: StoreConfig::default(),
            monitor: MonitorConfig::default(),
            label_tool: LabelToolConfig::default(),
            container: ContainerConfig::default(),
            http: HttpConfig::default(),
            logger: LoggerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Dataset version-control tool.
    pub mir_bin: String,
    pub docker_bin: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            mir_bin: "mir".to_string(),
            docker_bin: "docker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent async tasks.
    pub pool_size: usize,
    /// Threads serving inbound requests.
    pub rpc_threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            rpc_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// A GPU counts as free when its free-memory ratio exceeds this.
    pub free_threshold: f64,
    /// Lease lifetime in seconds. Leases are never released explicitly.
    pub lease_secs: u64,
    pub smi_bin: String,
    /// Sorted-set key holding `gpu_id -> lease timestamp`.
    pub lock_key: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            free_threshold: 0.8,
            lease_secs: 30,
            smi_bin: "nvidia-smi".to_string(),
            lock_key: "mirctl:gpu_locks".to_string(),
        }
    }
}

impl GpuConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://host:port/db`. In-memory store when absent.
    pub redis_url: Option<String>,
    /// Hash key holding labeling-project metadata per task.
    pub label_task_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            label_task_key: "mirctl:label_tasks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Monitor service base URL. Registrations are only logged when absent.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LabelToolConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub shm_size: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            shm_size: "16G".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:50066".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let cfg: Self = toml::from_str(raw).map_err(|e| CoreError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tool.mir_bin.trim().is_empty() {
            return Err(CoreError::Config("tool.mir_bin is empty".into()));
        }
        if self.tool.docker_bin.trim().is_empty() {
            return Err(CoreError::Config("tool.docker_bin is empty".into()));
        }
        if !(self.gpu.free_threshold > 0.0 && self.gpu.free_threshold <= 1.0) {
            return Err(CoreError::Config(format!(
                "gpu.free_threshold must be in (0, 1], got {}",
                self.gpu.free_threshold
            )));
        }
        if self.gpu.lease_secs == 0 {
            return Err(CoreError::Config("gpu.lease_secs must be positive".into()));
        }
        if self.workers.pool_size == 0 {
            return Err(CoreError::Config("workers.pool_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.tool.mir_bin, "mir");
        assert_eq!(cfg.workers.pool_size, 8);
        assert_eq!(cfg.gpu.lease_duration(), Duration::from_secs(30));
        assert!(cfg.store.redis_url.is_none());
    }

    #[test]
    fn nested_tables_override_defaults() {
        let cfg = ControllerConfig::from_toml_str(
            r#"
            sandbox_root = "/tmp/sb"

            [gpu]
            free_threshold = 0.5
            lock_key = "locks"

            [store]
            redis_url = "redis://127.0.0.1:6379/0"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sandbox_root, PathBuf::from("/tmp/sb"));
        assert_eq!(cfg.gpu.free_threshold, 0.5);
        assert_eq!(cfg.gpu.lease_secs, 30);
        assert_eq!(cfg.gpu.lock_key, "locks");
        assert_eq!(cfg.store.redis_url.as_deref(), Some("redis://127.0.0.1:6379/0"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = ControllerConfig::from_toml_str("[gpu]\nfree_threshold = 1.5").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn zero_pool_is_rejected() {
        assert!(ControllerConfig::from_toml_str("[workers]\npool_size = 0").is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = ControllerConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
