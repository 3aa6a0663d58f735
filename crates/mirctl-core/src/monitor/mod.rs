//! Registration of async tasks with the external monitor service.
//!
//! The monitor polls each registered progress file; a task that cannot be registered is never
//! started.
use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use mirctl_model::RequestType;
use serde::Serialize;
use tracing::info;

use crate::{config::MonitorConfig, error::CoreError};

/// One progress file and its share of the task's overall progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSource {
    pub path: PathBuf,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorRegistration {
    pub task_id: String,
    pub user_id: String,
    pub request_type: RequestType,
    pub description: String,
    pub sources: Vec<ProgressSource>,
}

#[async_trait]
pub trait MonitorClient: Send + Sync + 'static {
    async fn register(&self, reg: &MonitorRegistration) -> Result<(), CoreError>;
}

/// Build the monitor described by `cfg`.
pub fn from_config(cfg: &MonitorConfig) -> Result<Box<dyn MonitorClient>, CoreError> {
    match &cfg.endpoint {
        Some(endpoint) => Ok(Box::new(HttpMonitor::new(
            endpoint,
            Duration::from_millis(cfg.timeout_ms),
        )?)),
        None => Ok(Box::new(LogMonitor)),
    }
}

/// Posts registrations to `{endpoint}/api/v1/tasks`.
pub struct HttpMonitor {
    client: reqwest::Client,
    url: String,
}

impl HttpMonitor {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Monitor(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/api/v1/tasks", endpoint.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl MonitorClient for HttpMonitor {
    async fn register(&self, reg: &MonitorRegistration) -> Result<(), CoreError> {
        let resp = self
            .client
            .post(&self.url)
            .json(reg)
            .send()
            .await
            .map_err(|e| CoreError::Monitor(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CoreError::Monitor(format!("{status}: {body}")));
        }
        info!(task = %reg.task_id, "task registered with monitor");
        Ok(())
    }
}

/// Used when no monitor endpoint is configured: registration always succeeds and is logged.
pub struct LogMonitor;

#[async_trait]
impl MonitorClient for LogMonitor {
    async fn register(&self, reg: &MonitorRegistration) -> Result<(), CoreError> {
        info!(
            task = %reg.task_id,
            kind = %reg.request_type,
            files = reg.sources.len(),
            "task registered (no monitor endpoint)"
        );
        Ok(())
    }
}
