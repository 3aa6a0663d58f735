use std::sync::Arc;

use async_trait::async_trait;
use mirctl_exec::{CommandRunner, ExecError, Invocation};
use tracing::debug;

use crate::error::CoreError;

/// Memory headroom of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuStatus {
    pub id: String,
    /// Free memory over total memory, in `[0, 1]`.
    pub free_ratio: f64,
}

/// Reads the current GPU inventory.
#[async_trait]
pub trait GpuProbe: Send + Sync + 'static {
    async fn query(&self) -> Result<Vec<GpuStatus>, CoreError>;
}

/// [`GpuProbe`] backed by `nvidia-smi`.
///
/// A host without the binary has no GPUs; that is not an error.
pub struct NvidiaSmiProbe {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl NvidiaSmiProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }
}

#[async_trait]
impl GpuProbe for NvidiaSmiProbe {
    async fn query(&self) -> Result<Vec<GpuStatus>, CoreError> {
        let inv = Invocation::new(&self.program)
            .arg("--query-gpu=index,memory.free,memory.total")
            .arg("--format=csv,noheader,nounits");
        match self.runner.run(&inv).await {
            Ok(out) => parse_smi(&out.stdout),
            Err(ExecError::MissingProgram(p)) => {
                debug!(program = %p, "gpu probe unavailable, assuming no gpus");
                Ok(Vec::new())
            }
            Err(e) => Err(CoreError::GpuProbe(e.to_string())),
        }
    }
}

/// Parse `index, free, total` CSV rows (MiB, no header, no units).
pub fn parse_smi(stdout: &str) -> Result<Vec<GpuStatus>, CoreError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();
            let [id, free, total] = cols.as_slice() else {
                return Err(CoreError::GpuProbe(format!("unexpected row: {line}")));
            };
            let free: f64 = free
                .parse()
                .map_err(|_| CoreError::GpuProbe(format!("bad free memory: {line}")))?;
            let total: f64 = total
                .parse()
                .map_err(|_| CoreError::GpuProbe(format!("bad total memory: {line}")))?;
            let free_ratio = if total > 0.0 { (free / total).clamp(0.0, 1.0) } else { 0.0 };
            Ok(GpuStatus {
                id: id.to_string(),
                free_ratio,
            })
        })
        .collect()
}

/// Fixed inventory, for hosts configured without a probe and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    gpus: Vec<GpuStatus>,
}

impl StaticProbe {
    pub fn new<I, S>(gpus: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            gpus: gpus
                .into_iter()
                .map(|(id, free_ratio)| GpuStatus {
                    id: id.into(),
                    free_ratio,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl GpuProbe for StaticProbe {
    async fn query(&self) -> Result<Vec<GpuStatus>, CoreError> {
        Ok(self.gpus.clone())
    }
}
