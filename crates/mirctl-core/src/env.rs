use std::sync::Arc;

use mirctl_exec::{CommandRunner, ProcRunner};

use crate::{
    config::ControllerConfig,
    error::CoreError,
    labeltool::{self, LabelTool},
    layout::SandboxLayout,
    lease::{GpuLeaseScheduler, GpuProbe, LeaseConfig, NvidiaSmiProbe},
    monitor::{self, MonitorClient},
    pool::WorkerPool,
    registry::RegistryLocks,
    store::{MemoryStore, SharedStore},
};

/// Everything an invoker needs besides the request itself.
///
/// Built once at startup and shared read-only by all invocations.
pub struct InvokerEnv {
    pub config: ControllerConfig,
    pub layout: SandboxLayout,
    pub runner: Arc<dyn CommandRunner>,
    pub store: Arc<dyn SharedStore>,
    pub leases: GpuLeaseScheduler,
    pub monitor: Arc<dyn MonitorClient>,
    pub label_tool: Arc<dyn LabelTool>,
    pub pool: WorkerPool,
    /// Serializes label registry writes per user.
    pub label_locks: RegistryLocks,
}

impl InvokerEnv {
    pub fn builder(config: ControllerConfig) -> InvokerEnvBuilder {
        InvokerEnvBuilder {
            config,
            runner: None,
            store: None,
            probe: None,
            monitor: None,
            label_tool: None,
        }
    }
}

/// Collaborators default to the production ones derived from the config.
pub struct InvokerEnvBuilder {
    config: ControllerConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    store: Option<Arc<dyn SharedStore>>,
    probe: Option<Arc<dyn GpuProbe>>,
    monitor: Option<Arc<dyn MonitorClient>>,
    label_tool: Option<Arc<dyn LabelTool>>,
}

impl InvokerEnvBuilder {
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn GpuProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MonitorClient>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_label_tool(mut self, tool: Arc<dyn LabelTool>) -> Self {
        self.label_tool = Some(tool);
        self
    }

    pub fn build(self) -> Result<InvokerEnv, CoreError> {
        let cfg = self.config;
        cfg.validate()?;

        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(ProcRunner::new()));
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(NvidiaSmiProbe::new(runner.clone(), &cfg.gpu.smi_bin)));
        let monitor = match self.monitor {
            Some(m) => m,
            None => Arc::from(monitor::from_config(&cfg.monitor)?),
        };
        let label_tool = self
            .label_tool
            .unwrap_or_else(|| Arc::from(labeltool::from_config(&cfg.label_tool)));

        Ok(InvokerEnv {
            layout: SandboxLayout::new(&cfg.sandbox_root),
            leases: GpuLeaseScheduler::new(probe, store.clone(), LeaseConfig::from(&cfg.gpu)),
            pool: WorkerPool::new(cfg.workers.pool_size),
            label_locks: RegistryLocks::new(),
            runner,
            store,
            monitor,
            label_tool,
            config: cfg,
        })
    }
}
