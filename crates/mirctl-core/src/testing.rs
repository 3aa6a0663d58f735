//! Test doubles shared by unit tests.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use mirctl_exec::{CommandRunner, ExecError, Invocation, ProcessTable, ToolOutput};
use parking_lot::Mutex;

use crate::{
    config::ControllerConfig,
    env::InvokerEnv,
    error::CoreError,
    labeltool::{LabelProjectSpec, LabelTool},
    lease::StaticProbe,
    monitor::{MonitorClient, MonitorRegistration},
    store::MemoryStore,
};

/// Records every invocation; answers by subcommand.
#[derive(Default)]
pub struct RecordingRunner {
    table: ProcessTable,
    calls: Mutex<Vec<Invocation>>,
    stdout: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, ExecError>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, sub: &str, stdout: &str) {
        self.stdout.lock().insert(sub.to_string(), stdout.to_string());
    }

    pub fn fail(&self, sub: &str, err: ExecError) {
        self.failures.lock().insert(sub.to_string(), err);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| c.subcommand().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, inv: &Invocation) -> Result<ToolOutput, ExecError> {
        self.calls.lock().push(inv.clone());
        let sub = inv.subcommand().unwrap_or_default().to_string();
        if let Some(err) = self.failures.lock().get(&sub) {
            return Err(err.clone());
        }
        Ok(ToolOutput {
            stdout: self.stdout.lock().get(&sub).cloned().unwrap_or_default(),
            stderr: String::new(),
        })
    }

    fn table(&self) -> &ProcessTable {
        &self.table
    }
}

#[derive(Default)]
pub struct RecordingMonitor {
    pub registrations: Mutex<Vec<MonitorRegistration>>,
    pub unavailable: bool,
}

#[async_trait]
impl MonitorClient for RecordingMonitor {
    async fn register(&self, reg: &MonitorRegistration) -> Result<(), CoreError> {
        if self.unavailable {
            return Err(CoreError::Monitor("monitor down".into()));
        }
        self.registrations.lock().push(reg.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FixedLabelTool {
    pub created: Mutex<Vec<LabelProjectSpec>>,
}

#[async_trait]
impl LabelTool for FixedLabelTool {
    async fn create_project(&self, spec: &LabelProjectSpec) -> Result<i64, CoreError> {
        self.created.lock().push(spec.clone());
        Ok(7)
    }
}

pub const TID: &str = "f0000001000042abcdef0123456789";

/// Env rooted at `dir` with recording collaborators and two free GPUs.
pub fn env(dir: &tempfile::TempDir, runner: Arc<RecordingRunner>) -> Arc<InvokerEnv> {
    let config = ControllerConfig {
        sandbox_root: dir.path().to_path_buf(),
        ..ControllerConfig::default()
    };
    Arc::new(
        InvokerEnv::builder(config)
            .with_runner(runner)
            .with_store(Arc::new(MemoryStore::new()))
            .with_probe(Arc::new(StaticProbe::new([("0", 0.95), ("1", 0.95)])))
            .with_monitor(Arc::new(RecordingMonitor::default()))
            .with_label_tool(Arc::new(FixedLabelTool::default()))
            .build()
            .unwrap(),
    )
}

/// Create `{sandbox}/0001/000042`.
pub fn make_repo(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let root = dir.path().join("0001").join("000042");
    std::fs::create_dir_all(&root).unwrap();
    root
}
