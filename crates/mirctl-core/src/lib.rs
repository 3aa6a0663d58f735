//! Controller task-invoker framework.
//!
//! Requests enter through the [`Dispatcher`], are validated by the [`checker`], and either run
//! inline (single-shot invokers) or as a weighted pipeline of sub-tasks driven by the
//! [`Orchestrator`]. Progress is reported through a tab-separated file per task; GPUs are leased
//! through a shared sorted set.

pub mod error;
pub use error::{CoreError, StoreError};

pub mod config;
pub use config::ControllerConfig;

mod layout;
pub use layout::{SandboxLayout, TaskLayout};

pub mod checker;
pub use checker::{Prerequisite, check};

pub mod progress;
pub use progress::{ProgressWriter, read_progress};

pub mod store;
pub use store::{MemoryStore, SharedStore};

pub mod lease;
pub use lease::{GpuLeaseScheduler, GpuProbe, GpuStatus, LeaseConfig, NvidiaSmiProbe};

pub mod monitor;
pub use monitor::{MonitorClient, MonitorRegistration};

pub mod labeltool;
pub use labeltool::LabelTool;

pub mod registry;

mod env;
pub use env::{InvokerEnv, InvokerEnvBuilder};

pub mod pool;
pub use pool::{Completion, TaskHandle, WorkerPool};

pub mod orchestrator;
pub use orchestrator::{Orchestrator, Plan, SubTask, SubTaskContext, SubTaskDesc};

pub mod invoker;
pub use invoker::{ExecutionMode, Invoker, PipelineInvoker, TaskPlanner};

pub mod router;
pub use router::{Dispatcher, InvokerRouter};

pub mod invokers;
pub mod steps;
pub mod tasks;

#[cfg(test)]
mod testing;
