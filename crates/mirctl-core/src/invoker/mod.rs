//! Invoker contract.
//!
//! An invoker handles exactly one request type. Dispatch always calls [`Invoker::pre_invoke`]
//! first; [`Invoker::invoke`] only runs when it returned `Ok`.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use mirctl_exec::{ExecError, Invocation, ToolOutput};
use mirctl_model::{ControllerRequest, RequestType, Response, ResponseCode, TaskId};
use tracing::{debug, info};

use crate::{
    checker::{Prerequisite, check},
    env::InvokerEnv,
    error::CoreError,
    monitor::{MonitorRegistration, ProgressSource},
    orchestrator::{Orchestrator, Plan},
    progress::ProgressWriter,
};

#[async_trait]
pub trait Invoker: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn request_type(&self) -> RequestType;

    fn prerequisites(&self) -> &'static [Prerequisite];

    /// Validate without side effects: request type, then prerequisites in order.
    fn pre_invoke(&self, req: &ControllerRequest, env: &InvokerEnv) -> Response {
        if req.request_type() != self.request_type() {
            return mismatched(self.request_type(), req);
        }
        check(req, self.prerequisites(), &env.layout)
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// The caller gets the pipeline's final response.
    Sync,
    /// The caller gets "task accepted"; the pipeline runs on the worker pool.
    Async,
}

/// Describes a pipelined request type: its rules, mode and sub-task plan.
pub trait TaskPlanner: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn request_type(&self) -> RequestType;

    fn prerequisites(&self) -> &'static [Prerequisite];

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Async
    }

    /// Build the plan. Only payload checks belong here; no side effects.
    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError>;

    fn describe(&self, req: &ControllerRequest) -> String {
        format!("{} into {}", self.request_type(), req.dst_dataset_id)
    }
}

/// [`Invoker`] for any [`TaskPlanner`].
pub struct PipelineInvoker<P> {
    planner: P,
}

impl<P: TaskPlanner> PipelineInvoker<P> {
    pub fn new(planner: P) -> Self {
        Self { planner }
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }
}

#[async_trait]
impl<P: TaskPlanner> Invoker for PipelineInvoker<P> {
    fn name(&self) -> &'static str {
        self.planner.name()
    }

    fn request_type(&self) -> RequestType {
        self.planner.request_type()
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        self.planner.prerequisites()
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let plan = match self.planner.plan(&req) {
            Ok(plan) => plan,
            Err(e) => return e.into_response(),
        };
        let task_id = match TaskId::parse(&req.task_id) {
            Ok(id) => id,
            Err(e) => return CoreError::from(e).into_response(),
        };
        let Some(admission) = env.pool.admit(&task_id) else {
            return CoreError::TaskRunning(task_id.to_string()).into_response();
        };
        let task = env.layout.task(req.request_type(), &task_id);
        if let Err(e) = std::fs::create_dir_all(&task.work_dir) {
            return CoreError::from(e).into_response();
        }

        let registration = MonitorRegistration {
            task_id: task_id.to_string(),
            user_id: req.user_id.clone(),
            request_type: req.request_type(),
            description: self.planner.describe(&req),
            sources: vec![ProgressSource {
                path: task.progress_file.clone(),
                weight: 1.0,
            }],
        };
        if let Err(e) = env.monitor.register(&registration).await {
            return e.into_response();
        }

        let writer = ProgressWriter::new(&task.progress_file, task_id.as_str());
        if let Err(e) = writer.pending() {
            return e.into_response();
        }

        debug!(task = %task_id, steps = ?plan.names(), "plan accepted");
        let orchestrator = Orchestrator::new(Arc::clone(&env));
        let req = Arc::new(req);
        match self.planner.mode() {
            ExecutionMode::Sync => {
                let resp = orchestrator.run(req, plan, &task).await;
                drop(admission);
                resp
            }
            ExecutionMode::Async => {
                env.pool.submit(admission, async move {
                    orchestrator.run(req, plan, &task).await
                });
                info!(task = %task_id, "task accepted");
                Response::ok("task accepted")
            }
        }
    }
}

/// `MismatchedRequestType` response for an invoker handed the wrong payload.
pub fn mismatched(expected: RequestType, req: &ControllerRequest) -> Response {
    CoreError::MismatchedRequest {
        expected,
        got: req.request_type(),
    }
    .into_response()
}

/// Map a tool run to a response; failures carry `code` and the tool's message.
pub fn tool_response(result: Result<ToolOutput, ExecError>, code: ResponseCode) -> Response {
    match result {
        Ok(out) => Response::ok(out.stdout.trim()),
        Err(e) => Response::error(code, e.to_string()),
    }
}

/// `{mir} {command} --root {repo_root}`.
pub fn dataset_tool(env: &InvokerEnv, command: &str, repo_root: &Path) -> Invocation {
    Invocation::new(&env.config.tool.mir_bin)
        .arg(command)
        .opt("--root", repo_root.display().to_string())
}

/// Repository root of `req`; only fails for requests that skipped the id checks.
pub fn repo_root(req: &ControllerRequest, env: &InvokerEnv) -> Result<PathBuf, Response> {
    env.layout
        .repo_root(&req.user_id, &req.repo_id)
        .ok_or_else(|| Response::error(ResponseCode::InvalidServiceRequest, "repo root unresolved"))
}
