//! Weighted sub-task pipelines.
//!
//! A task is a [`Plan`] of sub-tasks with weights summing to one. The [`Orchestrator`] runs them
//! strictly in order, stops at the first failure, and keeps the task's progress file current.
//! Sub-task `i` of `n` gets the id of the master task with offset `n - 1 - i`, so the last
//! sub-task carries the master id itself.
use std::{any::Any, fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use mirctl_model::{ControllerRequest, Response, ResponseCode, Revision, TaskId};
use tracing::{Instrument, debug, info, info_span};

use crate::{
    env::InvokerEnv,
    error::CoreError,
    layout::{SUB_TASK_DIR, TaskLayout},
    progress::ProgressWriter,
};

/// Upper bound on sub-tasks per plan; the offset field of a task id is one decimal digit.
pub const MAX_SUB_TASKS: usize = 10;
const WEIGHT_EPSILON: f64 = 1e-6;

/// One unit of pipeline work.
#[async_trait]
pub trait SubTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Whether this step commits a dataset revision that the next steps read.
    fn produces_revision(&self) -> bool {
        true
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv)
    -> Response;
}

/// Per-invocation context handed to a [`SubTask`].
#[derive(Debug, Clone)]
pub struct SubTaskContext {
    pub task_id: TaskId,
    pub sub_task_id: TaskId,
    /// Immediate predecessor, if any.
    pub previous_sub_task_id: Option<TaskId>,
    /// Most recent predecessor that committed a revision.
    pub input_sub_task_id: Option<TaskId>,
    pub sandbox_root: PathBuf,
    /// `None` for requests that name no repository.
    pub repo_root: Option<PathBuf>,
    pub task_work_dir: PathBuf,
    pub work_dir: PathBuf,
    pub progress_file: PathBuf,
}

impl SubTaskContext {
    /// Revision this step reads when it continues a pipeline: `dst@{input sub-task id}`.
    pub fn input_revision(&self, req: &ControllerRequest) -> Option<Revision> {
        self.input_sub_task_id
            .as_ref()
            .map(|id| Revision::new(&req.dst_dataset_id, id.as_str()))
    }

    /// Revision this step writes: `dst@{own sub-task id}`.
    pub fn output_revision(&self, req: &ControllerRequest) -> Revision {
        Revision::new(&req.dst_dataset_id, self.sub_task_id.as_str())
    }

    /// Work directory of the immediate predecessor.
    pub fn previous_work_dir(&self) -> Option<PathBuf> {
        self.previous_sub_task_id
            .as_ref()
            .map(|id| self.task_work_dir.join(SUB_TASK_DIR).join(id.as_str()))
    }
}

#[derive(Clone)]
pub struct SubTaskDesc {
    pub handler: Arc<dyn SubTask>,
    pub weight: f64,
}

impl SubTaskDesc {
    pub fn new(handler: impl SubTask, weight: f64) -> Self {
        Self {
            handler: Arc::new(handler),
            weight,
        }
    }
}

impl fmt::Debug for SubTaskDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubTaskDesc")
            .field("handler", &self.handler.name())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Validated, ordered list of sub-tasks.
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<SubTaskDesc>,
}

impl Plan {
    /// Rejects empty plans, plans longer than [`MAX_SUB_TASKS`], weights outside `(0, 1]` and
    /// weights that do not sum to one.
    pub fn new(steps: Vec<SubTaskDesc>) -> Result<Self, CoreError> {
        if steps.is_empty() {
            return Err(CoreError::InvalidPlan("no sub-tasks".into()));
        }
        if steps.len() > MAX_SUB_TASKS {
            return Err(CoreError::InvalidPlan(format!(
                "{} sub-tasks, at most {MAX_SUB_TASKS} allowed",
                steps.len()
            )));
        }
        if let Some(bad) = steps.iter().find(|s| !(s.weight > 0.0 && s.weight <= 1.0)) {
            return Err(CoreError::InvalidPlan(format!(
                "weight of {} out of range: {}",
                bad.handler.name(),
                bad.weight
            )));
        }
        let total: f64 = steps.iter().map(|s| s.weight).sum();
        if (total - 1.0).abs() > WEIGHT_EPSILON {
            return Err(CoreError::InvalidPlan(format!("weights sum to {total}")));
        }
        Ok(Self { steps })
    }

    pub fn single(handler: impl SubTask) -> Self {
        Self {
            steps: vec![SubTaskDesc::new(handler, 1.0)],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.handler.name()).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.weight).collect()
    }
}

pub struct Orchestrator {
    env: Arc<InvokerEnv>,
}

impl Orchestrator {
    pub fn new(env: Arc<InvokerEnv>) -> Self {
        Self { env }
    }

    /// Run `plan` to completion or first failure.
    ///
    /// The progress file ends at `1.00 done` on success and at `1.00 error` with the failing
    /// sub-task's code and message otherwise. The returned response is the last sub-task's.
    pub async fn run(
        &self,
        req: Arc<ControllerRequest>,
        plan: Plan,
        task: &TaskLayout,
    ) -> Response {
        let writer = ProgressWriter::new(&task.progress_file, task.task_id.as_str());
        let span = info_span!("task", id = %task.task_id, kind = %task.request_type);

        let response = self
            .run_steps(req, plan, task, &writer)
            .instrument(span)
            .await;

        if response.is_ok() {
            writer.report(writer.done());
            info!(task = %task.task_id, "task done");
        }
        response
    }

    async fn run_steps(
        &self,
        req: Arc<ControllerRequest>,
        plan: Plan,
        task: &TaskLayout,
        writer: &ProgressWriter,
    ) -> Response {
        let repo_root = self.env.layout.repo_root(&req.user_id, &req.repo_id);
        let total = plan.len();
        let mut completed = 0.0;
        let mut previous: Option<TaskId> = None;
        let mut input: Option<TaskId> = None;
        let mut last = Response::ok("");

        writer.report(writer.running(0.0));

        for (i, step) in plan.steps.into_iter().enumerate() {
            let offset = (total - 1 - i) as u8;
            let sub_task_id = match task.task_id.sub_task(offset) {
                Ok(id) => id,
                Err(e) => return fail(writer, ResponseCode::InvalidPlan, &e.to_string(), None),
            };
            let work_dir = task.sub_task_dir(&sub_task_id);
            if let Err(e) = std::fs::create_dir_all(&work_dir) {
                return fail(
                    writer,
                    ResponseCode::InternalError,
                    &format!("create {}: {e}", work_dir.display()),
                    None,
                );
            }

            let ctx = SubTaskContext {
                task_id: task.task_id.clone(),
                sub_task_id: sub_task_id.clone(),
                previous_sub_task_id: previous.clone(),
                input_sub_task_id: input.clone(),
                sandbox_root: self.env.layout.root().to_path_buf(),
                repo_root: repo_root.clone(),
                task_work_dir: task.work_dir.clone(),
                work_dir,
                progress_file: task.progress_file.clone(),
            };

            let name = step.handler.name();
            debug!(sub_task = name, id = %sub_task_id, "sub-task started");
            let (response, trace) = run_guarded(
                Arc::clone(&step.handler),
                Arc::clone(&req),
                ctx,
                Arc::clone(&self.env),
            )
            .await;

            if !response.is_ok() {
                let message = format!("{name}: {}", response.message);
                fail(writer, response.code, &message, trace.as_deref());
                return Response {
                    message,
                    ..response
                };
            }

            completed += step.weight;
            writer.report(writer.running(completed.min(1.0)));
            debug!(sub_task = name, progress = completed, "sub-task done");

            if step.handler.produces_revision() {
                input = Some(sub_task_id.clone());
            }
            previous = Some(sub_task_id);
            last = response;
        }
        last
    }
}

fn fail(writer: &ProgressWriter, code: ResponseCode, message: &str, trace: Option<&str>) -> Response {
    writer.report(writer.failed(code, message, trace));
    Response::error(code, message)
}

/// Run one sub-task on its own tokio task so a panic is contained and reported.
async fn run_guarded(
    handler: Arc<dyn SubTask>,
    req: Arc<ControllerRequest>,
    ctx: SubTaskContext,
    env: Arc<InvokerEnv>,
) -> (Response, Option<String>) {
    let name = handler.name();
    let joined = tokio::spawn(async move { handler.run(&req, &ctx, &env).await }).await;
    match joined {
        Ok(response) => (response, None),
        Err(e) if e.is_panic() => {
            let payload = panic_message(e.into_panic());
            (
                Response::error(ResponseCode::InternalError, format!("{name} panicked")),
                Some(payload),
            )
        }
        Err(e) => (
            Response::error(ResponseCode::InternalError, format!("{name} cancelled: {e}")),
            None,
        ),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
