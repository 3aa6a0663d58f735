//! Sub-task implementations shared by the task planners.
//!
//! Dataset steps read `dst@{input sub-task}` when continuing a pipeline (or the request's input
//! datasets when first) and commit `dst@{own sub-task}`.
use mirctl_exec::Invocation;
use mirctl_model::{ClassId, ControllerRequest, Response, ResponseCode, Revision, join_revisions};

use crate::{env::InvokerEnv, invoker::dataset_tool, orchestrator::SubTaskContext};

mod dataset;
pub use dataset::{
    CopyStep, ExportStep, ExportTarget, FilterStep, FuseStep, ImportSource, ImportStep,
    MergeStep, ModelSource, ModelStep, SamplingStep,
};

mod container;
pub use container::{ContainerPurpose, ContainerStep};

mod label;
pub use label::{LabelProjectMeta, LabelProjectStep};

mod image;
pub use image::{InspectStep, PullStep};

/// Dataset tool invocation scoped to a sub-task: repo root, scratch dir, owner.
///
/// Fails when the request names no repository.
pub(crate) fn step_tool(
    env: &InvokerEnv,
    command: &str,
    ctx: &SubTaskContext,
) -> Result<Invocation, Response> {
    let Some(repo_root) = ctx.repo_root.as_deref() else {
        return Err(Response::error(
            ResponseCode::InvalidServiceRequest,
            "repo root unresolved",
        ));
    };
    Ok(dataset_tool(env, command, repo_root)
        .opt("-w", ctx.work_dir.display().to_string())
        .cwd(&ctx.work_dir)
        .owned_by(ctx.task_id.as_str()))
}

/// Revisions a step reads: the pipeline's input revision, else the request's input datasets.
pub(crate) fn source_revisions(ctx: &SubTaskContext, req: &ControllerRequest) -> String {
    match ctx.input_revision(req) {
        Some(rev) => rev.to_string(),
        None => dataset_revisions(&req.in_dataset_ids),
    }
}

pub(crate) fn dataset_revisions(ids: &[String]) -> String {
    let revs: Vec<Revision> = ids.iter().map(|id| Revision::of_dataset(id)).collect();
    join_revisions(&revs)
}

/// `;`-joined class ids, `None` when empty.
pub(crate) fn class_list(ids: &[ClassId]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    Some(
        ids.iter()
            .map(ClassId::to_string)
            .collect::<Vec<_>>()
            .join(";"),
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use mirctl_model::TaskId;

    use super::*;
    use crate::testing::{RecordingRunner, TID, env};

    fn context(repo_root: Option<PathBuf>) -> SubTaskContext {
        let id = TaskId::parse(TID).unwrap();
        SubTaskContext {
            task_id: id.clone(),
            sub_task_id: id,
            previous_sub_task_id: None,
            input_sub_task_id: None,
            sandbox_root: PathBuf::from("/sb"),
            repo_root,
            task_work_dir: PathBuf::from("/w"),
            work_dir: PathBuf::from("/w/sub_task/x"),
            progress_file: PathBuf::from("/w/monitor.txt"),
        }
    }

    #[test]
    fn step_tool_targets_the_repo() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir, RecordingRunner::new());
        let inv = step_tool(&env, "merge", &context(Some(PathBuf::from("/sb/0001/000042")))).unwrap();
        assert_eq!(inv.subcommand(), Some("merge"));
        assert!(inv.args.iter().any(|a| a == "/sb/0001/000042"));
    }

    #[test]
    fn step_tool_without_repo_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir, RecordingRunner::new());
        let resp = step_tool(&env, "merge", &context(None)).unwrap_err();
        assert_eq!(resp.code, ResponseCode::InvalidServiceRequest);
    }

    #[test]
    fn class_lists() {
        assert_eq!(class_list(&[]), None);
        assert_eq!(class_list(&[1, 5]).as_deref(), Some("1;5"));
    }

    #[test]
    fn dataset_revisions_are_self_qualified() {
        assert_eq!(dataset_revisions(&["a".into(), "b".into()]), "a@a;b@b");
    }
}
