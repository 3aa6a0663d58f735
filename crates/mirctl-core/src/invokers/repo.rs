use std::sync::Arc;

use async_trait::async_trait;
use mirctl_model::{
    ControllerRequest, RequestPayload, RequestType, Response, ResponseCode, ResponseExt, Revision,
};
use tracing::warn;

use crate::{
    checker::Prerequisite::{self, *},
    env::InvokerEnv,
    invoker::{Invoker, dataset_tool, mismatched, repo_root, tool_response},
};

const DEFAULT_BRANCH: &str = "master";

pub struct CommitInvoker;

#[async_trait]
impl Invoker for CommitInvoker {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Commit
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[CheckUserId, CheckRepoId, CheckRepoRootExist, CheckCommitMessage]
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let RequestPayload::Commit { message } = &req.payload else {
            return mismatched(self.request_type(), &req);
        };
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        let inv = dataset_tool(&env, "commit", &root)
            .opt("-m", message)
            .cwd(&root);
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

/// Create the repository root and an empty first revision `{dst or master}@{task_id}`.
pub struct RepoInitInvoker;

#[async_trait]
impl Invoker for RepoInitInvoker {
    fn name(&self) -> &'static str {
        "repo_init"
    }

    fn request_type(&self) -> RequestType {
        RequestType::RepoInit
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[CheckUserId, CheckRepoId, CheckRepoRootNotExist, CheckTaskId]
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        if let Err(e) = std::fs::create_dir_all(&root) {
            return Response::error(
                ResponseCode::InternalError,
                format!("create {}: {e}", root.display()),
            );
        }

        let branch = if req.dst_dataset_id.is_empty() {
            DEFAULT_BRANCH
        } else {
            req.dst_dataset_id.as_str()
        };
        let rev = Revision::new(branch, &req.task_id);
        let inv = dataset_tool(&env, "init", &root)
            .opt("--with-empty-rev", rev.to_string())
            .cwd(&root);
        let resp = tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed);

        // A half-initialized root would block every retry on the not-exist rule.
        if !resp.is_ok() {
            if let Err(e) = std::fs::remove_dir_all(&root) {
                warn!(root = %root.display(), error = %e, "cleanup after failed init");
            }
        }
        resp
    }
}

pub struct LogInvoker;

#[async_trait]
impl Invoker for LogInvoker {
    fn name(&self) -> &'static str {
        "log"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Log
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[CheckUserId, CheckRepoId, CheckRepoRootExist]
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        let inv = dataset_tool(&env, "log", &root).cwd(&root);
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

/// Whether the repository root exists. Never spawns anything.
pub struct RepoStatusInvoker;

#[async_trait]
impl Invoker for RepoStatusInvoker {
    fn name(&self) -> &'static str {
        "repo_status"
    }

    fn request_type(&self) -> RequestType {
        RequestType::RepoStatus
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[CheckUserId, CheckRepoId]
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        Response::ok("").with_ext(ResponseExt {
            repo_exists: Some(root.is_dir()),
            ..Default::default()
        })
    }
}
