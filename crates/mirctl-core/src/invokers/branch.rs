use std::sync::Arc;

use async_trait::async_trait;
use mirctl_model::{
    ControllerRequest, RequestPayload, RequestType, Response, ResponseCode, ResponseExt,
};

use crate::{
    checker::Prerequisite::{self, *},
    env::InvokerEnv,
    invoker::{Invoker, dataset_tool, mismatched, repo_root, tool_response},
};

const LIST_RULES: &[Prerequisite] = &[CheckUserId, CheckRepoId, CheckRepoRootExist];
const OP_RULES: &[Prerequisite] = &[CheckUserId, CheckRepoId, CheckRepoRootExist, CheckSingletonOp];

pub struct BranchListInvoker;

#[async_trait]
impl Invoker for BranchListInvoker {
    fn name(&self) -> &'static str {
        "branch_list"
    }

    fn request_type(&self) -> RequestType {
        RequestType::BranchList
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        LIST_RULES
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        let inv = dataset_tool(&env, "branch", &root).cwd(&root);
        let resp = tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed);
        if !resp.is_ok() {
            return resp;
        }
        let branches = parse_branches(&resp.message);
        Response::ok("").with_ext(ResponseExt {
            branches,
            ..Default::default()
        })
    }
}

/// One branch per line; the current one is prefixed with `* `.
fn parse_branches(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|l| l.trim().trim_start_matches("* ").trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct BranchCheckoutInvoker;

#[async_trait]
impl Invoker for BranchCheckoutInvoker {
    fn name(&self) -> &'static str {
        "branch_checkout"
    }

    fn request_type(&self) -> RequestType {
        RequestType::BranchCheckout
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        OP_RULES
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let RequestPayload::BranchCheckout { branch } = &req.payload else {
            return mismatched(self.request_type(), &req);
        };
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        let inv = dataset_tool(&env, "checkout", &root).arg(branch).cwd(&root);
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

pub struct BranchCreateInvoker;

#[async_trait]
impl Invoker for BranchCreateInvoker {
    fn name(&self) -> &'static str {
        "branch_create"
    }

    fn request_type(&self) -> RequestType {
        RequestType::BranchCreate
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        OP_RULES
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let RequestPayload::BranchCreate { branch } = &req.payload else {
            return mismatched(self.request_type(), &req);
        };
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        let inv = dataset_tool(&env, "checkout", &root)
            .arg("-b")
            .arg(branch)
            .cwd(&root);
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

pub struct BranchDeleteInvoker;

#[async_trait]
impl Invoker for BranchDeleteInvoker {
    fn name(&self) -> &'static str {
        "branch_delete"
    }

    fn request_type(&self) -> RequestType {
        RequestType::BranchDelete
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        OP_RULES
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let RequestPayload::BranchDelete { branch, force } = &req.payload else {
            return mismatched(self.request_type(), &req);
        };
        let root = match repo_root(&req, &env) {
            Ok(root) => root,
            Err(resp) => return resp,
        };
        let flag = if *force { "-D" } else { "-d" };
        let inv = dataset_tool(&env, "branch", &root)
            .arg(flag)
            .arg(branch)
            .cwd(&root);
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}
