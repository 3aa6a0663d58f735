use async_trait::async_trait;
use mirctl_exec::Invocation;
use mirctl_model::{ControllerRequest, RequestPayload, Response, ResponseCode, ResponseExt};

use crate::{
    env::InvokerEnv,
    invoker::{mismatched, tool_response},
    orchestrator::{SubTask, SubTaskContext},
};

fn image(req: &ControllerRequest) -> Option<&str> {
    match &req.payload {
        RequestPayload::PullImage { image } => Some(image),
        _ => None,
    }
}

pub struct PullStep;

#[async_trait]
impl SubTask for PullStep {
    fn name(&self) -> &'static str {
        "pull"
    }

    fn produces_revision(&self) -> bool {
        false
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let Some(image) = image(req) else {
            return mismatched(req.request_type(), req);
        };
        let inv = Invocation::new(&env.config.tool.docker_bin)
            .arg("pull")
            .arg(image)
            .owned_by(ctx.task_id.as_str());
        tool_response(env.runner.run(&inv).await, ResponseCode::ImagePullFailed)
    }
}

/// Resolve the pulled image's id; reported as `image_hash`.
pub struct InspectStep;

#[async_trait]
impl SubTask for InspectStep {
    fn name(&self) -> &'static str {
        "inspect"
    }

    fn produces_revision(&self) -> bool {
        false
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let Some(image) = image(req) else {
            return mismatched(req.request_type(), req);
        };
        let inv = Invocation::new(&env.config.tool.docker_bin)
            .args(["image", "inspect", "--format", "{{.Id}}"])
            .arg(image)
            .owned_by(ctx.task_id.as_str());
        let resp = tool_response(env.runner.run(&inv).await, ResponseCode::ImagePullFailed);
        if !resp.is_ok() {
            return resp;
        }
        let hash = resp.message.clone();
        resp.with_ext(ResponseExt {
            image_hash: Some(hash),
            ..Default::default()
        })
    }
}
