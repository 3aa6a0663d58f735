use std::path::Path;

use async_trait::async_trait;
use mirctl_exec::Invocation;
use mirctl_model::{ControllerRequest, RequestPayload, Response, ResponseCode};
use tracing::info;

use super::ExportStep;
use crate::{
    env::InvokerEnv,
    invoker::{mismatched, tool_response},
    orchestrator::{SubTask, SubTaskContext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerPurpose {
    Train,
    Mine,
}

impl ContainerPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerPurpose::Train => "train",
            ContainerPurpose::Mine => "mine",
        }
    }
}

/// Run the user's training or mining image over the preceding export.
///
/// The container is named after the master task id so a terminate request can remove it.
/// GPUs are leased before start; an empty lease for a positive count fails the step.
pub struct ContainerStep {
    pub purpose: ContainerPurpose,
}

struct ContainerArgs<'a> {
    image: &'a str,
    config: &'a str,
    gpu_count: u32,
    top_k: Option<u32>,
}

impl ContainerStep {
    fn args<'a>(&self, req: &'a ControllerRequest) -> Option<ContainerArgs<'a>> {
        match (&req.payload, self.purpose) {
            (
                RequestPayload::Train {
                    image,
                    config,
                    gpu_count,
                },
                ContainerPurpose::Train,
            ) => Some(ContainerArgs {
                image,
                config,
                gpu_count: *gpu_count,
                top_k: None,
            }),
            (
                RequestPayload::Mine {
                    image,
                    config,
                    gpu_count,
                    top_k,
                },
                ContainerPurpose::Mine,
            ) => Some(ContainerArgs {
                image,
                config,
                gpu_count: *gpu_count,
                top_k: *top_k,
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl SubTask for ContainerStep {
    fn name(&self) -> &'static str {
        self.purpose.as_str()
    }

    fn produces_revision(&self) -> bool {
        false
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let Some(args) = self.args(req) else {
            return mismatched(req.request_type(), req);
        };
        let Some(export_dir) = ctx.previous_work_dir() else {
            return Response::error(ResponseCode::InvalidPlan, "container step has no export step");
        };

        let out_dir = ctx.work_dir.join("out");
        let config_file = ctx.work_dir.join("config.yaml");
        if let Err(e) = prepare(&out_dir, &config_file, args.config) {
            return Response::error(ResponseCode::InternalError, e.to_string());
        }

        let gpus = if args.gpu_count > 0 {
            match env.leases.lease(args.gpu_count as usize, true).await {
                Ok(ids) if ids.is_empty() => {
                    return Response::error(
                        ResponseCode::GpuUnavailable,
                        format!("{} gpu(s) requested, not enough free", args.gpu_count),
                    );
                }
                Ok(ids) => Some(ids),
                Err(e) => return e.into_response(),
            }
        } else {
            None
        };

        let inv = Invocation::new(&env.config.tool.docker_bin)
            .args(["run", "--rm"])
            .opt("--name", ctx.task_id.as_str())
            .opt("--shm-size", env.config.container.shm_size.as_str())
            .opt_if("--gpus", gpus.as_ref().map(|ids| format!("\"device={ids}\"")))
            .opt("-v", mount(&ExportStep::assets_dir(&export_dir), "/in/assets", true))
            .opt(
                "-v",
                mount(&ExportStep::annotations_dir(&export_dir), "/in/annotations", true),
            )
            .opt("-v", mount(&config_file, "/in/config.yaml", true))
            .opt("-v", mount(&out_dir, "/out", false))
            .opt("-e", format!("TASK_PURPOSE={}", self.purpose.as_str()))
            .opt_if("-e", args.top_k.map(|k| format!("TOP_K={k}")))
            .arg(args.image)
            .cwd(&ctx.work_dir)
            .owned_by(ctx.task_id.as_str());

        info!(task = %ctx.task_id, image = args.image, gpus = ?gpus, "container starting");
        tool_response(env.runner.run(&inv).await, ResponseCode::ContainerFailed)
    }
}

fn prepare(out_dir: &Path, config_file: &Path, config: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    std::fs::write(config_file, config)
}

fn mount(host: &Path, target: &str, read_only: bool) -> String {
    let suffix = if read_only { ":ro" } else { "" };
    format!("{}:{target}{suffix}", host.display())
}
