use std::path::PathBuf;

use async_trait::async_trait;
use mirctl_model::{
    AnnotationFormat, ControllerRequest, MergeStrategy, RequestPayload, Response, ResponseCode,
    ResponseExt, Revision,
};

use super::{class_list, dataset_revisions, source_revisions, step_tool};
use crate::{
    env::InvokerEnv,
    invoker::{mismatched, tool_response},
    orchestrator::{SubTask, SubTaskContext},
};

/// Merge the request's input datasets (minus the excluded ones) into the output revision.
pub struct MergeStep;

#[async_trait]
impl SubTask for MergeStep {
    fn name(&self) -> &'static str {
        "merge"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let strategy = match &req.payload {
            RequestPayload::Merge { strategy } | RequestPayload::Fusion { strategy, .. } => *strategy,
            _ => MergeStrategy::default(),
        };
        let ex = (!req.ex_dataset_ids.is_empty()).then(|| dataset_revisions(&req.ex_dataset_ids));
        let tool = match step_tool(env, "merge", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let inv = tool
            .opt("--src-revs", dataset_revisions(&req.in_dataset_ids))
            .opt_if("--ex-src-revs", ex)
            .opt("--dst-rev", ctx.output_revision(req).to_string())
            .opt("-s", strategy.as_str());
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

/// Keep (`--cis`) or drop (`--ex-cis`) annotations by class.
pub struct FilterStep;

#[async_trait]
impl SubTask for FilterStep {
    fn name(&self) -> &'static str {
        "filter"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let tool = match step_tool(env, "filter", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let inv = tool
            .opt("--src-revs", source_revisions(ctx, req))
            .opt("--dst-rev", ctx.output_revision(req).to_string())
            .opt_if("--cis", class_list(&req.in_class_ids))
            .opt_if("--ex-cis", class_list(&req.ex_class_ids));
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

pub struct SamplingStep;

#[async_trait]
impl SubTask for SamplingStep {
    fn name(&self) -> &'static str {
        "sampling"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let RequestPayload::Sampling { count, rate } = &req.payload else {
            return mismatched(req.request_type(), req);
        };
        let tool = match step_tool(env, "sampling", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let inv = tool
            .opt("--src-revs", source_revisions(ctx, req))
            .opt("--dst-rev", ctx.output_revision(req).to_string())
            .opt_if("--count", count.map(|c| c.to_string()))
            .opt_if("--rate", rate.map(|r| r.to_string()));
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

/// Merge, filter and sample in one pass.
pub struct FuseStep;

#[async_trait]
impl SubTask for FuseStep {
    fn name(&self) -> &'static str {
        "fuse"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let RequestPayload::Fusion {
            strategy,
            sample_count,
            sample_rate,
        } = &req.payload
        else {
            return mismatched(req.request_type(), req);
        };
        let ex = (!req.ex_dataset_ids.is_empty()).then(|| dataset_revisions(&req.ex_dataset_ids));
        let tool = match step_tool(env, "fuse", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let inv = tool
            .opt("--src-revs", dataset_revisions(&req.in_dataset_ids))
            .opt_if("--ex-src-revs", ex)
            .opt("--dst-rev", ctx.output_revision(req).to_string())
            .opt("-s", strategy.as_str())
            .opt_if("--cis", class_list(&req.in_class_ids))
            .opt_if("--ex-cis", class_list(&req.ex_class_ids))
            .opt_if("--count", sample_count.map(|c| c.to_string()))
            .opt_if("--rate", sample_rate.map(|r| r.to_string()));
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

/// Copy one dataset out of another user's repository.
pub struct CopyStep;

#[async_trait]
impl SubTask for CopyStep {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let RequestPayload::Copy {
            src_user_id,
            src_repo_id,
            ignore_unknown_types,
        } = &req.payload
        else {
            return mismatched(req.request_type(), req);
        };
        let Some(src_root) = env.layout.repo_root(src_user_id, src_repo_id) else {
            return Response::error(
                ResponseCode::InvalidServiceRequest,
                "source repo root unresolved",
            );
        };
        if !src_root.is_dir() {
            return Response::error(
                ResponseCode::InvalidServiceRequest,
                format!("source repo not found: {}", src_root.display()),
            );
        }
        let tool = match step_tool(env, "copy", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let mut inv = tool
            .opt("--src-root", src_root.display().to_string())
            .opt("--src-revs", dataset_revisions(&req.in_dataset_ids))
            .opt("--dst-rev", ctx.output_revision(req).to_string());
        if *ignore_unknown_types {
            inv = inv.arg("--ignore-unknown-types");
        }
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource {
    /// Index file and annotation dirs named by the import request.
    Request,
    /// `out/result.tsv` written by the preceding mining container.
    MiningResult,
}

pub struct ImportStep {
    pub source: ImportSource,
}

#[async_trait]
impl SubTask for ImportStep {
    fn name(&self) -> &'static str {
        "import"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let tool = match step_tool(env, "import", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let base = tool
            .opt("--gen-abs", env.config.assets_location.display().to_string())
            .opt("--dst-rev", ctx.output_revision(req).to_string());

        let inv = match self.source {
            ImportSource::Request => {
                let RequestPayload::Import {
                    index_file,
                    annotation_dir,
                    prediction_dir,
                    unknown_types,
                } = &req.payload
                else {
                    return mismatched(req.request_type(), req);
                };
                base.opt("--index-file", index_file.display().to_string())
                    .opt_if("--anno", annotation_dir.as_ref().map(|p| p.display().to_string()))
                    .opt_if(
                        "--pred-dir",
                        prediction_dir.as_ref().map(|p| p.display().to_string()),
                    )
                    .opt("--unknown-types-strategy", unknown_types.as_str())
            }
            ImportSource::MiningResult => {
                let Some(prev) = ctx.previous_work_dir() else {
                    return Response::error(ResponseCode::InvalidPlan, "import has no mining step");
                };
                base.opt("--src-revs", source_revisions(ctx, req)).opt(
                    "--index-file",
                    prev.join("out").join("result.tsv").display().to_string(),
                )
            }
        };
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTarget {
    /// Directories and format named by the export request.
    Request,
    /// `{work_dir}/in/{assets,annotations}` for a following container or labeling step.
    WorkDir(AnnotationFormat),
}

/// Export assets (and annotations) of a revision to plain directories. Commits nothing.
pub struct ExportStep {
    pub target: ExportTarget,
}

impl ExportStep {
    /// Asset directory written under `work_dir` by [`ExportTarget::WorkDir`].
    pub fn assets_dir(work_dir: &std::path::Path) -> PathBuf {
        work_dir.join("in").join("assets")
    }

    pub fn annotations_dir(work_dir: &std::path::Path) -> PathBuf {
        work_dir.join("in").join("annotations")
    }
}

#[async_trait]
impl SubTask for ExportStep {
    fn name(&self) -> &'static str {
        "export"
    }

    fn produces_revision(&self) -> bool {
        false
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let (asset_dir, annotation_dir, format) = match self.target {
            ExportTarget::Request => {
                let RequestPayload::Export {
                    format,
                    asset_dir,
                    annotation_dir,
                } = &req.payload
                else {
                    return mismatched(req.request_type(), req);
                };
                (asset_dir.clone(), annotation_dir.clone(), *format)
            }
            ExportTarget::WorkDir(format) => {
                let annotations = (format != AnnotationFormat::None)
                    .then(|| Self::annotations_dir(&ctx.work_dir));
                (Self::assets_dir(&ctx.work_dir), annotations, format)
            }
        };
        for dir in std::iter::once(&asset_dir).chain(annotation_dir.as_ref()) {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return Response::error(
                    ResponseCode::InternalError,
                    format!("create {}: {e}", dir.display()),
                );
            }
        }

        let tool = match step_tool(env, "export", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let inv = tool
            .opt("--media-location", env.config.assets_location.display().to_string())
            .opt("--asset-dir", asset_dir.display().to_string())
            .opt_if(
                "--annotation-dir",
                annotation_dir.as_ref().map(|p| p.display().to_string()),
            )
            .opt("--src-revs", source_revisions(ctx, req))
            .opt("--format", format.as_str());
        tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    /// Package path named by the model-import request.
    Request,
    /// `out/models` written by the preceding training container.
    TrainingOutput,
}

/// Store a model package and record it on the output revision. The tool prints the model hash.
pub struct ModelStep {
    pub source: ModelSource,
}

#[async_trait]
impl SubTask for ModelStep {
    fn name(&self) -> &'static str {
        "models"
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let tool = match step_tool(env, "models", ctx) {
            Ok(inv) => inv,
            Err(resp) => return resp,
        };
        let base = tool
            .opt("--model-location", env.config.models_location.display().to_string())
            .opt("--dst-rev", ctx.output_revision(req).to_string());
        let inv = match self.source {
            ModelSource::Request => {
                let RequestPayload::ModelImport { package_path } = &req.payload else {
                    return mismatched(req.request_type(), req);
                };
                base.opt("--package-path", package_path.display().to_string())
            }
            ModelSource::TrainingOutput => {
                let Some(prev) = ctx.previous_work_dir() else {
                    return Response::error(ResponseCode::InvalidPlan, "model save has no training step");
                };
                base.opt("--package-path", prev.join("out").join("models").display().to_string())
                    .opt_if(
                        "--src-revs",
                        ctx.input_revision(req).as_ref().map(Revision::to_string),
                    )
            }
        };

        let resp = tool_response(env.runner.run(&inv).await, ResponseCode::ExternalToolFailed);
        if !resp.is_ok() || resp.message.is_empty() {
            return resp;
        }
        let hash = resp.message.lines().last().unwrap_or_default().trim().to_string();
        resp.with_ext(ResponseExt {
            hash_ids: vec![hash],
            ..Default::default()
        })
    }
}
