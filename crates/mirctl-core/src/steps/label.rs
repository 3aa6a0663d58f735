use std::path::PathBuf;

use async_trait::async_trait;
use mirctl_model::{ControllerRequest, RequestPayload, Response, ResponseCode};
use serde::{Deserialize, Serialize};

use super::ExportStep;
use crate::{
    env::InvokerEnv,
    invoker::mismatched,
    labeltool::LabelProjectSpec,
    orchestrator::{SubTask, SubTaskContext},
};

/// Stored per task in the label-task hash so the import side can find the project later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelProjectMeta {
    pub project_id: i64,
    pub export_dir: PathBuf,
    pub import_dir: PathBuf,
    pub dst_rev: String,
}

/// Create a labeling project over the preceding export and record it in the shared store.
pub struct LabelProjectStep;

#[async_trait]
impl SubTask for LabelProjectStep {
    fn name(&self) -> &'static str {
        "label_project"
    }

    fn produces_revision(&self) -> bool {
        false
    }

    async fn run(&self, req: &ControllerRequest, ctx: &SubTaskContext, env: &InvokerEnv) -> Response {
        let RequestPayload::Label {
            project_name,
            class_names,
        } = &req.payload
        else {
            return mismatched(req.request_type(), req);
        };
        let Some(export_dir) = ctx.previous_work_dir() else {
            return Response::error(ResponseCode::InvalidPlan, "labeling has no export step");
        };
        let import_dir = ctx.work_dir.join("import");
        if let Err(e) = std::fs::create_dir_all(&import_dir) {
            return Response::error(ResponseCode::InternalError, e.to_string());
        }

        let spec = LabelProjectSpec {
            name: project_name.clone(),
            class_names: class_names.clone(),
            asset_dir: ExportStep::assets_dir(&export_dir),
            import_dir: import_dir.clone(),
        };
        let project_id = match env.label_tool.create_project(&spec).await {
            Ok(id) => id,
            Err(e) => return e.into_response(),
        };

        let meta = LabelProjectMeta {
            project_id,
            export_dir,
            import_dir,
            dst_rev: ctx.output_revision(req).to_string(),
        };
        let value = match serde_json::to_string(&meta) {
            Ok(v) => v,
            Err(e) => return Response::error(ResponseCode::InternalError, e.to_string()),
        };
        if let Err(e) = env
            .store
            .hset(&env.config.store.label_task_key, ctx.task_id.as_str(), &value)
            .await
        {
            return Response::error(ResponseCode::SharedStoreFailed, e.to_string());
        }
        Response::ok(format!("labeling project {project_id} created"))
    }
}
