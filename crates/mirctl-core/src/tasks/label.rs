use mirctl_model::{AnnotationFormat, ControllerRequest, RequestPayload, RequestType};

use crate::{
    checker::Prerequisite::{self, *},
    error::CoreError,
    invoker::TaskPlanner,
    orchestrator::{Plan, SubTaskDesc},
    steps::{ExportStep, ExportTarget, LabelProjectStep},
};

/// Export one dataset and open a labeling project over it.
pub struct LabelTask;

impl TaskPlanner for LabelTask {
    fn name(&self) -> &'static str {
        "label"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Label
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[
            CheckUserId,
            CheckRepoId,
            CheckRepoRootExist,
            CheckTaskId,
            CheckDstDatasetId,
            CheckSingleInDatasetId,
        ]
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        let RequestPayload::Label {
            project_name,
            class_names,
        } = &req.payload
        else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::Label,
                got: req.request_type(),
            });
        };
        if project_name.trim().is_empty() {
            return Err(CoreError::InvalidRequest("empty project name".into()));
        }
        if class_names.is_empty() {
            return Err(CoreError::InvalidRequest("no class names".into()));
        }
        Plan::new(vec![
            SubTaskDesc::new(
                ExportStep {
                    target: ExportTarget::WorkDir(AnnotationFormat::Voc),
                },
                0.3,
            ),
            SubTaskDesc::new(LabelProjectStep, 0.7),
        ])
    }

    fn describe(&self, req: &ControllerRequest) -> String {
        match &req.payload {
            RequestPayload::Label { project_name, .. } => format!("label project {project_name}"),
            _ => self.name().to_string(),
        }
    }
}
