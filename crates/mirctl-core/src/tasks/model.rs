use mirctl_model::{AnnotationFormat, ControllerRequest, RequestPayload, RequestType};

use crate::{
    checker::Prerequisite::{self, *},
    error::CoreError,
    invoker::TaskPlanner,
    orchestrator::{Plan, SubTaskDesc},
    steps::{
        ContainerPurpose, ContainerStep, ExportStep, ExportTarget, ImportSource, ImportStep,
        MergeStep, ModelSource, ModelStep,
    },
};

const CONTAINER_RULES: &[Prerequisite] = &[
    CheckUserId,
    CheckRepoId,
    CheckRepoRootExist,
    CheckTaskId,
    CheckDstDatasetId,
    CheckInDatasetIds,
];

fn image_of(req: &ControllerRequest, expected: RequestType) -> Result<&str, CoreError> {
    let image = match &req.payload {
        RequestPayload::Train { image, .. } if expected == RequestType::Train => image,
        RequestPayload::Mine { image, .. } if expected == RequestType::Mine => image,
        _ => {
            return Err(CoreError::MismatchedRequest {
                expected,
                got: req.request_type(),
            });
        }
    };
    if image.trim().is_empty() {
        return Err(CoreError::InvalidRequest("empty image".into()));
    }
    Ok(image)
}

/// Merge inputs, export them, run the trainer and store the resulting model.
pub struct TrainTask;

impl TaskPlanner for TrainTask {
    fn name(&self) -> &'static str {
        "train"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Train
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        CONTAINER_RULES
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        image_of(req, RequestType::Train)?;
        Plan::new(vec![
            SubTaskDesc::new(MergeStep, 0.1),
            SubTaskDesc::new(
                ExportStep {
                    target: ExportTarget::WorkDir(AnnotationFormat::Voc),
                },
                0.1,
            ),
            SubTaskDesc::new(
                ContainerStep {
                    purpose: ContainerPurpose::Train,
                },
                0.7,
            ),
            SubTaskDesc::new(
                ModelStep {
                    source: ModelSource::TrainingOutput,
                },
                0.1,
            ),
        ])
    }

    fn describe(&self, req: &ControllerRequest) -> String {
        format!("train on {}", req.in_dataset_ids.join(","))
    }
}

/// Merge inputs, export assets only, run the miner and import its ranking.
pub struct MineTask;

impl TaskPlanner for MineTask {
    fn name(&self) -> &'static str {
        "mine"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Mine
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        CONTAINER_RULES
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        image_of(req, RequestType::Mine)?;
        if let RequestPayload::Mine { top_k: Some(0), .. } = req.payload {
            return Err(CoreError::InvalidRequest("top_k must be positive".into()));
        }
        Plan::new(vec![
            SubTaskDesc::new(MergeStep, 0.1),
            SubTaskDesc::new(
                ExportStep {
                    target: ExportTarget::WorkDir(AnnotationFormat::None),
                },
                0.1,
            ),
            SubTaskDesc::new(
                ContainerStep {
                    purpose: ContainerPurpose::Mine,
                },
                0.7,
            ),
            SubTaskDesc::new(
                ImportStep {
                    source: ImportSource::MiningResult,
                },
                0.1,
            ),
        ])
    }

    fn describe(&self, req: &ControllerRequest) -> String {
        format!("mine {}", req.in_dataset_ids.join(","))
    }
}

pub struct ModelImportTask;

impl TaskPlanner for ModelImportTask {
    fn name(&self) -> &'static str {
        "model_import"
    }

    fn request_type(&self) -> RequestType {
        RequestType::ModelImport
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[
            CheckUserId,
            CheckRepoId,
            CheckRepoRootExist,
            CheckTaskId,
            CheckDstDatasetId,
        ]
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        let RequestPayload::ModelImport { package_path } = &req.payload else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::ModelImport,
                got: req.request_type(),
            });
        };
        if package_path.as_os_str().is_empty() {
            return Err(CoreError::InvalidRequest("empty package path".into()));
        }
        Ok(Plan::single(ModelStep {
            source: ModelSource::Request,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirctl_model::ResponseCode;

    fn train(image: &str) -> ControllerRequest {
        ControllerRequest::new(RequestPayload::Train {
            image: image.into(),
            config: String::new(),
            gpu_count: 1,
        })
    }

    #[test]
    fn train_plan_order() {
        let plan = TrainTask.plan(&train("trainer:1")).unwrap();
        assert_eq!(plan.names(), vec!["merge", "export", "train", "models"]);
    }

    #[test]
    fn mine_plan_order() {
        let req = ControllerRequest::new(RequestPayload::Mine {
            image: "miner:1".into(),
            config: String::new(),
            gpu_count: 0,
            top_k: None,
        });
        let plan = MineTask.plan(&req).unwrap();
        assert_eq!(plan.names(), vec!["merge", "export", "mine", "import"]);
    }

    #[test]
    fn blank_image_is_rejected() {
        let err = TrainTask.plan(&train("  ")).unwrap_err();
        assert_eq!(err.code(), ResponseCode::InvalidServiceRequest);
    }

    #[test]
    fn mine_planner_refuses_train_payload() {
        let err = MineTask.plan(&train("trainer:1")).unwrap_err();
        assert_eq!(err.code(), ResponseCode::MismatchedRequestType);
    }
}
