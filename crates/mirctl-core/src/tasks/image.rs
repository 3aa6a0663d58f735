use mirctl_model::{ControllerRequest, RequestPayload, RequestType};

use crate::{
    checker::Prerequisite::{self, *},
    error::CoreError,
    invoker::{ExecutionMode, TaskPlanner},
    orchestrator::{Plan, SubTaskDesc},
    steps::{InspectStep, PullStep},
};

/// Pull an image and report its hash.
///
/// Runs synchronously so the hash reaches the caller in the response.
pub struct PullImageTask;

impl TaskPlanner for PullImageTask {
    fn name(&self) -> &'static str {
        "pull_image"
    }

    fn request_type(&self) -> RequestType {
        RequestType::PullImage
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[CheckTaskId, CheckSingletonOp]
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sync
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        if !matches!(req.payload, RequestPayload::PullImage { .. }) {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::PullImage,
                got: req.request_type(),
            });
        }
        Plan::new(vec![
            SubTaskDesc::new(PullStep, 0.8),
            SubTaskDesc::new(InspectStep, 0.2),
        ])
    }

    fn describe(&self, req: &ControllerRequest) -> String {
        format!("pull {}", req.payload.singleton_op().unwrap_or_default())
    }
}
