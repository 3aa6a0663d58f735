use mirctl_model::{ControllerRequest, RequestPayload, RequestType};

use crate::{
    checker::Prerequisite::{self, *},
    error::CoreError,
    invoker::{ExecutionMode, TaskPlanner},
    orchestrator::{Plan, SubTaskDesc},
    steps::{
        CopyStep, ExportStep, ExportTarget, FilterStep, FuseStep, ImportSource, ImportStep,
        MergeStep, SamplingStep,
    },
};

const MULTI_INPUT: &[Prerequisite] = &[
    CheckUserId,
    CheckRepoId,
    CheckRepoRootExist,
    CheckTaskId,
    CheckDstDatasetId,
    CheckInDatasetIds,
];

const SINGLE_INPUT: &[Prerequisite] = &[
    CheckUserId,
    CheckRepoId,
    CheckRepoRootExist,
    CheckTaskId,
    CheckDstDatasetId,
    CheckSingleInDatasetId,
];

fn expect_type(req: &ControllerRequest, expected: RequestType) -> Result<(), CoreError> {
    if req.request_type() == expected {
        Ok(())
    } else {
        Err(CoreError::MismatchedRequest {
            expected,
            got: req.request_type(),
        })
    }
}

/// Merge the inputs, then filter by class.
pub struct FilterTask;

impl TaskPlanner for FilterTask {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Filter
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        MULTI_INPUT
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sync
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        expect_type(req, RequestType::Filter)?;
        Plan::new(vec![
            SubTaskDesc::new(MergeStep, 0.5),
            SubTaskDesc::new(FilterStep, 0.5),
        ])
    }
}

pub struct MergeTask;

impl TaskPlanner for MergeTask {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Merge
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        MULTI_INPUT
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sync
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        expect_type(req, RequestType::Merge)?;
        Ok(Plan::single(MergeStep))
    }
}

/// Sample either `count` assets or a `rate` fraction of one dataset.
pub struct SamplingTask;

impl TaskPlanner for SamplingTask {
    fn name(&self) -> &'static str {
        "sampling"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Sampling
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        SINGLE_INPUT
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sync
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        let RequestPayload::Sampling { count, rate } = &req.payload else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::Sampling,
                got: req.request_type(),
            });
        };
        check_sample(*count, *rate, true)?;
        Ok(Plan::single(SamplingStep))
    }
}

/// At most one of `count`/`rate`; exactly one when `required`.
fn check_sample(count: Option<u64>, rate: Option<f64>, required: bool) -> Result<(), CoreError> {
    match (count, rate) {
        (Some(_), Some(_)) => Err(CoreError::InvalidRequest(
            "sample count and rate are exclusive".into(),
        )),
        (None, None) if required => Err(CoreError::InvalidRequest(
            "sample count or rate required".into(),
        )),
        (Some(0), None) => Err(CoreError::InvalidRequest("sample count must be positive".into())),
        (None, Some(r)) if !(r > 0.0 && r <= 1.0) => Err(CoreError::InvalidRequest(format!(
            "sample rate must be in (0, 1], got {r}"
        ))),
        _ => Ok(()),
    }
}

pub struct FusionTask;

impl TaskPlanner for FusionTask {
    fn name(&self) -> &'static str {
        "fusion"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Fusion
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        MULTI_INPUT
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        let RequestPayload::Fusion {
            sample_count,
            sample_rate,
            ..
        } = &req.payload
        else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::Fusion,
                got: req.request_type(),
            });
        };
        check_sample(*sample_count, *sample_rate, false)?;
        Ok(Plan::single(FuseStep))
    }
}

pub struct ImportTask;

impl TaskPlanner for ImportTask {
    fn name(&self) -> &'static str {
        "import"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Import
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
        let RequestPayload::Import { index_file, .. } = &req.payload else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::Import,
                got: req.request_type(),
            });
        };
        if index_file.as_os_str().is_empty() {
            return Err(CoreError::InvalidRequest("empty index file".into()));
        }
        Ok(Plan::single(ImportStep {
            source: ImportSource::Request,
        }))
    }

    fn describe(&self, req: &ControllerRequest) -> String {
        format!("import into {}", req.dst_dataset_id)
    }
}

pub struct ExportTask;

impl TaskPlanner for ExportTask {
    fn name(&self) -> &'static str {
        "export"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Export
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[
            CheckUserId,
            CheckRepoId,
            CheckRepoRootExist,
            CheckTaskId,
            CheckSingleInDatasetId,
        ]
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        let RequestPayload::Export { asset_dir, .. } = &req.payload else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::Export,
                got: req.request_type(),
            });
        };
        if asset_dir.as_os_str().is_empty() {
            return Err(CoreError::InvalidRequest("empty asset dir".into()));
        }
        Ok(Plan::single(ExportStep {
            target: ExportTarget::Request,
        }))
    }

    fn describe(&self, req: &ControllerRequest) -> String {
        format!("export {}", req.in_dataset_ids.join(","))
    }
}

pub struct CopyTask;

impl TaskPlanner for CopyTask {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Copy
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        SINGLE_INPUT
    }

    fn plan(&self, req: &ControllerRequest) -> Result<Plan, CoreError> {
        let RequestPayload::Copy {
            src_user_id,
            src_repo_id,
            ..
        } = &req.payload
        else {
            return Err(CoreError::MismatchedRequest {
                expected: RequestType::Copy,
                got: req.request_type(),
            });
        };
        if src_user_id.is_empty() || src_repo_id.is_empty() {
            return Err(CoreError::InvalidRequest("source user and repo required".into()));
        }
        Ok(Plan::single(CopyStep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirctl_model::ResponseCode;

    #[test]
    fn filter_is_merge_then_filter() {
        let plan = FilterTask
            .plan(&ControllerRequest::new(RequestPayload::Filter))
            .unwrap();
        assert_eq!(plan.names(), vec!["merge", "filter"]);
        assert_eq!(plan.weights(), vec![0.5, 0.5]);
    }

    #[test]
    fn sampling_needs_exactly_one_bound() {
        let both = ControllerRequest::new(RequestPayload::Sampling {
            count: Some(3),
            rate: Some(0.5),
        });
        let none = ControllerRequest::new(RequestPayload::Sampling {
            count: None,
            rate: None,
        });
        let bad_rate = ControllerRequest::new(RequestPayload::Sampling {
            count: None,
            rate: Some(1.5),
        });
        for req in [both, none, bad_rate] {
            let err = SamplingTask.plan(&req).unwrap_err();
            assert_eq!(err.code(), ResponseCode::InvalidServiceRequest);
        }
    }

    #[test]
    fn wrong_payload_is_mismatched() {
        let err = MergeTask
            .plan(&ControllerRequest::new(RequestPayload::Filter))
            .unwrap_err();
        assert_eq!(err.code(), ResponseCode::MismatchedRequestType);
    }
}
