//! Pipelined request types: prerequisites, execution mode and sub-task plan of each.
use std::sync::Arc;

use crate::{invoker::PipelineInvoker, router::InvokerRouter};

mod dataset;
pub use dataset::{CopyTask, ExportTask, FilterTask, FusionTask, ImportTask, MergeTask, SamplingTask};

mod model;
pub use model::{MineTask, ModelImportTask, TrainTask};

mod label;
pub use label::LabelTask;

mod image;
pub use image::PullImageTask;

pub fn register_all(router: &mut InvokerRouter) {
    router.register(Arc::new(PipelineInvoker::new(FilterTask)));
    router.register(Arc::new(PipelineInvoker::new(MergeTask)));
    router.register(Arc::new(PipelineInvoker::new(SamplingTask)));
    router.register(Arc::new(PipelineInvoker::new(FusionTask)));
    router.register(Arc::new(PipelineInvoker::new(ImportTask)));
    router.register(Arc::new(PipelineInvoker::new(ExportTask)));
    router.register(Arc::new(PipelineInvoker::new(CopyTask)));
    router.register(Arc::new(PipelineInvoker::new(TrainTask)));
    router.register(Arc::new(PipelineInvoker::new(MineTask)));
    router.register(Arc::new(PipelineInvoker::new(ModelImportTask)));
    router.register(Arc::new(PipelineInvoker::new(LabelTask)));
    router.register(Arc::new(PipelineInvoker::new(PullImageTask)));
}

#[cfg(test)]
mod tests {
    use mirctl_model::{ControllerRequest, RequestPayload, RequestType};

    use super::*;
    use crate::invoker::TaskPlanner;

    fn weights_sum_to_one(planner: &dyn TaskPlanner, req: &ControllerRequest) {
        let plan = planner.plan(req).unwrap();
        let total: f64 = plan.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "{}: {total}", planner.name());
    }

    #[test]
    fn every_plan_is_weighted_to_one() {
        let train = ControllerRequest::new(RequestPayload::Train {
            image: "trainer:1".into(),
            config: String::new(),
            gpu_count: 1,
        });
        let mine = ControllerRequest::new(RequestPayload::Mine {
            image: "miner:1".into(),
            config: String::new(),
            gpu_count: 0,
            top_k: Some(10),
        });
        let sampling = ControllerRequest::new(RequestPayload::Sampling {
            count: Some(5),
            rate: None,
        });
        let import = ControllerRequest::new(RequestPayload::Import {
            index_file: "/idx.tsv".into(),
            annotation_dir: None,
            prediction_dir: None,
            unknown_types: Default::default(),
        });
        let copy = ControllerRequest::new(RequestPayload::Copy {
            src_user_id: "0002".into(),
            src_repo_id: "000001".into(),
            ignore_unknown_types: false,
        });
        let label = ControllerRequest::new(RequestPayload::Label {
            project_name: "p".into(),
            class_names: vec!["cat".into()],
        });
        let pull = ControllerRequest::new(RequestPayload::PullImage {
            image: "trainer:1".into(),
        });
        let export = ControllerRequest::new(RequestPayload::Export {
            format: Default::default(),
            asset_dir: "/out".into(),
            annotation_dir: None,
        });
        let models = ControllerRequest::new(RequestPayload::ModelImport {
            package_path: "/m.tar".into(),
        });

        weights_sum_to_one(&FilterTask, &ControllerRequest::new(RequestPayload::Filter));
        weights_sum_to_one(
            &MergeTask,
            &ControllerRequest::new(RequestPayload::Merge {
                strategy: Default::default(),
            }),
        );
        weights_sum_to_one(&SamplingTask, &sampling);
        weights_sum_to_one(
            &FusionTask,
            &ControllerRequest::new(RequestPayload::Fusion {
                strategy: Default::default(),
                sample_count: None,
                sample_rate: None,
            }),
        );
        weights_sum_to_one(&ImportTask, &import);
        weights_sum_to_one(&ExportTask, &export);
        weights_sum_to_one(&CopyTask, &copy);
        weights_sum_to_one(&TrainTask, &train);
        weights_sum_to_one(&MineTask, &mine);
        weights_sum_to_one(&LabelTask, &label);
        weights_sum_to_one(&ModelImportTask, &models);
        weights_sum_to_one(&PullImageTask, &pull);
    }

    #[test]
    fn standard_router_covers_every_type() {
        let router = InvokerRouter::standard();
        for kind in [
            RequestType::BranchList,
            RequestType::BranchCheckout,
            RequestType::BranchCreate,
            RequestType::BranchDelete,
            RequestType::Commit,
            RequestType::RepoInit,
            RequestType::Log,
            RequestType::RepoStatus,
            RequestType::LabelAdd,
            RequestType::LabelGet,
            RequestType::GpuInfo,
            RequestType::Terminate,
            RequestType::Filter,
            RequestType::Merge,
            RequestType::Import,
            RequestType::Export,
            RequestType::Copy,
            RequestType::Train,
            RequestType::Mine,
            RequestType::Label,
            RequestType::PullImage,
            RequestType::Sampling,
            RequestType::Fusion,
            RequestType::ModelImport,
        ] {
            let invoker = router.pick(kind).unwrap();
            assert_eq!(invoker.request_type(), kind);
        }
        assert_eq!(router.len(), 24);
    }
}
