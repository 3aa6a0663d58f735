//! Requests driven end to end through the dispatcher.
use std::sync::Arc;

use mirctl_exec::ExecError;
use mirctl_model::{
    ControllerRequest, RequestPayload, RequestType, ResponseCode, TaskId, TaskState,
    TerminateKind,
};
use tempfile::TempDir;

use super::*;
use crate::{
    config::ControllerConfig,
    invoker::PipelineInvoker,
    progress::read_progress,
    store::MemoryStore,
    tasks::MergeTask,
    testing::{self, FixedLabelTool, RecordingMonitor, RecordingRunner, TID},
};

fn dispatcher(dir: &TempDir, runner: Arc<RecordingRunner>) -> Dispatcher {
    Dispatcher::new(InvokerRouter::standard(), testing::env(dir, runner))
}

fn filter_request() -> ControllerRequest {
    ControllerRequest::new(RequestPayload::Filter)
        .with_user("0001")
        .with_repo("000042")
        .with_task_id(TID)
        .with_dst_dataset("d1")
        .with_in_datasets(["a", "b"])
        .with_classes(vec![1, 2], vec![])
}

fn progress_of(d: &Dispatcher, kind: RequestType) -> std::path::PathBuf {
    let tid = TaskId::parse(TID).unwrap();
    d.env().layout.task(kind, &tid).progress_file
}

#[tokio::test]
async fn sync_filter_runs_both_steps_and_finishes() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    let d = dispatcher(&dir, runner.clone());

    let resp = d.dispatch(filter_request()).await;
    assert!(resp.is_ok(), "{resp:?}");
    assert_eq!(runner.subcommands(), vec!["merge", "filter"]);

    let rec = read_progress(progress_of(&d, RequestType::Filter)).unwrap();
    assert_eq!(rec.state, TaskState::Done);
    assert_eq!(rec.percent, 1.0);
    assert_eq!(rec.task_id, TID);
}

#[tokio::test]
async fn failing_step_stops_the_pipeline() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    runner.fail(
        "merge",
        ExecError::NonZeroExit {
            code: 2,
            stderr: "conflict".into(),
        },
    );
    let d = dispatcher(&dir, runner.clone());

    let resp = d.dispatch(filter_request()).await;
    assert_eq!(resp.code, ResponseCode::ExternalToolFailed);
    assert!(resp.message.starts_with("merge: "), "{}", resp.message);
    assert_eq!(runner.subcommands(), vec!["merge"]);

    let rec = read_progress(progress_of(&d, RequestType::Filter)).unwrap();
    assert_eq!(rec.state, TaskState::Error);
    assert_eq!(rec.percent, 1.0);
    assert_eq!(rec.error_code, Some(ResponseCode::ExternalToolFailed));
}

#[tokio::test]
async fn rejected_request_touches_nothing() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    let d = dispatcher(&dir, runner.clone());

    let req = filter_request().with_dst_dataset("");
    let resp = d.dispatch(req).await;
    assert_eq!(resp.code, ResponseCode::InvalidServiceRequest);
    assert!(runner.calls().is_empty());
    assert!(!progress_of(&d, RequestType::Filter).exists());
}

#[tokio::test]
async fn async_train_completes_on_the_pool() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    runner.respond("models", "model-hash-1\n");
    let d = dispatcher(&dir, runner.clone());
    let mut done = d.env().pool.subscribe();

    let req = ControllerRequest::new(RequestPayload::Train {
        image: "trainer:1".into(),
        config: "epochs: 1".into(),
        gpu_count: 1,
    })
    .with_user("0001")
    .with_repo("000042")
    .with_task_id(TID)
    .with_dst_dataset("d1")
    .with_in_datasets(["a"]);

    let resp = d.dispatch(req).await;
    assert!(resp.is_ok());
    assert_eq!(resp.message, "task accepted");

    let completion = done.recv().await.unwrap();
    assert_eq!(completion.task_id.as_str(), TID);
    assert!(completion.response.is_ok(), "{:?}", completion.response);
    assert_eq!(completion.response.ext.hash_ids, vec!["model-hash-1"]);
    assert_eq!(runner.subcommands(), vec!["merge", "export", "run", "models"]);

    let docker = &runner.calls()[2];
    assert!(docker.args.contains(&"\"device=0\"".to_string()));
    assert!(docker.args.contains(&TID.to_string()));

    let locks = d
        .env()
        .store
        .zrange_all(&d.env().config.gpu.lock_key)
        .await
        .unwrap();
    assert_eq!(locks.len(), 1);

    let rec = read_progress(progress_of(&d, RequestType::Train)).unwrap();
    assert_eq!(rec.state, TaskState::Done);
}

#[tokio::test]
async fn unknown_type_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let runner = RecordingRunner::new();
    let d = Dispatcher::new(InvokerRouter::new(), testing::env(&dir, runner));

    let resp = d.dispatch(ControllerRequest::new(RequestPayload::GpuInfo)).await;
    assert_eq!(resp.code, ResponseCode::UnsupportedRequestType);
}

#[test]
fn wrong_invoker_reports_mismatch() {
    let dir = TempDir::new().unwrap();
    let env = testing::env(&dir, RecordingRunner::new());
    let invoker = PipelineInvoker::new(MergeTask);

    let resp = invoker.pre_invoke(&filter_request(), &env);
    assert_eq!(resp.code, ResponseCode::MismatchedRequestType);
}

#[tokio::test]
async fn monitor_outage_fails_before_any_work() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    let config = ControllerConfig {
        sandbox_root: dir.path().to_path_buf(),
        ..ControllerConfig::default()
    };
    let env = InvokerEnv::builder(config)
        .with_runner(runner.clone())
        .with_store(Arc::new(MemoryStore::new()))
        .with_monitor(Arc::new(RecordingMonitor {
            unavailable: true,
            ..Default::default()
        }))
        .with_label_tool(Arc::new(FixedLabelTool::default()))
        .build()
        .unwrap();
    let d = Dispatcher::new(InvokerRouter::standard(), Arc::new(env));

    let resp = d.dispatch(filter_request()).await;
    assert_eq!(resp.code, ResponseCode::MonitorUnavailable);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn terminate_unknown_task_is_not_found() {
    let dir = TempDir::new().unwrap();
    let d = dispatcher(&dir, RecordingRunner::new());

    let req = ControllerRequest::new(RequestPayload::Terminate {
        target_task_id: TID.into(),
        kind: TerminateKind::Process,
    });
    let resp = d.dispatch(req).await;
    assert_eq!(resp.code, ResponseCode::TaskNotFound);
}

#[tokio::test]
async fn pull_image_reports_the_hash() {
    let dir = TempDir::new().unwrap();
    let runner = RecordingRunner::new();
    runner.respond("image", "sha256:abc\n");
    let d = dispatcher(&dir, runner.clone());

    let req = ControllerRequest::new(RequestPayload::PullImage {
        image: "trainer:1".into(),
    })
    .with_task_id(TID);
    let resp = d.dispatch(req).await;
    assert!(resp.is_ok(), "{resp:?}");
    assert_eq!(resp.ext.image_hash.as_deref(), Some("sha256:abc"));
    assert_eq!(runner.subcommands(), vec!["pull", "image"]);
}

#[tokio::test]
async fn label_task_records_its_project() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    let d = dispatcher(&dir, runner.clone());
    let mut done = d.env().pool.subscribe();

    let req = ControllerRequest::new(RequestPayload::Label {
        project_name: "cats".into(),
        class_names: vec!["cat".into()],
    })
    .with_user("0001")
    .with_repo("000042")
    .with_task_id(TID)
    .with_dst_dataset("d1")
    .with_in_datasets(["a"]);
    assert!(d.dispatch(req).await.is_ok());

    let completion = done.recv().await.unwrap();
    assert!(completion.response.is_ok(), "{:?}", completion.response);

    let env = d.env();
    let raw = env
        .store
        .hget(&env.config.store.label_task_key, TID)
        .await
        .unwrap()
        .unwrap();
    let meta: crate::steps::LabelProjectMeta = serde_json::from_str(&raw).unwrap();
    assert_eq!(meta.project_id, 7);
    assert!(meta.dst_rev.starts_with("d1@"));
}

#[tokio::test]
async fn running_task_id_is_not_admitted_twice() {
    let dir = TempDir::new().unwrap();
    testing::make_repo(&dir);
    let runner = RecordingRunner::new();
    let d = dispatcher(&dir, runner.clone());

    let held = d.env().pool.admit(&TaskId::parse(TID).unwrap()).unwrap();
    let resp = d.dispatch(filter_request()).await;
    assert_eq!(resp.code, ResponseCode::InvalidServiceRequest);
    assert!(resp.message.contains("already running"), "{}", resp.message);
    assert!(runner.calls().is_empty());
    assert!(!progress_of(&d, RequestType::Filter).exists());

    drop(held);
    assert!(d.dispatch(filter_request()).await.is_ok());
}
