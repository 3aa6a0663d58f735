use std::sync::Arc;

use async_trait::async_trait;
use mirctl_exec::Invocation;
use mirctl_model::{
    ControllerRequest, RequestPayload, RequestType, Response, ResponseCode, TaskId, TerminateKind,
};
use tracing::{info, warn};

use crate::{
    checker::Prerequisite,
    env::InvokerEnv,
    error::CoreError,
    invoker::{Invoker, mismatched},
};

/// Stop the external work of another task.
///
/// `process` signals every process the target registered; `container` force-removes the
/// container named after the target. The target must be a well-formed task id, so nothing
/// but an id ever reaches the process table or the container runtime. Fire-and-forget: the target's own pipeline observes the
/// failure and reports it through its progress file.
pub struct TerminateInvoker;

#[async_trait]
impl Invoker for TerminateInvoker {
    fn name(&self) -> &'static str {
        "terminate"
    }

    fn request_type(&self) -> RequestType {
        RequestType::Terminate
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[]
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let RequestPayload::Terminate {
            target_task_id,
            kind,
        } = &req.payload
        else {
            return mismatched(self.request_type(), &req);
        };
        let target = match TaskId::parse(target_task_id) {
            Ok(id) => id,
            Err(e) => return CoreError::from(e).into_response(),
        };
        let target_task_id = target.as_str();

        match kind {
            TerminateKind::Process => {
                let table = env.runner.table();
                if !table.contains(target_task_id) {
                    return Response::error(
                        ResponseCode::TaskNotFound,
                        format!("no running process for {target_task_id}"),
                    );
                }
                let signalled = table.terminate(target_task_id);
                if signalled == 0 {
                    return Response::error(
                        ResponseCode::InternalError,
                        format!("could not signal {target_task_id}"),
                    );
                }
                info!(target = %target_task_id, signalled, "terminate sent");
                Response::ok(format!("{signalled} process(es) signalled"))
            }
            TerminateKind::Container => {
                let inv = Invocation::new(&env.config.tool.docker_bin)
                    .args(["rm", "-f"])
                    .arg(target_task_id);
                let runner = Arc::clone(&env.runner);
                tokio::spawn(async move {
                    if let Err(e) = runner.run(&inv).await {
                        warn!(target = %target, error = %e, "container removal failed");
                    }
                });
                Response::ok("container removal requested")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, TID, env};

    fn terminate(kind: TerminateKind) -> ControllerRequest {
        ControllerRequest::new(RequestPayload::Terminate {
            target_task_id: TID.into(),
            kind,
        })
    }

    #[tokio::test]
    async fn unknown_process_target_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir, RecordingRunner::new());
        let resp = TerminateInvoker
            .invoke(terminate(TerminateKind::Process), env)
            .await;
        assert_eq!(resp.code, ResponseCode::TaskNotFound);
    }

    #[tokio::test]
    async fn container_target_is_force_removed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let env = env(&dir, runner.clone());
        let resp = TerminateInvoker
            .invoke(terminate(TerminateKind::Container), env)
            .await;
        assert!(resp.is_ok());

        for _ in 0..50 {
            if !runner.calls().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(runner.calls()[0].command_line(), format!("docker rm -f {TID}"));
    }

    #[tokio::test]
    async fn malformed_target_is_rejected_before_any_action() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let env = env(&dir, runner.clone());

        for target in ["", "-rf", "--help", "../../etc"] {
            for kind in [TerminateKind::Container, TerminateKind::Process] {
                let req = ControllerRequest::new(RequestPayload::Terminate {
                    target_task_id: target.into(),
                    kind,
                });
                let resp = TerminateInvoker.invoke(req, env.clone()).await;
                assert_eq!(resp.code, ResponseCode::InvalidServiceRequest, "{target}");
            }
        }
        tokio::task::yield_now().await;
        assert!(runner.calls().is_empty());
    }
}
