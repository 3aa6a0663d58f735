use std::sync::Arc;

use async_trait::async_trait;
use mirctl_model::{
    ControllerRequest, RequestPayload, RequestType, Response, ResponseCode, ResponseExt,
};

use crate::{
    checker::Prerequisite::{self, *},
    env::InvokerEnv,
    invoker::{Invoker, mismatched},
    registry::LabelRegistry,
};

const RULES: &[Prerequisite] = &[CheckUserId, CheckUserRootExist];

fn open(req: &ControllerRequest, env: &InvokerEnv) -> Result<LabelRegistry, Response> {
    let path = env.layout.labels_file(&req.user_id).ok_or_else(|| {
        Response::error(ResponseCode::InvalidServiceRequest, "user root unresolved")
    })?;
    LabelRegistry::load(path).map_err(|e| e.into_response())
}

/// Add labels to the user's registry. Conflicting names are reported and nothing is written.
pub struct LabelAddInvoker;

#[async_trait]
impl Invoker for LabelAddInvoker {
    fn name(&self) -> &'static str {
        "label_add"
    }

    fn request_type(&self) -> RequestType {
        RequestType::LabelAdd
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        RULES
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        let RequestPayload::LabelAdd { labels, dry_run } = &req.payload else {
            return mismatched(self.request_type(), &req);
        };
        let lock = env.label_locks.for_user(&req.user_id);
        let _guard = lock.lock().await;
        let mut registry = match open(&req, &env) {
            Ok(r) => r,
            Err(resp) => return resp,
        };
        let outcome = match registry.add(labels, *dry_run) {
            Ok(o) => o,
            Err(e) => return e.into_response(),
        };

        let message = if !outcome.conflicts.is_empty() {
            format!("{} label conflicts", outcome.conflicts.len())
        } else if outcome.written {
            "labels added".to_string()
        } else {
            "dry run".to_string()
        };
        Response::ok(message).with_ext(ResponseExt {
            label_conflicts: outcome.conflicts,
            labels: outcome.labels,
            ..Default::default()
        })
    }
}

pub struct LabelGetInvoker;

#[async_trait]
impl Invoker for LabelGetInvoker {
    fn name(&self) -> &'static str {
        "label_get"
    }

    fn request_type(&self) -> RequestType {
        RequestType::LabelGet
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        RULES
    }

    async fn invoke(&self, req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        match open(&req, &env) {
            Ok(registry) => Response::ok("").with_ext(ResponseExt {
                labels: registry.entries().to_vec(),
                ..Default::default()
            }),
            Err(resp) => resp,
        }
    }
}
