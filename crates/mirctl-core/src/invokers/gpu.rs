use std::sync::Arc;

use async_trait::async_trait;
use mirctl_model::{ControllerRequest, RequestType, Response, ResponseExt};

use crate::{checker::Prerequisite, env::InvokerEnv, invoker::Invoker};

/// Number of GPUs that are free and not leased right now. Leases nothing.
pub struct GpuInfoInvoker;

#[async_trait]
impl Invoker for GpuInfoInvoker {
    fn name(&self) -> &'static str {
        "gpu_info"
    }

    fn request_type(&self) -> RequestType {
        RequestType::GpuInfo
    }

    fn prerequisites(&self) -> &'static [Prerequisite] {
        &[]
    }

    async fn invoke(&self, _req: ControllerRequest, env: Arc<InvokerEnv>) -> Response {
        match env.leases.available_count().await {
            Ok(n) => Response::ok("").with_ext(ResponseExt {
                gpu_count: Some(u32::try_from(n).unwrap_or(u32::MAX)),
                ..Default::default()
            }),
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mirctl_model::RequestPayload;

    use super::*;
    use crate::testing::{RecordingRunner, env};

    #[tokio::test]
    async fn reports_free_gpus() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir, RecordingRunner::new());
        let resp = GpuInfoInvoker
            .invoke(ControllerRequest::new(RequestPayload::GpuInfo), env)
            .await;
        assert_eq!(resp.ext.gpu_count, Some(2));
    }
}
