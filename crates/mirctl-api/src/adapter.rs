use std::sync::Arc;

use async_trait::async_trait;
use mirctl_core::Dispatcher;
use mirctl_model::{ControllerRequest, Response};

use crate::{error::ApiError, handler::ApiHandler};

/// Hands requests straight to a [`Dispatcher`].
pub struct DispatcherAdapter {
    dispatcher: Arc<Dispatcher>,
}

impl DispatcherAdapter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ApiHandler for DispatcherAdapter {
    async fn invoke(&self, req: ControllerRequest) -> Result<Response, ApiError> {
        Ok(self.dispatcher.dispatch(req).await)
    }
}

#[cfg(test)]
mod tests {
    use mirctl_core::{ControllerConfig, InvokerEnv, InvokerRouter, lease::StaticProbe};
    use mirctl_model::{RequestPayload, ResponseCode};

    use super::*;

    #[tokio::test]
    async fn dispatches_through_the_standard_router() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ControllerConfig {
            sandbox_root: dir.path().to_path_buf(),
            ..ControllerConfig::default()
        };
        let env = InvokerEnv::builder(config)
            .with_probe(Arc::new(StaticProbe::new([("0", 0.9)])))
            .build()
            .unwrap();
        let dispatcher = Dispatcher::new(InvokerRouter::standard(), Arc::new(env));
        let adapter = DispatcherAdapter::new(Arc::new(dispatcher));

        let resp = adapter
            .invoke(ControllerRequest::new(RequestPayload::GpuInfo))
            .await
            .unwrap();
        assert_eq!(resp.code, ResponseCode::Ok);
        assert_eq!(resp.ext.gpu_count, Some(1));
    }
}
