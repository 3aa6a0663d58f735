use std::{collections::HashMap, sync::Arc};

use mirctl_model::{ControllerRequest, RequestType, Response, ResponseCode};
use tracing::{debug, instrument, trace, warn};

use crate::{env::InvokerEnv, invoker::Invoker};

/// Request type to invoker table. Built once at startup, read-only afterwards.
#[derive(Default)]
pub struct InvokerRouter {
    invokers: HashMap<RequestType, Arc<dyn Invoker>>,
}

impl InvokerRouter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with every built-in invoker registered.
    pub fn standard() -> Self {
        let mut router = Self::new();
        crate::invokers::register_all(&mut router);
        crate::tasks::register_all(&mut router);
        router
    }

    /// Register `invoker` for its request type, replacing any previous one.
    pub fn register(&mut self, invoker: Arc<dyn Invoker>) {
        let kind = invoker.request_type();
        if let Some(old) = self.invokers.insert(kind, invoker) {
            warn!(%kind, replaced = old.name(), "invoker replaced");
        }
    }

    #[inline]
    pub fn pick(&self, kind: RequestType) -> Option<&Arc<dyn Invoker>> {
        self.invokers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }
}

/// Entry point for every inbound request.
pub struct Dispatcher {
    router: InvokerRouter,
    env: Arc<InvokerEnv>,
}

impl Dispatcher {
    pub fn new(router: InvokerRouter, env: Arc<InvokerEnv>) -> Self {
        Self { router, env }
    }

    pub fn env(&self) -> &Arc<InvokerEnv> {
        &self.env
    }

    /// Route `req` to its invoker: validate, then invoke.
    ///
    /// Unknown types get `UnsupportedRequestType`; a failed validation is returned as is and
    /// nothing else happens. A panicking invoker yields `InternalError`.
    #[instrument(level = "debug", skip(self, req), fields(kind = %req.request_type(), task = %req.task_id))]
    pub async fn dispatch(&self, req: ControllerRequest) -> Response {
        let kind = req.request_type();
        let Some(invoker) = self.router.pick(kind).cloned() else {
            return Response::error(
                ResponseCode::UnsupportedRequestType,
                format!("no invoker for {kind}"),
            );
        };

        let checked = invoker.pre_invoke(&req, &self.env);
        if !checked.is_ok() {
            debug!(invoker = invoker.name(), code = %checked.code, "request rejected");
            return checked;
        }

        trace!(invoker = invoker.name(), "invoking");
        let env = Arc::clone(&self.env);
        let name = invoker.name();
        match tokio::spawn(async move { invoker.invoke(req, env).await }).await {
            Ok(response) => response,
            Err(e) => {
                warn!(invoker = name, error = %e, "invoker aborted");
                Response::error(ResponseCode::InternalError, format!("{name} aborted: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests;
