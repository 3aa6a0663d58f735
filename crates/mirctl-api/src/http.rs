use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post},
};
use mirctl_model::ControllerRequest;
use tracing::debug;

use crate::{error::ApiError, handler::ApiHandler};

/// HTTP surface of the controller.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Routes:
    /// - POST /api/v1/invoke - run one controller request
    /// - GET /healthz - liveness
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/invoke", post(invoke::<H>))
            .route("/healthz", get(healthz))
            .with_state(self.handler)
    }
}

/// POST /api/v1/invoke
///
/// Always 200 once the body parses; the controller code is in the JSON body.
async fn invoke<H>(
    State(handler): State<Arc<H>>,
    body: Result<Json<ControllerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let Json(req) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    debug!(kind = %req.request_type(), task = %req.task_id, "invoke");
    let response = handler.invoke(req).await?;
    Ok(Json(response))
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
