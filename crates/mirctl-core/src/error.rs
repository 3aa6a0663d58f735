use mirctl_exec::ExecError;
use mirctl_model::{ModelError, RequestType, Response, ResponseCode};
use thiserror::Error;

/// Shared key-value store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("mismatched request type: expected {expected}, got {got}")]
    MismatchedRequest {
        expected: RequestType,
        got: RequestType,
    },
    #[error("task {0} is already running")]
    TaskRunning(String),
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("gpu probe failed: {0}")]
    GpuProbe(String),
    #[error("monitor registration failed: {0}")]
    Monitor(String),
    #[error("label tool failed: {0}")]
    LabelTool(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Response code reported to the caller for this failure.
    pub fn code(&self) -> ResponseCode {
        match self {
            CoreError::Config(_) | CoreError::Io(_) | CoreError::Json(_) => {
                ResponseCode::InternalError
            }
            CoreError::InvalidRequest(_) | CoreError::TaskRunning(_) | CoreError::Model(_) => {
                ResponseCode::InvalidServiceRequest
            }
            CoreError::MismatchedRequest { .. } => ResponseCode::MismatchedRequestType,
            CoreError::InvalidPlan(_) => ResponseCode::InvalidPlan,
            CoreError::Exec(_) => ResponseCode::ExternalToolFailed,
            CoreError::Store(_) => ResponseCode::SharedStoreFailed,
            CoreError::GpuProbe(_) => ResponseCode::GpuUnavailable,
            CoreError::Monitor(_) => ResponseCode::MonitorUnavailable,
            CoreError::LabelTool(_) => ResponseCode::LabelToolFailed,
        }
    }

    pub fn into_response(self) -> Response {
        Response::error(self.code(), self.to_string())
    }
}

impl From<CoreError> for Response {
    fn from(e: CoreError) -> Self {
        e.into_response()
    }
}
