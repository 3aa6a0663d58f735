use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Closed set of result categories returned by every controller component.
///
/// Numeric values are stable: they travel in RPC responses and are written into progress files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ResponseCode {
    Ok,
    Unknown,
    /// A sub-task faulted (panicked) or hit an unexpected internal condition.
    InternalError,

    /// A declared prerequisite failed.
    InvalidServiceRequest,
    /// An invoker was handed a request of another type.
    MismatchedRequestType,
    /// No invoker is registered for the request type.
    UnsupportedRequestType,
    /// The task type produced an unusable sub-task plan.
    InvalidPlan,

    ExternalToolFailed,
    ContainerFailed,

    GpuUnavailable,
    SharedStoreFailed,

    LabelToolFailed,
    ImagePullFailed,
    MonitorUnavailable,

    TaskNotFound,
}

impl ResponseCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ResponseCode::Ok => 0,
            ResponseCode::Unknown => 1,
            ResponseCode::InternalError => 2,
            ResponseCode::InvalidServiceRequest => 1001,
            ResponseCode::MismatchedRequestType => 1002,
            ResponseCode::UnsupportedRequestType => 1003,
            ResponseCode::InvalidPlan => 1004,
            ResponseCode::ExternalToolFailed => 2001,
            ResponseCode::ContainerFailed => 2002,
            ResponseCode::GpuUnavailable => 3001,
            ResponseCode::SharedStoreFailed => 3002,
            ResponseCode::LabelToolFailed => 4001,
            ResponseCode::ImagePullFailed => 4002,
            ResponseCode::MonitorUnavailable => 4003,
            ResponseCode::TaskNotFound => 5001,
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for ResponseCode {
    type Error = ModelError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        let code = match raw {
            0 => ResponseCode::Ok,
            1 => ResponseCode::Unknown,
            2 => ResponseCode::InternalError,
            1001 => ResponseCode::InvalidServiceRequest,
            1002 => ResponseCode::MismatchedRequestType,
            1003 => ResponseCode::UnsupportedRequestType,
            1004 => ResponseCode::InvalidPlan,
            2001 => ResponseCode::ExternalToolFailed,
            2002 => ResponseCode::ContainerFailed,
            3001 => ResponseCode::GpuUnavailable,
            3002 => ResponseCode::SharedStoreFailed,
            4001 => ResponseCode::LabelToolFailed,
            4002 => ResponseCode::ImagePullFailed,
            4003 => ResponseCode::MonitorUnavailable,
            5001 => ResponseCode::TaskNotFound,
            other => return Err(ModelError::UnknownCode(other)),
        };
        Ok(code)
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_round_trip() {
        for code in [
            ResponseCode::Ok,
            ResponseCode::InvalidServiceRequest,
            ResponseCode::GpuUnavailable,
            ResponseCode::TaskNotFound,
        ] {
            assert_eq!(ResponseCode::try_from(code.as_i32()).unwrap(), code);
        }
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert_eq!(
            ResponseCode::try_from(42),
            Err(ModelError::UnknownCode(42))
        );
    }

    #[test]
    fn serializes_as_number() {
        let json = serde_json::to_string(&ResponseCode::InvalidServiceRequest).unwrap();
        assert_eq!(json, "1001");
    }
}
