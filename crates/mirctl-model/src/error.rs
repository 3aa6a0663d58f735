use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid task id length: {got} (expected {expected})")]
    TaskIdLength { got: usize, expected: usize },
    #[error("invalid task id field `{field}`: {value:?}")]
    TaskIdField { field: &'static str, value: String },
    #[error("sub-task offset out of range: {0} (expected 0..=9)")]
    OffsetOutOfRange(u8),
    #[error("invalid progress line: {0}")]
    ProgressLine(String),
    #[error("unknown response code: {0}")]
    UnknownCode(i32),
}
