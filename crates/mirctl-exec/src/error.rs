use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("missing program: {0}")]
    MissingProgram(String),
    #[error("spawn {program} failed: {reason}")]
    Spawn { program: String, reason: String },
    #[error("exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("terminated by signal: {stderr}")]
    KilledBySignal { stderr: String },
    #[error("io error: {0}")]
    Io(String),
    #[error("signalling not supported on this platform")]
    Unsupported,
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
