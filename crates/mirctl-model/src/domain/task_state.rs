use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Lifecycle state carried by a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, no sub-task started yet.
    Pending,
    /// A sub-task is executing.
    Running,
    /// Every sub-task finished successfully.
    Done,
    /// A sub-task failed; the remaining pipeline was skipped.
    Error,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Error => "error",
        }
    }

    /// Returns `true` for `done` and `error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "running" => Ok(TaskState::Running),
            "done" => Ok(TaskState::Done),
            "error" => Ok(TaskState::Error),
            other => Err(ModelError::ProgressLine(format!("unknown state: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Error.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn parse_matches_display() {
        for state in [
            TaskState::Pending,
            TaskState::Running,
            TaskState::Done,
            TaskState::Error,
        ] {
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
        assert!("finished".parse::<TaskState>().is_err());
    }
}
