use std::fmt;

use serde::{Deserialize, Serialize};

/// A named point in the dataset tool's history, optionally qualified by the producing task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision {
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Revision {
    pub fn new(branch: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            task_id: Some(task_id.into()),
        }
    }

    /// Revision of a branch head, without task qualification.
    pub fn branch(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            task_id: None,
        }
    }

    /// A dataset id names both its branch and the task that produced it.
    pub fn of_dataset(dataset_id: &str) -> Self {
        Self::new(dataset_id, dataset_id)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(tid) => write!(f, "{}@{}", self.branch, tid),
            None => f.write_str(&self.branch),
        }
    }
}

/// Render revisions the way the dataset tool expects a revision list (`;`-separated).
pub fn join_revisions<'a>(revs: impl IntoIterator<Item = &'a Revision>) -> String {
    revs.into_iter()
        .map(Revision::to_string)
        .collect::<Vec<_>>()
        .join(";")
}
