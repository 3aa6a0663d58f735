use std::path::{Path, PathBuf};

use mirctl_model::{RequestType, TaskId};

const WORK_DIR: &str = "work_dir";
pub(crate) const SUB_TASK_DIR: &str = "sub_task";
const PROGRESS_FILE: &str = "monitor.txt";
const LABELS_FILE: &str = "labels.json";

/// Path scheme under the sandbox root.
///
/// ```text
/// {sandbox}/{user}/{repo}                              repository root
/// {sandbox}/{user}/labels.json                         label registry
/// {sandbox}/work_dir/{type}/{task_id}                  task work dir
/// {sandbox}/work_dir/{type}/{task_id}/monitor.txt      progress file
/// {sandbox}/work_dir/{type}/{task_id}/sub_task/{id}    sub-task work dir
/// ```
#[derive(Debug, Clone)]
pub struct SandboxLayout {
    root: PathBuf,
}

impl SandboxLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` when the id could escape the sandbox.
    pub fn user_root(&self, user_id: &str) -> Option<PathBuf> {
        is_path_segment(user_id).then(|| self.root.join(user_id))
    }

    pub fn repo_root(&self, user_id: &str, repo_id: &str) -> Option<PathBuf> {
        let user = self.user_root(user_id)?;
        is_path_segment(repo_id).then(|| user.join(repo_id))
    }

    pub fn labels_file(&self, user_id: &str) -> Option<PathBuf> {
        self.user_root(user_id).map(|u| u.join(LABELS_FILE))
    }

    pub fn task(&self, request_type: RequestType, task_id: &TaskId) -> TaskLayout {
        let work_dir = self
            .root
            .join(WORK_DIR)
            .join(request_type.as_str())
            .join(task_id.as_str());
        TaskLayout {
            task_id: task_id.clone(),
            request_type,
            progress_file: work_dir.join(PROGRESS_FILE),
            work_dir,
        }
    }
}

/// Where one task keeps its files.
#[derive(Debug, Clone)]
pub struct TaskLayout {
    pub task_id: TaskId,
    pub request_type: RequestType,
    pub work_dir: PathBuf,
    pub progress_file: PathBuf,
}

impl TaskLayout {
    pub fn sub_task_dir(&self, sub_task_id: &TaskId) -> PathBuf {
        self.work_dir.join(SUB_TASK_DIR).join(sub_task_id.as_str())
    }
}

/// A single, non-special path component.
pub(crate) fn is_path_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: &str = "f0000001000042abcdef0123456789";

    #[test]
    fn repo_root_is_nested_under_user() {
        let layout = SandboxLayout::new("/sb");
        assert_eq!(
            layout.repo_root("0001", "000042"),
            Some(PathBuf::from("/sb/0001/000042"))
        );
        assert_eq!(
            layout.labels_file("0001"),
            Some(PathBuf::from("/sb/0001/labels.json"))
        );
    }

    #[test]
    fn escaping_ids_are_refused() {
        let layout = SandboxLayout::new("/sb");
        assert!(layout.user_root("..").is_none());
        assert!(layout.repo_root("0001", "a/b").is_none());
        assert!(layout.repo_root("", "000042").is_none());
    }

    #[test]
    fn task_paths() {
        let layout = SandboxLayout::new("/sb");
        let tid = TaskId::parse(TID).unwrap();
        let task = layout.task(RequestType::Filter, &tid);
        assert_eq!(task.work_dir, PathBuf::from(format!("/sb/work_dir/filter/{TID}")));
        assert_eq!(
            task.progress_file,
            PathBuf::from(format!("/sb/work_dir/filter/{TID}/monitor.txt"))
        );
        let sub = tid.sub_task(1).unwrap();
        assert_eq!(
            task.sub_task_dir(&sub),
            PathBuf::from(format!("/sb/work_dir/filter/{TID}/sub_task/{sub}"))
        );
    }
}
