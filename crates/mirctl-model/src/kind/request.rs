use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ClassId, DatasetId, LabelEntry, RepoId, UserId};

/// Inbound controller request.
///
/// Owned by the dispatch layer for the duration of one invocation; never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerRequest {
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub repo_id: RepoId,
    /// Master task id. Required only by task types that declare the task-id prerequisite.
    #[serde(default)]
    pub task_id: String,
    /// Branch receiving the task's output.
    #[serde(default)]
    pub dst_dataset_id: DatasetId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_dataset_ids: Vec<DatasetId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ex_dataset_ids: Vec<DatasetId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_class_ids: Vec<ClassId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ex_class_ids: Vec<ClassId>,
    pub payload: RequestPayload,
}

impl ControllerRequest {
    pub fn new(payload: RequestPayload) -> Self {
        Self {
            user_id: String::new(),
            repo_id: String::new(),
            task_id: String::new(),
            dst_dataset_id: String::new(),
            in_dataset_ids: Vec::new(),
            ex_dataset_ids: Vec::new(),
            in_class_ids: Vec::new(),
            ex_class_ids: Vec::new(),
            payload,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_repo(mut self, repo_id: impl Into<String>) -> Self {
        self.repo_id = repo_id.into();
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_dst_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dst_dataset_id = dataset_id.into();
        self
    }

    pub fn with_in_datasets<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.in_dataset_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ex_datasets<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ex_dataset_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_classes(mut self, include: Vec<ClassId>, exclude: Vec<ClassId>) -> Self {
        self.in_class_ids = include;
        self.ex_class_ids = exclude;
        self
    }

    #[inline]
    pub fn request_type(&self) -> RequestType {
        self.payload.request_type()
    }
}

/// Type-specific part of a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPayload {
    BranchList,
    BranchCheckout {
        branch: String,
    },
    BranchCreate {
        branch: String,
    },
    BranchDelete {
        branch: String,
        /// Delete even if the branch is not merged.
        #[serde(default)]
        force: bool,
    },
    Commit {
        message: String,
    },
    RepoInit,
    Log,
    /// Report whether the repository root exists.
    RepoStatus,
    LabelAdd {
        labels: Vec<LabelEntry>,
        /// Only report conflicts, write nothing.
        #[serde(default)]
        dry_run: bool,
    },
    LabelGet,
    /// Count of GPUs currently free and not leased.
    GpuInfo,
    Terminate {
        target_task_id: String,
        #[serde(default)]
        kind: TerminateKind,
    },
    /// Merge the input datasets, then keep/drop annotations by class.
    Filter,
    Merge {
        #[serde(default)]
        strategy: MergeStrategy,
    },
    Import {
        /// File listing asset paths, one per line.
        index_file: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotation_dir: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prediction_dir: Option<PathBuf>,
        #[serde(default)]
        unknown_types: UnknownTypesStrategy,
    },
    Export {
        #[serde(default)]
        format: AnnotationFormat,
        asset_dir: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotation_dir: Option<PathBuf>,
    },
    /// Copy a dataset out of another user's repository.
    Copy {
        src_user_id: UserId,
        src_repo_id: RepoId,
        #[serde(default)]
        ignore_unknown_types: bool,
    },
    Train {
        image: String,
        /// Trainer configuration, handed to the container verbatim.
        #[serde(default)]
        config: String,
        #[serde(default)]
        gpu_count: u32,
    },
    Mine {
        image: String,
        #[serde(default)]
        config: String,
        #[serde(default)]
        gpu_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_k: Option<u32>,
    },
    /// Create a labeling project for one dataset.
    Label {
        project_name: String,
        #[serde(default)]
        class_names: Vec<String>,
    },
    PullImage {
        image: String,
    },
    Sampling {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate: Option<f64>,
    },
    /// Merge, filter and sample in one pass of the dataset tool.
    Fusion {
        #[serde(default)]
        strategy: MergeStrategy,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_count: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<f64>,
    },
    ModelImport {
        package_path: PathBuf,
    },
}

impl RequestPayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            RequestPayload::BranchList => RequestType::BranchList,
            RequestPayload::BranchCheckout { .. } => RequestType::BranchCheckout,
            RequestPayload::BranchCreate { .. } => RequestType::BranchCreate,
            RequestPayload::BranchDelete { .. } => RequestType::BranchDelete,
            RequestPayload::Commit { .. } => RequestType::Commit,
            RequestPayload::RepoInit => RequestType::RepoInit,
            RequestPayload::Log => RequestType::Log,
            RequestPayload::RepoStatus => RequestType::RepoStatus,
            RequestPayload::LabelAdd { .. } => RequestType::LabelAdd,
            RequestPayload::LabelGet => RequestType::LabelGet,
            RequestPayload::GpuInfo => RequestType::GpuInfo,
            RequestPayload::Terminate { .. } => RequestType::Terminate,
            RequestPayload::Filter => RequestType::Filter,
            RequestPayload::Merge { .. } => RequestType::Merge,
            RequestPayload::Import { .. } => RequestType::Import,
            RequestPayload::Export { .. } => RequestType::Export,
            RequestPayload::Copy { .. } => RequestType::Copy,
            RequestPayload::Train { .. } => RequestType::Train,
            RequestPayload::Mine { .. } => RequestType::Mine,
            RequestPayload::Label { .. } => RequestType::Label,
            RequestPayload::PullImage { .. } => RequestType::PullImage,
            RequestPayload::Sampling { .. } => RequestType::Sampling,
            RequestPayload::Fusion { .. } => RequestType::Fusion,
            RequestPayload::ModelImport { .. } => RequestType::ModelImport,
        }
    }

    /// The single operand of commands that take exactly one (branch name, image name).
    pub fn singleton_op(&self) -> Option<&str> {
        match self {
            RequestPayload::BranchCheckout { branch }
            | RequestPayload::BranchCreate { branch }
            | RequestPayload::BranchDelete { branch, .. } => Some(branch),
            RequestPayload::PullImage { image } => Some(image),
            _ => None,
        }
    }
}

/// Discriminant of [`RequestPayload`]; the dispatch key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    BranchList,
    BranchCheckout,
    BranchCreate,
    BranchDelete,
    Commit,
    RepoInit,
    Log,
    RepoStatus,
    LabelAdd,
    LabelGet,
    GpuInfo,
    Terminate,
    Filter,
    Merge,
    Import,
    Export,
    Copy,
    Train,
    Mine,
    Label,
    PullImage,
    Sampling,
    Fusion,
    ModelImport,
}

impl RequestType {
    /// Short symbolic name, used in logs and work-dir paths.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::BranchList => "branch_list",
            RequestType::BranchCheckout => "branch_checkout",
            RequestType::BranchCreate => "branch_create",
            RequestType::BranchDelete => "branch_delete",
            RequestType::Commit => "commit",
            RequestType::RepoInit => "repo_init",
            RequestType::Log => "log",
            RequestType::RepoStatus => "repo_status",
            RequestType::LabelAdd => "label_add",
            RequestType::LabelGet => "label_get",
            RequestType::GpuInfo => "gpu_info",
            RequestType::Terminate => "terminate",
            RequestType::Filter => "filter",
            RequestType::Merge => "merge",
            RequestType::Import => "import",
            RequestType::Export => "export",
            RequestType::Copy => "copy",
            RequestType::Train => "train",
            RequestType::Mine => "mine",
            RequestType::Label => "label",
            RequestType::PullImage => "pull_image",
            RequestType::Sampling => "sampling",
            RequestType::Fusion => "fusion",
            RequestType::ModelImport => "model_import",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conflict policy when merging datasets that share assets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Fail on conflicting assets.
    #[default]
    Stop,
    /// Keep the first (host) dataset's annotations.
    Host,
    /// Take the later (guest) dataset's annotations.
    Guest,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Stop => "stop",
            MergeStrategy::Host => "host",
            MergeStrategy::Guest => "guest",
        }
    }
}

/// Handle kind a terminate request targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateKind {
    /// Dataset-tool processes registered for the task.
    #[default]
    Process,
    /// The task's container (named after the task id).
    Container,
}

/// What the import step does with class names missing from the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypesStrategy {
    #[default]
    Stop,
    Ignore,
    Add,
}

impl UnknownTypesStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            UnknownTypesStrategy::Stop => "stop",
            UnknownTypesStrategy::Ignore => "ignore",
            UnknownTypesStrategy::Add => "add",
        }
    }
}

/// Annotation format written by export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationFormat {
    /// Assets only.
    None,
    #[default]
    Voc,
    Coco,
}

impl AnnotationFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationFormat::None => "none",
            AnnotationFormat::Voc => "voc",
            AnnotationFormat::Coco => "coco",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_by_type() {
        let json = r#"{
            "user_id": "0001",
            "repo_id": "000001",
            "payload": { "type": "commit", "message": "init" }
        }"#;
        let req: ControllerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.request_type(), RequestType::Commit);
        assert!(req.in_dataset_ids.is_empty());
        assert_eq!(
            req.payload,
            RequestPayload::Commit {
                message: "init".into()
            }
        );
    }

    #[test]
    fn unit_payload_parses() {
        let req: ControllerRequest =
            serde_json::from_str(r#"{"payload":{"type":"branch_list"}}"#).unwrap();
        assert_eq!(req.request_type(), RequestType::BranchList);
    }

    #[test]
    fn defaults_fill_optional_payload_fields() {
        let req: ControllerRequest = serde_json::from_str(
            r#"{"payload":{"type":"terminate","target_task_id":"x"}}"#,
        )
        .unwrap();
        assert_eq!(
            req.payload,
            RequestPayload::Terminate {
                target_task_id: "x".into(),
                kind: TerminateKind::Process
            }
        );
    }

    #[test]
    fn singleton_op_for_branch_and_image() {
        assert_eq!(
            RequestPayload::BranchCreate { branch: "b".into() }.singleton_op(),
            Some("b")
        );
        assert_eq!(
            RequestPayload::PullImage { image: "img:1".into() }.singleton_op(),
            Some("img:1")
        );
        assert_eq!(RequestPayload::Log.singleton_op(), None);
    }

    #[test]
    fn request_type_names_match_serde() {
        let json = serde_json::to_string(&RequestType::ModelImport).unwrap();
        assert_eq!(json, format!("\"{}\"", RequestType::ModelImport.as_str()));
    }
}
