mod code;
pub use code::ResponseCode;

mod task_id;
pub use task_id::{
    HEX_TASK_ID_WIDTH, ID_TYPE_WIDTH, REPO_HASH_WIDTH, RESERVED_WIDTH, SUB_TASK_OFFSET_WIDTH,
    TASK_ID_WIDTH, TaskId, USER_HASH_WIDTH, derive_subtask_id,
};

mod revision;
pub use revision::{Revision, join_revisions};

mod task_state;
pub use task_state::TaskState;

mod progress;
pub use progress::ProgressRecord;

mod labels;
pub use labels::{LabelConflict, LabelEntry};

/// Identifier of a user as carried on the wire.
pub type UserId = String;

/// Identifier of one user's repository.
pub type RepoId = String;

/// Dataset identifier. Names both a branch and the task that produced it.
pub type DatasetId = String;

/// Class identifier inside a user's label registry.
pub type ClassId = i32;
