//! Fixed-width task identifier.
//!
//! Layout (30 chars):
//!
//! | field             | width | content                  |
//! |-------------------|-------|--------------------------|
//! | `id_type`         | 1     | ASCII alphanumeric       |
//! | `sub_task_offset` | 1     | `'0'..='9'`              |
//! | `reserved`        | 2     | ASCII alphanumeric       |
//! | `user_hash`       | 4     | ASCII alphanumeric       |
//! | `repo_hash`       | 6     | ASCII alphanumeric       |
//! | `hex_task_id`     | 16    | hex digits               |
//!
//! A sub-task id differs from its master only in the offset character, so the owning
//! user, repository and master task are recoverable from any sub-task id.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

pub const ID_TYPE_WIDTH: usize = 1;
pub const SUB_TASK_OFFSET_WIDTH: usize = 1;
pub const RESERVED_WIDTH: usize = 2;
pub const USER_HASH_WIDTH: usize = 4;
pub const REPO_HASH_WIDTH: usize = 6;
pub const HEX_TASK_ID_WIDTH: usize = 16;

pub const TASK_ID_WIDTH: usize = ID_TYPE_WIDTH
    + SUB_TASK_OFFSET_WIDTH
    + RESERVED_WIDTH
    + USER_HASH_WIDTH
    + REPO_HASH_WIDTH
    + HEX_TASK_ID_WIDTH;

const OFFSET_POS: usize = ID_TYPE_WIDTH;
const RESERVED_POS: usize = OFFSET_POS + SUB_TASK_OFFSET_WIDTH;
const USER_POS: usize = RESERVED_POS + RESERVED_WIDTH;
const REPO_POS: usize = USER_POS + USER_HASH_WIDTH;
const HEX_POS: usize = REPO_POS + REPO_HASH_WIDTH;

const DEFAULT_RESERVED: &str = "00";

/// Validated task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Parse and validate a raw identifier.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        if raw.len() != TASK_ID_WIDTH {
            return Err(ModelError::TaskIdLength {
                got: raw.len(),
                expected: TASK_ID_WIDTH,
            });
        }
        // Length was checked in bytes; a multi-byte char would fail the ASCII checks below.
        let bytes = raw.as_bytes();

        check_field("id_type", &bytes[..OFFSET_POS], |b| b.is_ascii_alphanumeric())?;
        check_field("sub_task_offset", &bytes[OFFSET_POS..RESERVED_POS], |b| {
            b.is_ascii_digit()
        })?;
        check_field("reserved", &bytes[RESERVED_POS..USER_POS], |b| {
            b.is_ascii_alphanumeric()
        })?;
        check_field("user_hash", &bytes[USER_POS..REPO_POS], |b| {
            b.is_ascii_alphanumeric()
        })?;
        check_field("repo_hash", &bytes[REPO_POS..HEX_POS], |b| {
            b.is_ascii_alphanumeric()
        })?;
        check_field("hex_task_id", &bytes[HEX_POS..], |b| b.is_ascii_hexdigit())?;

        Ok(Self(raw.to_string()))
    }

    /// Build a master id (offset `0`) from its parts.
    ///
    /// `user_id` and `repo_id` are left-padded with `'0'` to their field widths.
    pub fn compose(id_type: char, user_id: &str, repo_id: &str, hex: &str) -> Result<Self, ModelError> {
        let user = pad_field("user_hash", user_id, USER_HASH_WIDTH)?;
        let repo = pad_field("repo_hash", repo_id, REPO_HASH_WIDTH)?;
        Self::parse(&format!("{id_type}0{DEFAULT_RESERVED}{user}{repo}{hex}"))
    }

    /// Build a master id with a fresh random hex part.
    pub fn generate(id_type: char, user_id: &str, repo_id: &str) -> Result<Self, ModelError> {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self::compose(id_type, user_id, repo_id, &simple[..HEX_TASK_ID_WIDTH])
    }

    /// Derive the id of the sub-task at `offset`. Every other field is preserved.
    pub fn sub_task(&self, offset: u8) -> Result<Self, ModelError> {
        if offset > 9 {
            return Err(ModelError::OffsetOutOfRange(offset));
        }
        let mut raw = String::with_capacity(TASK_ID_WIDTH);
        raw.push_str(&self.0[..OFFSET_POS]);
        raw.push(char::from(b'0' + offset));
        raw.push_str(&self.0[RESERVED_POS..]);
        Ok(Self(raw))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn id_type(&self) -> char {
        char::from(self.0.as_bytes()[0])
    }

    pub fn sub_task_offset(&self) -> u8 {
        self.0.as_bytes()[OFFSET_POS] - b'0'
    }

    pub fn reserved(&self) -> &str {
        &self.0[RESERVED_POS..USER_POS]
    }

    pub fn user_hash(&self) -> &str {
        &self.0[USER_POS..REPO_POS]
    }

    pub fn repo_hash(&self) -> &str {
        &self.0[REPO_POS..HEX_POS]
    }

    pub fn hex_task_id(&self) -> &str {
        &self.0[HEX_POS..]
    }

    /// Returns `true` if both ids belong to the same master task.
    pub fn same_lineage(&self, other: &TaskId) -> bool {
        self.0[..OFFSET_POS] == other.0[..OFFSET_POS] && self.0[RESERVED_POS..] == other.0[RESERVED_POS..]
    }
}

/// Replace the offset character of `id`, leaving every other field untouched.
pub fn derive_subtask_id(id: &str, offset: u8) -> Result<String, ModelError> {
    TaskId::parse(id)?.sub_task(offset).map(String::from)
}

fn check_field(
    field: &'static str,
    bytes: &[u8],
    ok: impl Fn(&u8) -> bool,
) -> Result<(), ModelError> {
    if bytes.iter().all(ok) {
        Ok(())
    } else {
        Err(ModelError::TaskIdField {
            field,
            value: String::from_utf8_lossy(bytes).into_owned(),
        })
    }
}

fn pad_field(field: &'static str, value: &str, width: usize) -> Result<String, ModelError> {
    if value.is_empty() || value.len() > width {
        return Err(ModelError::TaskIdField {
            field,
            value: value.to_string(),
        });
    }
    Ok(format!("{value:0>width$}"))
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = ModelError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::str::FromStr for TaskId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
