use serde::{Deserialize, Serialize};

use crate::{LabelConflict, LabelEntry, ResponseCode};

/// Result of one invocation: a code, a message and optional structured extras.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub code: ResponseCode,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "ResponseExt::is_empty")]
    pub ext: ResponseExt,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Ok,
            message: message.into(),
            ext: ResponseExt::default(),
        }
    }

    pub fn error(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ext: ResponseExt::default(),
        }
    }

    pub fn with_ext(mut self, ext: ResponseExt) -> Self {
        self.ext = ext;
        self
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

/// Structured response extensions. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseExt {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_conflicts: Vec<LabelConflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hash_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
}

impl ResponseExt {
    pub fn is_empty(&self) -> bool {
        self == &ResponseExt::default()
    }
}
