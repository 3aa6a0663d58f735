//! Declarative request validation.
//!
//! Every invoker declares the rules its request must satisfy. [`check`] evaluates them in
//! declaration order and stops at the first failure; no side effects happen before it passes.
use mirctl_model::{ControllerRequest, RequestPayload, Response, ResponseCode, TaskId};
use tracing::debug;

use crate::layout::SandboxLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    /// `user_id` is non-empty and a single path component.
    CheckUserId,
    /// `repo_id` is non-empty and a single path component.
    CheckRepoId,
    /// `{sandbox}/{user}` is a directory.
    CheckUserRootExist,
    /// `{sandbox}/{user}/{repo}` is a directory.
    CheckRepoRootExist,
    /// `{sandbox}/{user}/{repo}` does not exist yet.
    CheckRepoRootNotExist,
    /// `task_id` is a well-formed task identifier.
    CheckTaskId,
    /// The payload's single operand (branch or image) is non-empty.
    CheckSingletonOp,
    CheckCommitMessage,
    CheckDstDatasetId,
    /// Exactly one input dataset.
    CheckSingleInDatasetId,
    /// At least one input dataset, none of them empty.
    CheckInDatasetIds,
}

impl Prerequisite {
    pub fn as_str(self) -> &'static str {
        match self {
            Prerequisite::CheckUserId => "check_user_id",
            Prerequisite::CheckRepoId => "check_repo_id",
            Prerequisite::CheckUserRootExist => "check_user_root_exist",
            Prerequisite::CheckRepoRootExist => "check_repo_root_exist",
            Prerequisite::CheckRepoRootNotExist => "check_repo_root_not_exist",
            Prerequisite::CheckTaskId => "check_task_id",
            Prerequisite::CheckSingletonOp => "check_singleton_op",
            Prerequisite::CheckCommitMessage => "check_commit_message",
            Prerequisite::CheckDstDatasetId => "check_dst_dataset_id",
            Prerequisite::CheckSingleInDatasetId => "check_single_in_dataset_id",
            Prerequisite::CheckInDatasetIds => "check_in_dataset_ids",
        }
    }

    fn evaluate(self, req: &ControllerRequest, layout: &SandboxLayout) -> Result<(), String> {
        match self {
            Prerequisite::CheckUserId => layout
                .user_root(&req.user_id)
                .map(drop)
                .ok_or_else(|| format!("invalid user id: {:?}", req.user_id)),
            Prerequisite::CheckRepoId => {
                if crate::layout::is_path_segment(&req.repo_id) {
                    Ok(())
                } else {
                    Err(format!("invalid repo id: {:?}", req.repo_id))
                }
            }
            Prerequisite::CheckUserRootExist => match layout.user_root(&req.user_id) {
                Some(p) if p.is_dir() => Ok(()),
                Some(p) => Err(format!("user root not found: {}", p.display())),
                None => Err("user root unresolved".to_string()),
            },
            Prerequisite::CheckRepoRootExist => match layout.repo_root(&req.user_id, &req.repo_id) {
                Some(p) if p.is_dir() => Ok(()),
                Some(p) => Err(format!("repo root not found: {}", p.display())),
                None => Err("repo root unresolved".to_string()),
            },
            Prerequisite::CheckRepoRootNotExist => {
                match layout.repo_root(&req.user_id, &req.repo_id) {
                    Some(p) if p.exists() => Err(format!("repo root already exists: {}", p.display())),
                    Some(_) => Ok(()),
                    None => Err("repo root unresolved".to_string()),
                }
            }
            Prerequisite::CheckTaskId => TaskId::parse(&req.task_id)
                .map(drop)
                .map_err(|e| format!("invalid task id {:?}: {e}", req.task_id)),
            Prerequisite::CheckSingletonOp => match req.payload.singleton_op() {
                Some(op) if !op.trim().is_empty() => Ok(()),
                _ => Err("missing singleton operand".to_string()),
            },
            Prerequisite::CheckCommitMessage => match &req.payload {
                RequestPayload::Commit { message } if !message.trim().is_empty() => Ok(()),
                _ => Err("empty commit message".to_string()),
            },
            Prerequisite::CheckDstDatasetId => {
                if req.dst_dataset_id.trim().is_empty() {
                    Err("missing dst dataset id".to_string())
                } else {
                    Ok(())
                }
            }
            Prerequisite::CheckSingleInDatasetId => match req.in_dataset_ids.as_slice() {
                [one] if !one.trim().is_empty() => Ok(()),
                ids => Err(format!("expected one input dataset, got {}", ids.len())),
            },
            Prerequisite::CheckInDatasetIds => {
                if req.in_dataset_ids.is_empty() {
                    Err("no input datasets".to_string())
                } else if req.in_dataset_ids.iter().any(|d| d.trim().is_empty()) {
                    Err("empty input dataset id".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Evaluate `prerequisites` against `req` in order.
///
/// Returns `Ok` when all pass, otherwise `InvalidServiceRequest` naming the first failed rule.
pub fn check(
    req: &ControllerRequest,
    prerequisites: &[Prerequisite],
    layout: &SandboxLayout,
) -> Response {
    for rule in prerequisites {
        if let Err(reason) = rule.evaluate(req, layout) {
            debug!(rule = rule.as_str(), %reason, "prerequisite failed");
            return Response::error(
                ResponseCode::InvalidServiceRequest,
                format!("{}: {reason}", rule.as_str()),
            );
        }
    }
    Response::ok("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirctl_model::RequestPayload;

    const TID: &str = "t0000001000042abcdef0123456789";

    fn layout(dir: &tempfile::TempDir) -> SandboxLayout {
        SandboxLayout::new(dir.path())
    }

    fn commit(msg: &str) -> ControllerRequest {
        ControllerRequest::new(RequestPayload::Commit {
            message: msg.into(),
        })
        .with_user("0001")
        .with_repo("000042")
    }

    #[test]
    fn empty_rule_set_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check(&commit(""), &[], &layout(&dir)).is_ok());
    }

    #[test]
    fn first_failure_wins() {
        let dir = tempfile::tempdir().unwrap();
        let req = commit("").with_user("");
        let resp = check(
            &req,
            &[
                Prerequisite::CheckUserId,
                Prerequisite::CheckCommitMessage,
            ],
            &layout(&dir),
        );
        assert_eq!(resp.code, ResponseCode::InvalidServiceRequest);
        assert!(resp.message.starts_with("check_user_id"));
    }

    #[test]
    fn repo_root_existence() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(&dir);
        let req = commit("m");

        assert!(!check(&req, &[Prerequisite::CheckRepoRootExist], &l).is_ok());
        assert!(check(&req, &[Prerequisite::CheckRepoRootNotExist], &l).is_ok());

        std::fs::create_dir_all(dir.path().join("0001/000042")).unwrap();
        assert!(check(&req, &[Prerequisite::CheckRepoRootExist], &l).is_ok());
        assert!(!check(&req, &[Prerequisite::CheckRepoRootNotExist], &l).is_ok());
        assert!(check(&req, &[Prerequisite::CheckUserRootExist], &l).is_ok());
    }

    #[test]
    fn task_id_must_be_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(&dir);
        let bad = commit("m").with_task_id("short");
        assert!(!check(&bad, &[Prerequisite::CheckTaskId], &l).is_ok());
        let good = commit("m").with_task_id(TID);
        assert!(check(&good, &[Prerequisite::CheckTaskId], &l).is_ok());
    }

    #[test]
    fn dataset_rules() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(&dir);
        let req = ControllerRequest::new(RequestPayload::Filter).with_in_datasets(["a", "b"]);
        assert!(check(&req, &[Prerequisite::CheckInDatasetIds], &l).is_ok());
        assert!(!check(&req, &[Prerequisite::CheckSingleInDatasetId], &l).is_ok());
        assert!(!check(&req, &[Prerequisite::CheckDstDatasetId], &l).is_ok());

        let empty = req.clone().with_in_datasets(Vec::<String>::new());
        assert!(!check(&empty, &[Prerequisite::CheckInDatasetIds], &l).is_ok());
    }

    #[test]
    fn singleton_operand() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(&dir);
        let blank = ControllerRequest::new(RequestPayload::BranchCheckout { branch: " ".into() });
        assert!(!check(&blank, &[Prerequisite::CheckSingletonOp], &l).is_ok());
        let list = ControllerRequest::new(RequestPayload::BranchList);
        assert!(!check(&list, &[Prerequisite::CheckSingletonOp], &l).is_ok());
        let pull = ControllerRequest::new(RequestPayload::PullImage {
            image: "trainer:1".into(),
        });
        assert!(check(&pull, &[Prerequisite::CheckSingletonOp], &l).is_ok());
    }
}
