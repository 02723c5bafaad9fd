//! Core types for Reelcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, ReelcastError};

/// Handle of a content source account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Creator(String);

impl Creator {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Creator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Creator {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

/// A post offered by a candidate source
///
/// `id` is unique within one creator's candidate list; `locator` is whatever
/// the media acquirer needs to fetch the media (usually a page URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: String,
    pub locator: String,
}

impl CandidateItem {
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
        }
    }
}

/// Downloaded, unedited media on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMedia {
    pub path: PathBuf,
}

impl RawMedia {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Edited media ready for publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMedia {
    pub path: PathBuf,
}

impl ProcessedMedia {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Stages of one repost cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SelectCreator,
    FetchCandidates,
    SelectItem,
    Acquire,
    Transform,
    Caption,
    Publish,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SelectCreator => "select_creator",
            Stage::FetchCandidates => "fetch_candidates",
            Stage::SelectItem => "select_item",
            Stage::Acquire => "acquire",
            Stage::Transform => "transform",
            Stage::Caption => "caption",
            Stage::Publish => "publish",
            Stage::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Published {
        creator: Creator,
        item_id: String,
        platform_id: String,
    },
    /// Every candidate was already in the ledger. Not a failure.
    NoNewContent { creator: Creator },
    Failed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
    /// Shutdown was requested; the cycle stopped before `before` started.
    Interrupted { before: Stage },
}

impl CycleOutcome {
    pub fn failed(stage: Stage, error: &ReelcastError) -> Self {
        CycleOutcome::Failed {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Failed { .. })
    }

    /// Process exit code when this is the only cycle run
    pub fn exit_code(&self) -> i32 {
        match self {
            CycleOutcome::Published { .. } | CycleOutcome::NoNewContent { .. } => 0,
            CycleOutcome::Failed { kind, .. } => kind.exit_code(),
            CycleOutcome::Interrupted { .. } => 130,
        }
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Published {
                creator,
                item_id,
                platform_id,
            } => write!(f, "Published({}) {}/{}", platform_id, creator, item_id),
            CycleOutcome::NoNewContent { creator } => write!(f, "NoNewContent {}", creator),
            CycleOutcome::Failed {
                stage,
                kind,
                message,
            } => write!(f, "Failed({}, {}) at {}", kind, message, stage),
            CycleOutcome::Interrupted { before } => write!(f, "Interrupted before {}", before),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;

    #[test]
    fn test_creator_serializes_as_plain_string() {
        let creator = Creator::new("alice");
        assert_eq!(serde_json::to_string(&creator).unwrap(), "\"alice\"");
        assert_eq!(creator.to_string(), "alice");
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = CycleOutcome::Published {
            creator: Creator::new("alice"),
            item_id: "id2".to_string(),
            platform_id: "1789".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "published");
        assert_eq!(json["creator"], "alice");
        assert_eq!(json["item_id"], "id2");
    }

    #[test]
    fn test_failed_outcome_carries_kind_and_stage() {
        let error = ReelcastError::from(PublishError::Rejected("quota".into()));
        let outcome = CycleOutcome::failed(Stage::Publish, &error);

        assert!(outcome.is_failure());
        assert_eq!(outcome.exit_code(), 1);
        let text = outcome.to_string();
        assert!(text.contains("PublishError"));
        assert!(text.contains("quota"));
        assert!(text.contains("publish"));
    }

    #[test]
    fn test_no_new_content_is_not_a_failure() {
        let outcome = CycleOutcome::NoNewContent {
            creator: Creator::new("alice"),
        };
        assert!(!outcome.is_failure());
        assert_eq!(outcome.exit_code(), 0);
    }
}
