use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of an entry in the draft → review → publish lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    PendingReview,
    PendingPublish,
    Published,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 4] = [
        Self::Draft,
        Self::PendingReview,
        Self::PendingPublish,
        Self::Published,
    ];

    /// The only status this one may move to.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::PendingReview),
            Self::PendingReview => Some(Self::PendingPublish),
            Self::PendingPublish => Some(Self::Published),
            Self::Published => None,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending_review",
            Self::PendingPublish => "pending_publish",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus(s.to_string()))
    }
}
