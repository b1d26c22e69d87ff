/// Checkpoint status definitions for tracking extraction progress
///
/// This module defines every state a URL can be in during extraction and the
/// transitions allowed between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current extraction state of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    // ===== Active States =====
    /// URL is waiting to be extracted (first attempt or a retry)
    Pending,

    /// URL is currently being extracted by a worker
    InProgress,

    // ===== Terminal States =====
    /// Article was extracted and saved
    Success,

    /// Extraction failed permanently (non-retryable, or retries exhausted)
    Failed,
}

impl CheckpointStatus {
    /// Returns true if this is a terminal state (never re-attempted without a reset)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns true if a URL in this state should be put on the work queue
    ///
    /// `InProgress` is eligible: an entry only stays in that state when the
    /// process stopped before the worker finished.
    pub fn is_eligible(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the move from `self` to `next` is allowed
    ///
    /// Pending -> InProgress -> {Success | Pending (retry) | Failed}.
    /// InProgress -> InProgress re-claims an entry left behind by an interrupted run.
    pub fn can_transition_to(&self, next: CheckpointStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Success)
                | (Self::InProgress, Self::Pending)
                | (Self::InProgress, Self::Failed)
        )
    }

    /// Returns the string form used in the checkpoint file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
