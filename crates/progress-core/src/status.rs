//! Status enum shared by runs and steps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a Run or of one of its steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Declared but not started.
    #[default]
    Pending,
    /// Work is in progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
}

impl ProgressStatus {
    /// Returns true if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the status is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Terminal status for a success flag.
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Completed
        } else {
            Self::Failed
        }
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
