//! Transfer status values reported by the telephony platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a live transfer.
///
/// `Pending` is set locally when a transfer starts; every other value arrives
/// through the per-leg and dial-outcome callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    Pending,
    Queued,
    Ringing,
    InProgress,
    Initiated,
    Answered,
    Completed,
    Busy,
    NoAnswer,
    Failed,
}

impl TransferStatus {
    /// Parse a platform status string. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "in-progress" | "in_progress" => Some(Self::InProgress),
            "initiated" => Some(Self::Initiated),
            "answered" => Some(Self::Answered),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "no-answer" | "no_answer" => Some(Self::NoAnswer),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Initiated => "initiated",
            Self::Answered => "answered",
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::NoAnswer => "no-answer",
            Self::Failed => "failed",
        }
    }

    /// The human answered or the bridged leg finished normally.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Answered | Self::Completed)
    }

    /// The destination could not be reached.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Busy | Self::NoAnswer | Self::Failed)
    }

    /// Whether waiting for this transfer can stop.
    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
