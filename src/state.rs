//! Generic node lifecycle states.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// The instance is up.
    Running,
    /// The instance is being scheduled, staged, or booted.
    Pending,
    /// The instance is gone.
    Terminated,
    /// The backend reported nothing usable.
    #[default]
    Unknown,
}

impl NodeState {
    /// Maps a backend state summary onto the generic lifecycle. Matching is
    /// case-insensitive; empty or unrecognised summaries are `Unknown`.
    #[must_use]
    pub fn from_summary(summary: Option<&str>) -> Self {
        let Some(summary) = summary else {
            return Self::Unknown;
        };
        match summary.trim().to_ascii_lowercase().as_str() {
            "running" | "epilog" => Self::Running,
            "pending" | "prolog" | "boot" => Self::Pending,
            "done" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Pending => "pending",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
