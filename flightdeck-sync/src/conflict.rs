//! Live conflict records and resolution choices.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flightdeck_core::types::PhaseId;
use flightdeck_detector::FieldConflict;

/// A detected field conflict pinned to its phase and file.
///
/// Lives only in engine memory. Resolution tombstones the record by setting
/// `resolved_at`; it is never removed from the internal list, so ids stay
/// stable for the life of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConflict {
    /// Stable identifier assigned at detection time; callers resolve by id.
    pub id: u64,
    pub phase_id: PhaseId,
    pub path: PathBuf,
    #[serde(flatten)]
    pub field: FieldConflict,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ActiveConflict {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Which side wins when a human resolves a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the store's value; rewrite the file to match.
    UseDashboard,
    /// Keep the file's value; update the store to match.
    UseFile,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::UseDashboard => "use_dashboard",
            Resolution::UseFile => "use_file",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_dashboard" | "dashboard" => Ok(Resolution::UseDashboard),
            "use_file" | "file" => Ok(Resolution::UseFile),
            other => Err(format!(
                "unknown resolution '{other}'; expected 'use_dashboard' or 'use_file'"
            )),
        }
    }
}
