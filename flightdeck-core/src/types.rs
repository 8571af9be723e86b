//! Domain types for the Flightdeck lifecycle store.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed project identifier (UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Row id of a lifecycle phase record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseId(pub i64);

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for PhaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One stage of the fixed seven-stage project pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Requirements,
    Planning,
    Research,
    Implementation,
    Testing,
    Review,
    Deploy,
}

impl PhaseKind {
    /// Canonical pipeline ordering: requirements first, deploy last.
    pub const ORDER: [PhaseKind; 7] = [
        PhaseKind::Requirements,
        PhaseKind::Planning,
        PhaseKind::Research,
        PhaseKind::Implementation,
        PhaseKind::Testing,
        PhaseKind::Review,
        PhaseKind::Deploy,
    ];

    /// Two-digit plan file index (`phase-01-*.md` … `phase-07-*.md`).
    pub fn file_index(self) -> &'static str {
        match self {
            PhaseKind::Requirements => "01",
            PhaseKind::Planning => "02",
            PhaseKind::Research => "03",
            PhaseKind::Implementation => "04",
            PhaseKind::Testing => "05",
            PhaseKind::Review => "06",
            PhaseKind::Deploy => "07",
        }
    }

    /// Inverse of [`PhaseKind::file_index`].
    pub fn from_file_index(index: &str) -> Option<PhaseKind> {
        PhaseKind::ORDER
            .into_iter()
            .find(|kind| kind.file_index() == index)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Requirements => "requirements",
            PhaseKind::Planning => "planning",
            PhaseKind::Research => "research",
            PhaseKind::Implementation => "implementation",
            PhaseKind::Testing => "testing",
            PhaseKind::Review => "review",
            PhaseKind::Deploy => "deploy",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requirements" => Ok(PhaseKind::Requirements),
            "planning" => Ok(PhaseKind::Planning),
            "research" => Ok(PhaseKind::Research),
            "implementation" => Ok(PhaseKind::Implementation),
            "testing" => Ok(PhaseKind::Testing),
            "review" => Ok(PhaseKind::Review),
            "deploy" => Ok(PhaseKind::Deploy),
            other => Err(format!(
                "unknown phase kind '{other}'; expected one of: requirements, \
                 planning, research, implementation, testing, review, deploy"
            )),
        }
    }
}

/// Status of a lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Active,
    Blocked,
    Complete,
    Skipped,
}

impl PhaseStatus {
    /// Next status when advancing the pipeline; `None` at terminal states.
    pub fn forward(self) -> Option<PhaseStatus> {
        match self {
            PhaseStatus::Pending => Some(PhaseStatus::Active),
            PhaseStatus::Active => Some(PhaseStatus::Complete),
            PhaseStatus::Complete => None,
            PhaseStatus::Blocked => Some(PhaseStatus::Active),
            PhaseStatus::Skipped => Some(PhaseStatus::Active),
        }
    }

    /// Previous status when rolling back; `None` at the start.
    pub fn backward(self) -> Option<PhaseStatus> {
        match self {
            PhaseStatus::Active => Some(PhaseStatus::Pending),
            PhaseStatus::Complete => Some(PhaseStatus::Active),
            PhaseStatus::Pending => None,
            PhaseStatus::Blocked => Some(PhaseStatus::Pending),
            PhaseStatus::Skipped => Some(PhaseStatus::Pending),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Active => "active",
            PhaseStatus::Blocked => "blocked",
            PhaseStatus::Complete => "complete",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PhaseStatus::Pending),
            "active" => Ok(PhaseStatus::Active),
            "blocked" => Ok(PhaseStatus::Blocked),
            "complete" => Ok(PhaseStatus::Complete),
            "skipped" => Ok(PhaseStatus::Skipped),
            other => Err(format!(
                "unknown phase status '{other}'; expected one of: pending, \
                 active, blocked, complete, skipped"
            )),
        }
    }
}

/// Which side of the sync originated a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    Dashboard,
    Filesystem,
}

impl SyncSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncSource::Dashboard => "dashboard",
            SyncSource::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A project tracked in the mission-control store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Directory holding `plan.md` and `phase-NN-*.md` files, if file-backed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_dir: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One lifecycle phase record. The store owns these; the sync engine mutates
/// `status` and `agent_id` but never deletes a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub id: PhaseId,
    pub project_id: ProjectId,
    pub kind: PhaseKind,
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Absolute path of the phase's backing plan file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field-wise partial update of a phase record. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct PhaseUpdate {
    pub status: Option<PhaseStatus>,
    /// `Some(None)` clears the agent assignment.
    pub agent_id: Option<Option<String>>,
    pub plan_file_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.agent_id.is_none()
            && self.plan_file_path.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
    }
}

/// Append-only audit record of one sync event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub source: SyncSource,
    pub entity_type: String,
    pub entity_id: String,
    /// JSON-encoded description of the change.
    pub change: serde_json::Value,
    pub conflict_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncLogEntry {
    /// Entry for a lifecycle phase, the only entity the engine audits.
    pub fn for_phase(
        source: SyncSource,
        phase_id: PhaseId,
        change: serde_json::Value,
        conflict_resolved: bool,
    ) -> Self {
        Self {
            source,
            entity_type: "lifecycle_phase".to_string(),
            entity_id: phase_id.to_string(),
            change,
            conflict_resolved,
            resolution: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
