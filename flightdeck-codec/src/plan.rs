//! Plan directory scanning.
//!
//! A plan directory holds a `plan.md` overview plus one file per pipeline
//! stage, named `phase-NN-<slug>.md` where `NN` is the stage's two-digit
//! index (`01` requirements … `07` deploy). Scanning is fail-soft: missing
//! or malformed files are skipped, never fatal.

use std::path::{Path, PathBuf};

use flightdeck_core::types::{PhaseKind, PhaseStatus};

use crate::front_matter;

/// One `phase-NN-*.md` file found in a plan directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPhaseFile {
    pub kind: PhaseKind,
    /// Status from front matter; invalid or missing values fall back to
    /// `pending`.
    pub status: PhaseStatus,
    pub title: Option<String>,
    pub path: PathBuf,
    pub file_name: String,
}

/// The decoded overview of a plan directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPlan {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub phases: Vec<ParsedPhaseFile>,
}

/// Scan a plan directory: `plan.md` front matter plus all phase files,
/// sorted by file name (and therefore by stage index).
pub fn scan_plan_dir(dir: &Path) -> ParsedPlan {
    let mut plan = ParsedPlan::default();

    if let Ok(overview) = front_matter::parse(&dir.join("plan.md")) {
        plan.title = non_empty(overview.fields.get("title"));
        plan.description = non_empty(overview.fields.get("description"));
        plan.status = non_empty(overview.fields.get("status"));
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return plan;
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| phase_index(name).is_some())
        .collect();
    names.sort();

    for file_name in names {
        let Some(kind) = phase_index(&file_name).and_then(PhaseKind::from_file_index) else {
            continue;
        };
        let path = dir.join(&file_name);
        let parsed = front_matter::parse(&path).ok();

        let status = parsed
            .as_ref()
            .and_then(|f| f.fields.get("status"))
            .and_then(|raw| raw.parse::<PhaseStatus>().ok())
            .unwrap_or_default();
        let title = parsed.as_ref().and_then(|f| non_empty(f.fields.get("title")));

        plan.phases.push(ParsedPhaseFile {
            kind,
            status,
            title,
            path,
            file_name,
        });
    }

    plan
}

/// Extract the two-digit index from a `phase-NN*.md` file name.
fn phase_index(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix("phase-")?;
    if !file_name.ends_with(".md") || rest.len() < 2 {
        return None;
    }
    let index = &rest[..2];
    index.bytes().all(|b| b.is_ascii_digit()).then_some(index)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn phase_index_accepts_only_two_digit_md_files() {
        assert_eq!(phase_index("phase-01-requirements.md"), Some("01"));
        assert_eq!(phase_index("phase-07.md"), Some("07"));
        assert_eq!(phase_index("phase-xx-foo.md"), None);
        assert_eq!(phase_index("phase-01.txt"), None);
        assert_eq!(phase_index("plan.md"), None);
    }

    #[test]
    fn scan_reads_overview_and_phase_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("plan.md"),
            "---\ntitle: Apollo\nstatus: active\n---\noverview\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("phase-01-requirements.md"),
            "---\nstatus: complete\ntitle: Requirements\n---\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("phase-04-implementation.md"),
            "---\nstatus: active\n---\n",
        )
        .unwrap();

        let plan = scan_plan_dir(dir.path());
        assert_eq!(plan.title.as_deref(), Some("Apollo"));
        assert_eq!(plan.status.as_deref(), Some("active"));
        assert_eq!(plan.phases.len(), 2);
        assert_eq!(plan.phases[0].kind, PhaseKind::Requirements);
        assert_eq!(plan.phases[0].status, PhaseStatus::Complete);
        assert_eq!(plan.phases[1].kind, PhaseKind::Implementation);
    }

    #[test]
    fn invalid_status_falls_back_to_pending() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("phase-02-planning.md"),
            "---\nstatus: in-flight\n---\n",
        )
        .unwrap();
        let plan = scan_plan_dir(dir.path());
        assert_eq!(plan.phases[0].status, PhaseStatus::Pending);
    }

    #[test]
    fn malformed_phase_file_is_skipped_softly() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("phase-03-research.md"),
            "---\nstatus: [broken\n---\n",
        )
        .unwrap();
        let plan = scan_plan_dir(dir.path());
        // Still listed, with defaults; scanning never fails.
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].status, PhaseStatus::Pending);
    }

    #[test]
    fn missing_directory_yields_empty_plan() {
        let plan = scan_plan_dir(Path::new("/nonexistent/plan/dir"));
        assert!(plan.phases.is_empty());
        assert!(plan.title.is_none());
    }

    #[test]
    fn unknown_index_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("phase-09-extra.md"), "---\n---\n").unwrap();
        let plan = scan_plan_dir(dir.path());
        assert!(plan.phases.is_empty());
    }
}
