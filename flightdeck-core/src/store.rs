//! SQLite-backed lifecycle store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.flightdeck/
//!   flightdeck.db    (projects, lifecycle_phases, sync_log)
//! ```
//!
//! The connection is opened with WAL journaling, a 5 s busy timeout, and
//! foreign keys enforced; the schema is created idempotently on open.
//!
//! # API pattern
//!
//! Every function that needs a database location has two forms:
//! - `open_at(home: &Path)` — explicit home; used in tests with `TempDir`
//! - `open_default()` — derives home from `dirs::home_dir()`
//!
//! Tests must NEVER call `open_default`; always use `open_at` or `open_path`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{io_err, StoreError};
use crate::types::{
    PhaseId, PhaseKind, PhaseRecord, PhaseStatus, PhaseUpdate, Project, ProjectId, SyncLogEntry,
    SyncSource,
};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    plan_dir    TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lifecycle_phases (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id      TEXT NOT NULL REFERENCES projects(id),
    phase           TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    agent_id        TEXT,
    plan_file_path  TEXT,
    started_at      TEXT,
    completed_at    TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_phases_project ON lifecycle_phases(project_id);
CREATE INDEX IF NOT EXISTS idx_phases_file ON lifecycle_phases(plan_file_path);

CREATE TABLE IF NOT EXISTS sync_log (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    source             TEXT NOT NULL,
    entity_type        TEXT NOT NULL,
    entity_id          TEXT NOT NULL,
    change             TEXT NOT NULL,
    conflict_resolved  INTEGER NOT NULL DEFAULT 0,
    resolution         TEXT,
    timestamp          TEXT NOT NULL
);
";

/// `<home>/.flightdeck/flightdeck.db` — pure, no I/O.
pub fn db_path_at(home: &Path) -> PathBuf {
    home.join(".flightdeck").join("flightdeck.db")
}

/// Shared handle to the SQLite store.
///
/// Internally serializes access through a mutex; every operation is a short
/// read-modify-write, so the store never holds the lock across I/O waits
/// other than SQLite's own.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the store at an explicit database path.
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open the store under `<home>/.flightdeck/`.
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        Self::open_path(&db_path_at(home))
    }

    /// Open the store under the user's home directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Self::open_at(&home)
    }

    /// In-memory store for unit tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Recover the connection even if a panicking thread poisoned the lock.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Create a project and seed its seven pipeline phases (all `pending`)
    /// in a single transaction.
    pub fn create_project(
        &self,
        name: &str,
        plan_dir: Option<&Path>,
    ) -> Result<Project, StoreError> {
        let id = ProjectId(Uuid::new_v4().to_string());
        let now = Utc::now();

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO projects (id, name, plan_dir, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id.0,
                name,
                plan_dir.map(|p| p.to_string_lossy().into_owned()),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        for kind in PhaseKind::ORDER {
            tx.execute(
                "INSERT INTO lifecycle_phases (project_id, phase, status, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4)",
                rusqlite::params![id.0, kind.as_str(), now.to_rfc3339(), now.to_rfc3339()],
            )?;
        }
        tx.commit()?;
        drop(conn);

        self.project(&id)
    }

    pub fn project(&self, id: &ProjectId) -> Result<Project, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name, plan_dir, created_at, updated_at FROM projects WHERE id = ?1",
            [&id.0],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| StoreError::ProjectNotFound(id.clone()))
    }

    /// All projects, newest first.
    pub fn projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, plan_dir, created_at, updated_at
             FROM projects ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_project)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Find a project by exact name.
    pub fn project_by_name(&self, name: &str) -> Result<Option<Project>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name, plan_dir, created_at, updated_at
             FROM projects WHERE name = ?1 LIMIT 1",
            [name],
            row_to_project,
        )
        .optional()
        .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    /// Phases of a project in record order (matches the seeding order).
    pub fn phases(&self, project_id: &ProjectId) -> Result<Vec<PhaseRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHASE_COLUMNS} FROM lifecycle_phases WHERE project_id = ?1 ORDER BY id",
        ))?;
        let rows = stmt.query_map([&project_id.0], row_to_phase)?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(parse_phase_row)
            .collect()
    }

    pub fn phase(&self, id: PhaseId) -> Result<PhaseRecord, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {PHASE_COLUMNS} FROM lifecycle_phases WHERE id = ?1"),
                [id.0],
                row_to_phase,
            )
            .optional()?
            .ok_or(StoreError::PhaseNotFound(id))?;
        parse_phase_row(raw)
    }

    /// Phase of a project by pipeline stage.
    pub fn phase_by_kind(
        &self,
        project_id: &ProjectId,
        kind: PhaseKind,
    ) -> Result<Option<PhaseRecord>, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {PHASE_COLUMNS} FROM lifecycle_phases
                     WHERE project_id = ?1 AND phase = ?2 LIMIT 1"
                ),
                rusqlite::params![project_id.0, kind.as_str()],
                row_to_phase,
            )
            .optional()?;
        raw.map(parse_phase_row).transpose()
    }

    /// Find the phase whose `plan_file_path` matches `path` exactly.
    ///
    /// Tries the canonicalized absolute path first, then the path as given,
    /// to tolerate normalization differences between the watcher and the
    /// value recorded at link time.
    pub fn find_phase_by_path(&self, path: &Path) -> Result<Option<PhaseRecord>, StoreError> {
        if let Ok(absolute) = std::fs::canonicalize(path) {
            if let Some(phase) = self.find_phase_by_exact_path(&absolute)? {
                return Ok(Some(phase));
            }
        }
        self.find_phase_by_exact_path(path)
    }

    fn find_phase_by_exact_path(&self, path: &Path) -> Result<Option<PhaseRecord>, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {PHASE_COLUMNS} FROM lifecycle_phases
                     WHERE plan_file_path = ?1 LIMIT 1"
                ),
                [path.to_string_lossy()],
                row_to_phase,
            )
            .optional()?;
        raw.map(parse_phase_row).transpose()
    }

    /// Apply a partial update and return the fresh record. Always bumps
    /// `updated_at`; an empty update is just a timestamp bump.
    pub fn update_phase(&self, id: PhaseId, update: &PhaseUpdate) -> Result<PhaseRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut fields = vec!["updated_at = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

        if let Some(status) = update.status {
            fields.push("status = ?".to_string());
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(agent) = &update.agent_id {
            fields.push("agent_id = ?".to_string());
            values.push(Box::new(agent.clone()));
        }
        if let Some(path) = &update.plan_file_path {
            fields.push("plan_file_path = ?".to_string());
            values.push(Box::new(path.to_string_lossy().into_owned()));
        }
        if let Some(started) = update.started_at {
            fields.push("started_at = ?".to_string());
            values.push(Box::new(started.to_rfc3339()));
        }
        if let Some(completed) = update.completed_at {
            fields.push("completed_at = ?".to_string());
            values.push(Box::new(completed.to_rfc3339()));
        }
        values.push(Box::new(id.0));

        {
            let conn = self.lock();
            let sql = format!(
                "UPDATE lifecycle_phases SET {} WHERE id = ?",
                fields.join(", ")
            );
            let changed = conn.execute(
                &sql,
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            )?;
            if changed == 0 {
                return Err(StoreError::PhaseNotFound(id));
            }
        }

        self.phase(id)
    }

    /// Advance a phase along the pipeline, stamping `started_at` /
    /// `completed_at` as it enters `active` / `complete`. Terminal states
    /// are a no-op returning the current status.
    pub fn advance_phase(&self, id: PhaseId) -> Result<PhaseStatus, StoreError> {
        let phase = self.phase(id)?;
        let Some(next) = phase.status.forward() else {
            return Ok(phase.status);
        };

        let now = Utc::now();
        let mut update = PhaseUpdate {
            status: Some(next),
            ..PhaseUpdate::default()
        };
        match next {
            PhaseStatus::Active => update.started_at = Some(now),
            PhaseStatus::Complete => update.completed_at = Some(now),
            _ => {}
        }
        self.update_phase(id, &update)?;
        Ok(next)
    }

    /// Roll a phase back one step. No-op at `pending`.
    pub fn rollback_phase(&self, id: PhaseId) -> Result<PhaseStatus, StoreError> {
        let phase = self.phase(id)?;
        let Some(prev) = phase.status.backward() else {
            return Ok(phase.status);
        };
        self.update_phase(
            id,
            &PhaseUpdate {
                status: Some(prev),
                ..PhaseUpdate::default()
            },
        )?;
        Ok(prev)
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    /// Append one audit entry. Write-only from the engine's perspective.
    pub fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        let change = serde_json::to_string(&entry.change)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sync_log
                 (source, entity_type, entity_id, change, conflict_resolved, resolution, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                entry.source.as_str(),
                entry.entity_type,
                entry.entity_id,
                change,
                entry.conflict_resolved as i64,
                entry.resolution,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent audit entries, newest first. For display; the engine
    /// never reads these back.
    pub fn sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT source, entity_type, entity_id, change, conflict_resolved, resolution, timestamp
             FROM sync_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(RawLogRow {
                source: row.get(0)?,
                entity_type: row.get(1)?,
                entity_id: row.get(2)?,
                change: row.get(3)?,
                conflict_resolved: row.get::<_, i64>(4)? != 0,
                resolution: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(parse_log_row)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const PHASE_COLUMNS: &str = "id, project_id, phase, status, agent_id, plan_file_path, \
                             started_at, completed_at, created_at, updated_at";

struct RawPhaseRow {
    id: i64,
    project_id: String,
    phase: String,
    status: String,
    agent_id: Option<String>,
    plan_file_path: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_phase(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPhaseRow> {
    Ok(RawPhaseRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        phase: row.get(2)?,
        status: row.get(3)?,
        agent_id: row.get(4)?,
        plan_file_path: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn parse_phase_row(raw: RawPhaseRow) -> Result<PhaseRecord, StoreError> {
    let kind = raw.phase.parse::<PhaseKind>().map_err(|_| StoreError::CorruptRow {
        column: "phase",
        value: raw.phase.clone(),
    })?;
    let status = raw.status.parse::<PhaseStatus>().map_err(|_| StoreError::CorruptRow {
        column: "status",
        value: raw.status.clone(),
    })?;
    Ok(PhaseRecord {
        id: PhaseId(raw.id),
        project_id: ProjectId(raw.project_id),
        kind,
        status,
        agent_id: raw.agent_id,
        plan_file_path: raw.plan_file_path.map(PathBuf::from),
        started_at: parse_opt_timestamp("started_at", raw.started_at)?,
        completed_at: parse_opt_timestamp("completed_at", raw.completed_at)?,
        created_at: parse_timestamp("created_at", &raw.created_at)?,
        updated_at: parse_timestamp("updated_at", &raw.updated_at)?,
    })
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(Project {
        id: ProjectId(row.get(0)?),
        name: row.get(1)?,
        plan_dir: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        // Timestamps written by this store are always RFC 3339.
        created_at: parse_timestamp("created_at", &created_at)
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
        updated_at: parse_timestamp("updated_at", &updated_at)
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
    })
}

struct RawLogRow {
    source: String,
    entity_type: String,
    entity_id: String,
    change: String,
    conflict_resolved: bool,
    resolution: Option<String>,
    timestamp: String,
}

fn parse_log_row(raw: RawLogRow) -> Result<SyncLogEntry, StoreError> {
    let source = match raw.source.as_str() {
        "dashboard" => SyncSource::Dashboard,
        "filesystem" => SyncSource::Filesystem,
        other => {
            return Err(StoreError::CorruptRow {
                column: "source",
                value: other.to_string(),
            })
        }
    };
    Ok(SyncLogEntry {
        source,
        entity_type: raw.entity_type,
        entity_id: raw.entity_id,
        change: serde_json::from_str(&raw.change)?,
        conflict_resolved: raw.conflict_resolved,
        resolution: raw.resolution,
        timestamp: parse_timestamp("timestamp", &raw.timestamp)?,
    })
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptRow {
            column,
            value: value.to_string(),
        })
}

fn parse_opt_timestamp(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_project_seeds_seven_pending_phases() {
        let store = Store::open_in_memory().unwrap();
        let project = store.create_project("apollo", None).unwrap();
        let phases = store.phases(&project.id).unwrap();

        assert_eq!(phases.len(), 7);
        let kinds: Vec<PhaseKind> = phases.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, PhaseKind::ORDER.to_vec());
        assert!(phases.iter().all(|p| p.status == PhaseStatus::Pending));
    }

    #[test]
    fn update_phase_bumps_updated_at_and_applies_fields() {
        let store = Store::open_in_memory().unwrap();
        let project = store.create_project("apollo", None).unwrap();
        let phase = store.phases(&project.id).unwrap().remove(0);

        let updated = store
            .update_phase(
                phase.id,
                &PhaseUpdate {
                    status: Some(PhaseStatus::Active),
                    agent_id: Some(Some("agent-7".to_string())),
                    ..PhaseUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, PhaseStatus::Active);
        assert_eq!(updated.agent_id.as_deref(), Some("agent-7"));
        assert!(updated.updated_at >= phase.updated_at);
    }

    #[test]
    fn clearing_agent_id_with_explicit_none() {
        let store = Store::open_in_memory().unwrap();
        let project = store.create_project("apollo", None).unwrap();
        let phase = store.phases(&project.id).unwrap().remove(0);

        store
            .update_phase(
                phase.id,
                &PhaseUpdate {
                    agent_id: Some(Some("agent-7".to_string())),
                    ..PhaseUpdate::default()
                },
            )
            .unwrap();
        let cleared = store
            .update_phase(
                phase.id,
                &PhaseUpdate {
                    agent_id: Some(None),
                    ..PhaseUpdate::default()
                },
            )
            .unwrap();
        assert!(cleared.agent_id.is_none());
    }

    #[test]
    fn find_phase_by_path_matches_exact_recorded_path() {
        let store = Store::open_in_memory().unwrap();
        let project = store.create_project("apollo", None).unwrap();
        let phase = store.phases(&project.id).unwrap().remove(0);

        let path = PathBuf::from("/plans/apollo/phase-01-requirements.md");
        store
            .update_phase(
                phase.id,
                &PhaseUpdate {
                    plan_file_path: Some(path.clone()),
                    ..PhaseUpdate::default()
                },
            )
            .unwrap();

        let found = store.find_phase_by_path(&path).unwrap();
        assert_eq!(found.map(|p| p.id), Some(phase.id));

        let missing = store
            .find_phase_by_path(Path::new("/plans/apollo/unmapped.md"))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn advance_stamps_started_and_completed() {
        let store = Store::open_in_memory().unwrap();
        let project = store.create_project("apollo", None).unwrap();
        let phase = store.phases(&project.id).unwrap().remove(0);

        assert_eq!(store.advance_phase(phase.id).unwrap(), PhaseStatus::Active);
        let active = store.phase(phase.id).unwrap();
        assert!(active.started_at.is_some());
        assert!(active.completed_at.is_none());

        assert_eq!(store.advance_phase(phase.id).unwrap(), PhaseStatus::Complete);
        let complete = store.phase(phase.id).unwrap();
        assert!(complete.completed_at.is_some());

        // Terminal state: advancing again is a no-op.
        assert_eq!(store.advance_phase(phase.id).unwrap(), PhaseStatus::Complete);
    }

    #[test]
    fn rollback_walks_statuses_backward() {
        let store = Store::open_in_memory().unwrap();
        let project = store.create_project("apollo", None).unwrap();
        let phase = store.phases(&project.id).unwrap().remove(0);

        store.advance_phase(phase.id).unwrap();
        store.advance_phase(phase.id).unwrap();
        assert_eq!(store.rollback_phase(phase.id).unwrap(), PhaseStatus::Active);
        assert_eq!(store.rollback_phase(phase.id).unwrap(), PhaseStatus::Pending);
        assert_eq!(store.rollback_phase(phase.id).unwrap(), PhaseStatus::Pending);
    }

    #[test]
    fn sync_log_roundtrip_newest_first() {
        let store = Store::open_in_memory().unwrap();
        for n in 0..3 {
            store
                .append_sync_log(&SyncLogEntry::for_phase(
                    SyncSource::Filesystem,
                    PhaseId(n),
                    serde_json::json!({ "n": n }),
                    false,
                ))
                .unwrap();
        }

        let entries = store.sync_log(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entity_id, "2");
        assert_eq!(entries[1].entity_id, "1");
        assert_eq!(entries[0].source, SyncSource::Filesystem);
    }

    #[test]
    fn unknown_phase_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.phase(PhaseId(999)).unwrap_err();
        assert!(matches!(err, StoreError::PhaseNotFound(PhaseId(999))));
    }
}
