//! The bidirectional sync engine.
//!
//! One [`SyncEngine`] watches a plan directory and keeps phase front matter
//! and the store's phase records consistent in both directions:
//!
//! ```text
//! file edit → watch event → debounce → parse → find phase → detect →
//!     apply to store | enqueue conflicts → audit entry
//!
//! dashboard write → suppression window set → codec rewrite → audit entry
//! ```
//!
//! All shared state (conflict queue, suppression windows, debounce timers,
//! aggregate status) lives in one mutex-guarded structure; public operations
//! may be called concurrently with watch-triggered processing. Errors inside
//! the watch pipeline are logged and absorbed — the loop never dies.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use flightdeck_codec::front_matter;
use flightdeck_core::types::{
    PhaseId, PhaseKind, PhaseRecord, PhaseStatus, PhaseUpdate, ProjectId, SyncLogEntry, SyncSource,
};
use flightdeck_core::Store;
use flightdeck_detector::{detect, FieldConflict, FieldMap};

use crate::config::SyncConfig;
use crate::conflict::{ActiveConflict, Resolution};
use crate::error::SyncError;

/// Aggregate state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Synced,
    Syncing,
    Conflict,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Conflict => "conflict",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by [`SyncEngine::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub conflict_count: usize,
}

struct WatchGuard {
    events: JoinHandle<()>,
}

struct EngineState {
    status: SyncStatus,
    last_sync: Option<DateTime<Utc>>,
    /// Full conflict history; resolved entries are tombstoned, not removed,
    /// so ids stay stable for the life of the engine.
    conflicts: Vec<ActiveConflict>,
    next_conflict_id: u64,
    /// Paths we recently wrote ourselves, with the write time.
    suppressed: HashMap<PathBuf, Instant>,
    /// Pending (not yet fired) per-path debounce timers.
    debounce: HashMap<PathBuf, JoinHandle<()>>,
    watch: Option<WatchGuard>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            status: SyncStatus::Synced,
            last_sync: None,
            conflicts: Vec::new(),
            next_conflict_id: 1,
            suppressed: HashMap::new(),
            debounce: HashMap::new(),
            watch: None,
        }
    }

    fn unresolved(&self) -> impl Iterator<Item = &ActiveConflict> {
        self.conflicts.iter().filter(|c| !c.is_resolved())
    }

    /// Status when the engine is idle: `conflict` while anything is
    /// outstanding, otherwise `synced`.
    fn idle_status(&self) -> SyncStatus {
        if self.unresolved().next().is_some() {
            SyncStatus::Conflict
        } else {
            SyncStatus::Synced
        }
    }
}

struct Inner {
    store: Arc<Store>,
    config: SyncConfig,
    state: Mutex<EngineState>,
}

/// Handle to the sync engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                state: Mutex::new(EngineState::new()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin watching the plan directory. Idempotent; a running engine is
    /// left untouched. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SyncError> {
        let mut state = self.state();
        if state.watch.is_some() {
            return Ok(());
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&self.inner.config.plan_dir, RecursiveMode::Recursive)?;

        let engine = self.clone();
        let events = tokio::spawn(async move {
            // The watcher lives inside this task; cancelling the task on
            // `stop()` drops it and ends the native watch.
            let _watcher = watcher;
            while let Some(event) = event_rx.recv().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                for path in event.paths {
                    engine.schedule(path);
                }
            }
        });

        state.watch = Some(WatchGuard { events });
        tracing::info!(dir = %self.inner.config.plan_dir.display(), "watching plan directory");
        Ok(())
    }

    /// Stop watching: cancels the watch task and every pending debounce
    /// timer. Processing that already fired runs to completion. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state();
        if let Some(guard) = state.watch.take() {
            guard.events.abort();
            tracing::info!("sync engine stopped");
        }
        for (_, timer) in state.debounce.drain() {
            timer.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().watch.is_some()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        EngineStatus {
            status: state.status,
            last_sync: state.last_sync,
            conflict_count: state.unresolved().count(),
        }
    }

    /// Unresolved conflicts in detection order.
    pub fn conflicts(&self) -> Vec<ActiveConflict> {
        self.state().unresolved().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Dashboard write-back
    // -----------------------------------------------------------------------

    /// Write dashboard-side field updates into a phase's plan file.
    ///
    /// Silent no-op when the phase does not exist or has no backing file —
    /// not every phase is file-backed. The suppression window is set
    /// *before* the codec touches the file, so the watch event our own
    /// write generates is discarded as an echo.
    pub async fn write_to_file(
        &self,
        project_id: &ProjectId,
        kind: PhaseKind,
        updates: BTreeMap<String, serde_yaml::Value>,
    ) -> Result<(), SyncError> {
        let phase = {
            let store = self.inner.store.clone();
            let project_id = project_id.clone();
            tokio::task::spawn_blocking(move || store.phase_by_kind(&project_id, kind)).await??
        };
        let Some(phase) = phase else {
            return Ok(());
        };
        let Some(path) = phase.plan_file_path.clone() else {
            return Ok(());
        };

        self.suppress(&path);
        // Arm the release before touching the file: the window must be
        // reclaimed even when the write (or its task) fails.
        self.schedule_suppression_release(path.clone());
        {
            let updates = updates.clone();
            tokio::task::spawn_blocking(move || front_matter::write(&path, &updates)).await??;
        }

        let written = serde_json::to_value(&updates).unwrap_or(serde_json::Value::Null);
        self.audit(SyncLogEntry::for_phase(
            SyncSource::Dashboard,
            phase.id,
            serde_json::json!({ "written": written }),
            true,
        ))
        .await;

        let mut state = self.state();
        state.last_sync = Some(Utc::now());
        state.status = SyncStatus::Synced;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Conflict resolution
    // -----------------------------------------------------------------------

    /// Resolve one conflict by id.
    ///
    /// `UseFile` applies the file's value to the store; `UseDashboard`
    /// writes the store's value back into the file through the suppression
    /// path. Either way the conflict is tombstoned and the aggregate status
    /// recomputed. A store or codec failure leaves the conflict unresolved
    /// so the caller can retry.
    pub async fn resolve_conflict(&self, id: u64, resolution: Resolution) -> Result<(), SyncError> {
        let conflict = self
            .state()
            .conflicts
            .iter()
            .find(|c| c.id == id && !c.is_resolved())
            .cloned()
            .ok_or(SyncError::ConflictNotFound(id))?;

        match resolution {
            Resolution::UseFile => {
                let update = conflicted_field_update(&conflict.field, &conflict.field.file_value)
                    .ok_or_else(|| SyncError::UnusableConflictValue {
                        id,
                        field: conflict.field.field.clone(),
                        value: conflict.field.file_value.clone(),
                    })?;
                let store = self.inner.store.clone();
                let phase_id = conflict.phase_id;
                tokio::task::spawn_blocking(move || store.update_phase(phase_id, &update))
                    .await??;
            }
            Resolution::UseDashboard => {
                let mut updates = BTreeMap::new();
                updates.insert(
                    conflict.field.field.clone(),
                    serde_yaml::Value::String(conflict.field.db_value.clone()),
                );
                self.suppress(&conflict.path);
                self.schedule_suppression_release(conflict.path.clone());
                let path = conflict.path.clone();
                tokio::task::spawn_blocking(move || front_matter::write(&path, &updates))
                    .await??;
            }
        }

        {
            let mut state = self.state();
            if let Some(entry) = state.conflicts.iter_mut().find(|c| c.id == id) {
                entry.resolved_at = Some(Utc::now());
            }
            state.status = state.idle_status();
        }

        self.audit(
            SyncLogEntry::for_phase(
                SyncSource::Dashboard,
                conflict.phase_id,
                serde_json::json!({ "field": conflict.field.field }),
                true,
            )
            .with_resolution(resolution.as_str()),
        )
        .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Watch pipeline (private)
    // -----------------------------------------------------------------------

    /// React to one raw filesystem event: restart the path's debounce timer.
    /// Only the last event of a burst fires processing.
    fn schedule(&self, path: PathBuf) {
        if !self.is_tracked(&path) {
            return;
        }

        let mut state = self.state();
        if state.watch.is_none() {
            // Stopped between event delivery and scheduling.
            return;
        }
        if let Some(previous) = state.debounce.remove(&path) {
            previous.abort();
        }

        let engine = self.clone();
        let debounce = self.inner.config.debounce;
        let key = path.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            engine.state().debounce.remove(&key);
            // Detached so that `stop()` aborting pending timers cannot
            // cancel processing that already fired.
            let worker = engine.clone();
            tokio::spawn(async move { worker.process_change(key).await });
        });
        state.debounce.insert(path, timer);
    }

    fn is_tracked(&self, path: &Path) -> bool {
        let tracked_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.inner.config.extension))
            .unwrap_or(false);
        if !tracked_ext {
            return false;
        }
        match path.strip_prefix(&self.inner.config.plan_dir) {
            // Bounded depth below the plan directory.
            Ok(rel) => rel.components().count() <= self.inner.config.depth + 1,
            Err(_) => true,
        }
    }

    /// Process one debounced change. Every failure is absorbed: logged and
    /// turned into a status reversion, never a dead watch loop.
    async fn process_change(&self, path: PathBuf) {
        {
            let state = self.state();
            if let Some(written_at) = state.suppressed.get(&path) {
                if written_at.elapsed() < self.inner.config.suppression {
                    tracing::debug!(path = %path.display(), "ignoring echo of our own write");
                    return;
                }
            }
        }

        self.state().status = SyncStatus::Syncing;

        let parsed = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || front_matter::parse(&path)).await
        };
        let parsed = match parsed {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable plan file; skipping");
                self.state().status = SyncStatus::Synced;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "parse task failed");
                self.state().status = SyncStatus::Synced;
                return;
            }
        };

        let phase = {
            let store = self.inner.store.clone();
            let path = path.clone();
            tokio::task::spawn_blocking(move || store.find_phase_by_path(&path)).await
        };
        let phase = match phase {
            Ok(Ok(Some(phase))) => phase,
            Ok(Ok(None)) => {
                // Unmapped files are ignored, not errors.
                tracing::debug!(path = %path.display(), "no phase mapped to this file");
                self.state().status = SyncStatus::Synced;
                return;
            }
            Ok(Err(err)) => {
                tracing::error!(path = %path.display(), error = %err, "phase lookup failed");
                self.state().status = SyncStatus::Synced;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "lookup task failed");
                self.state().status = SyncStatus::Synced;
                return;
            }
        };

        let db_state = db_field_map(&phase);
        let file_state = tracked_fields(&parsed.fields);

        // No last-sync snapshot is persisted, so the baseline is absent and
        // every divergence between the two sides surfaces as a conflict.
        let found = detect(&db_state, &file_state, None);

        if found.is_empty() {
            self.apply_file_state(&phase, &file_state).await;
        } else {
            self.record_conflicts(&path, phase.id, found).await;
        }
    }

    /// No conflicts: the file's values win. Only fields present and
    /// non-empty touch the store.
    async fn apply_file_state(&self, phase: &PhaseRecord, file_state: &FieldMap) {
        let mut update = PhaseUpdate::default();
        if let Some(raw) = file_state.get("status").filter(|s| !s.is_empty()) {
            match raw.parse::<PhaseStatus>() {
                Ok(status) => update.status = Some(status),
                Err(_) => {
                    tracing::warn!(value = %raw, phase = %phase.id, "unknown status in plan file; not applied");
                }
            }
        }
        if let Some(agent) = file_state.get("agent_id").filter(|s| !s.is_empty()) {
            update.agent_id = Some(Some(agent.clone()));
        }

        let applied = serde_json::json!({
            "applied": {
                "status": update.status.map(|s| s.to_string()),
                "agent_id": update.agent_id.clone().flatten(),
            }
        });

        if !update.is_empty() {
            let store = self.inner.store.clone();
            let phase_id = phase.id;
            let result =
                tokio::task::spawn_blocking(move || store.update_phase(phase_id, &update)).await;
            match result {
                Ok(Ok(_)) => {}
                // Best effort: the audit entry below is kept even when the
                // store write failed.
                Ok(Err(err)) => {
                    tracing::error!(phase = %phase.id, error = %err, "store update failed")
                }
                Err(err) => tracing::error!(error = %err, "store update task failed"),
            }
        }

        {
            let mut state = self.state();
            state.last_sync = Some(Utc::now());
            state.status = state.idle_status();
        }

        self.audit(SyncLogEntry::for_phase(
            SyncSource::Filesystem,
            phase.id,
            applied,
            true,
        ))
        .await;
    }

    async fn record_conflicts(&self, path: &Path, phase_id: PhaseId, found: Vec<FieldConflict>) {
        let payload = serde_json::json!({ "conflicts": found });
        let detected_at = Utc::now();
        {
            let mut state = self.state();
            for field in found {
                let id = state.next_conflict_id;
                state.next_conflict_id += 1;
                state.conflicts.push(ActiveConflict {
                    id,
                    phase_id,
                    path: path.to_path_buf(),
                    field,
                    detected_at,
                    resolved_at: None,
                });
            }
            state.status = SyncStatus::Conflict;
        }
        tracing::info!(path = %path.display(), phase = %phase_id, "sync conflict detected");

        self.audit(SyncLogEntry::for_phase(
            SyncSource::Filesystem,
            phase_id,
            payload,
            false,
        ))
        .await;
    }

    // -----------------------------------------------------------------------
    // Suppression windows
    // -----------------------------------------------------------------------

    fn suppress(&self, path: &Path) {
        self.state()
            .suppressed
            .insert(path.to_path_buf(), Instant::now());
    }

    /// Remove the window once it has aged out. A newer write refreshes the
    /// stored instant, in which case this release leaves it alone.
    fn schedule_suppression_release(&self, path: PathBuf) {
        let engine = self.clone();
        let window = self.inner.config.suppression;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut state = engine.state();
            if let Some(written_at) = state.suppressed.get(&path) {
                if written_at.elapsed() >= window {
                    state.suppressed.remove(&path);
                }
            }
        });
    }

    #[cfg(test)]
    fn suppressed_paths(&self) -> usize {
        self.state().suppressed.len()
    }

    /// Append an audit entry; failures are logged, never propagated.
    async fn audit(&self, entry: SyncLogEntry) {
        let store = self.inner.store.clone();
        let result = tokio::task::spawn_blocking(move || store.append_sync_log(&entry)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "sync log append failed"),
            Err(err) => tracing::error!(error = %err, "sync log task failed"),
        }
    }
}

/// The two tracked fields of a phase record, in detector form.
fn db_field_map(phase: &PhaseRecord) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("status".to_string(), phase.status.to_string());
    map.insert(
        "agent_id".to_string(),
        phase.agent_id.clone().unwrap_or_default(),
    );
    map
}

/// The same two fields as read from file front matter; everything else in
/// the front matter is opaque to the engine.
fn tracked_fields(fields: &BTreeMap<String, String>) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert(
        "status".to_string(),
        fields.get("status").cloned().unwrap_or_default(),
    );
    map.insert(
        "agent_id".to_string(),
        fields.get("agent_id").cloned().unwrap_or_default(),
    );
    map
}

/// Turn a conflicted field name + chosen value into a store update.
/// Returns `None` when the value cannot map onto the record.
fn conflicted_field_update(field: &FieldConflict, value: &str) -> Option<PhaseUpdate> {
    let mut update = PhaseUpdate::default();
    match field.field.as_str() {
        "status" => update.status = Some(value.parse::<PhaseStatus>().ok()?),
        "agent_id" => {
            update.agent_id = Some((!value.is_empty()).then(|| value.to_string()));
        }
        _ => return None,
    }
    Some(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase_fixture() -> PhaseRecord {
        PhaseRecord {
            id: PhaseId(1),
            project_id: ProjectId::from("p-1"),
            kind: PhaseKind::Implementation,
            status: PhaseStatus::Active,
            agent_id: Some("agent-7".to_string()),
            plan_file_path: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn db_field_map_coerces_missing_agent_to_empty() {
        let mut phase = phase_fixture();
        phase.agent_id = None;
        let map = db_field_map(&phase);
        assert_eq!(map["status"], "active");
        assert_eq!(map["agent_id"], "");
    }

    #[test]
    fn tracked_fields_ignores_unrelated_front_matter() {
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), "complete".to_string());
        fields.insert("title".to_string(), "Implementation".to_string());
        let map = tracked_fields(&fields);
        assert_eq!(map.len(), 2);
        assert_eq!(map["status"], "complete");
        assert_eq!(map["agent_id"], "");
    }

    #[test]
    fn conflicted_field_update_maps_both_tracked_fields() {
        let status_conflict = FieldConflict {
            field: "status".to_string(),
            db_value: "active".to_string(),
            file_value: "blocked".to_string(),
            last_sync_value: None,
        };
        let update = conflicted_field_update(&status_conflict, "blocked").unwrap();
        assert_eq!(update.status, Some(PhaseStatus::Blocked));

        let agent_conflict = FieldConflict {
            field: "agent_id".to_string(),
            db_value: "a-1".to_string(),
            file_value: "".to_string(),
            last_sync_value: None,
        };
        let update = conflicted_field_update(&agent_conflict, "").unwrap();
        assert_eq!(update.agent_id, Some(None), "empty value clears the agent");
    }

    #[test]
    fn conflicted_field_update_rejects_garbage() {
        let conflict = FieldConflict {
            field: "status".to_string(),
            db_value: "active".to_string(),
            file_value: "in-flight".to_string(),
            last_sync_value: None,
        };
        assert!(conflicted_field_update(&conflict, "in-flight").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_write_back_still_releases_its_suppression_window() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let project = store.create_project("apollo", None).unwrap();
        let phase = store
            .phase_by_kind(&project.id, PhaseKind::Implementation)
            .unwrap()
            .unwrap();

        // Opening fence with no closing one, so the codec rewrite fails.
        let path = tmp.path().join("phase-04-implementation.md");
        std::fs::write(&path, "---\nstatus: pending\n").unwrap();
        store
            .update_phase(
                phase.id,
                &PhaseUpdate {
                    plan_file_path: Some(path.clone()),
                    ..PhaseUpdate::default()
                },
            )
            .unwrap();

        let config = SyncConfig::new(tmp.path()).with_windows(
            std::time::Duration::from_millis(10),
            std::time::Duration::from_millis(50),
        );
        let engine = SyncEngine::new(store, config);

        let mut updates = BTreeMap::new();
        updates.insert(
            "status".to_string(),
            serde_yaml::Value::String("active".to_string()),
        );
        let result = engine
            .write_to_file(&project.id, PhaseKind::Implementation, updates)
            .await;
        assert!(result.is_err(), "the malformed file must fail the rewrite");
        assert_eq!(engine.suppressed_paths(), 1);

        // The window is reclaimed even though the write never landed.
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert_eq!(engine.suppressed_paths(), 0);
    }
}
