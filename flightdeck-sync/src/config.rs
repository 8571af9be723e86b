//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How long a path must stay quiet after its last modification event before
/// the engine processes it. Absorbs editors that save in rapid bursts.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// How long a path stays suppressed after the engine's own write to it.
/// Watch events landing inside this window are treated as echoes.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(2);

/// File extension of plan files the engine reacts to.
pub const PLAN_FILE_EXTENSION: &str = "md";

/// Maximum directory depth below the plan directory that is watched.
pub const WATCH_DEPTH: usize = 2;

/// Tunables for one [`SyncEngine`](crate::SyncEngine) instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the plan files to watch.
    pub plan_dir: PathBuf,
    pub debounce: Duration,
    pub suppression: Duration,
    pub extension: String,
    pub depth: usize,
}

impl SyncConfig {
    pub fn new(plan_dir: impl Into<PathBuf>) -> Self {
        Self {
            plan_dir: plan_dir.into(),
            debounce: DEBOUNCE_WINDOW,
            suppression: SUPPRESSION_WINDOW,
            extension: PLAN_FILE_EXTENSION.to_string(),
            depth: WATCH_DEPTH,
        }
    }

    /// Shrunk windows for tests that exercise timing behavior.
    pub fn with_windows(mut self, debounce: Duration, suppression: Duration) -> Self {
        self.debounce = debounce;
        self.suppression = suppression;
        self
    }
}
