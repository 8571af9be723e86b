use std::path::{Path, PathBuf};

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "flightdeck.sock";

/// Plan directory the daemon watches. Watching stays off until this is set.
pub const PLAN_DIR_ENV: &str = "FLIGHTDECK_PLAN_DIR";
/// Must be set to `true` (or `1`) for the daemon to start the watcher.
pub const SYNC_ENABLED_ENV: &str = "FLIGHTDECK_SYNC_ENABLED";

pub fn flightdeck_root(home: &Path) -> PathBuf {
    home.join(".flightdeck")
}

pub fn plans_dir(home: &Path) -> PathBuf {
    flightdeck_root(home).join("plans")
}

pub fn socket_path(home: &Path) -> PathBuf {
    flightdeck_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    flightdeck_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

/// The configured plan directory, if `FLIGHTDECK_PLAN_DIR` is set non-empty.
pub fn plan_dir_override() -> Option<PathBuf> {
    match std::env::var(PLAN_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Some(PathBuf::from(dir)),
        _ => None,
    }
}

/// Plan directory used for dashboard write-backs: the env override if set,
/// else `<home>/.flightdeck/plans`.
pub fn resolve_plan_dir(home: &Path) -> PathBuf {
    plan_dir_override().unwrap_or_else(|| plans_dir(home))
}

/// File watching is strictly opt-in: both a plan directory and an explicit
/// `FLIGHTDECK_SYNC_ENABLED=true` are required.
pub fn watching_configured() -> bool {
    watch_gate(
        plan_dir_override().as_deref(),
        std::env::var(SYNC_ENABLED_ENV).ok().as_deref(),
    )
}

fn watch_gate(plan_dir: Option<&Path>, flag: Option<&str>) -> bool {
    plan_dir.is_some() && matches!(flag.map(str::trim), Some("true") | Some("1"))
}
