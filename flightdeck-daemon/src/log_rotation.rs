//! Size-capped rotation of the two daemon log files.
//!
//! The daemon only ever writes `daemon.log` and `daemon-err.log`. Once a
//! file grows past 10 MiB it is renamed to `.1`, older backups shift up,
//! and whatever sat at `.5` falls off the end.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{stderr_log_path, stdout_log_path};

const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const BACKUPS_KEPT: usize = 5;

/// Rotate both daemon log files under `home`. A failure on one file is
/// logged and does not block the other.
pub fn rotate_logs(home: &Path) {
    for log in [stdout_log_path(home), stderr_log_path(home)] {
        let rotator = LogRotator::new(log);
        match rotator.rotate_if_oversized() {
            Ok(Some(backup)) => {
                tracing::info!(backup = %backup.display(), "log file rotated")
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(path = %rotator.live.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// Rotation policy for a single live log file and its numbered backups.
struct LogRotator {
    live: PathBuf,
    threshold: u64,
    keep: usize,
}

impl LogRotator {
    fn new(live: PathBuf) -> Self {
        Self {
            live,
            threshold: ROTATE_AT_BYTES,
            keep: BACKUPS_KEPT,
        }
    }

    /// Rotate when the live file has reached the threshold, leaving a fresh
    /// empty live file behind so the daemon always has a writable path.
    /// Returns the backup the old contents moved to, if a rotation happened.
    fn rotate_if_oversized(&self) -> io::Result<Option<PathBuf>> {
        if !self.oversized()? {
            return Ok(None);
        }
        self.shift_backups()?;
        let newest = self.backup(1);
        fs::rename(&self.live, &newest)?;
        fs::File::create(&self.live)?;
        Ok(Some(newest))
    }

    /// A missing live file simply means nothing has been logged yet.
    fn oversized(&self) -> io::Result<bool> {
        match fs::metadata(&self.live) {
            Ok(meta) => Ok(meta.len() >= self.threshold),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// `.N-1` → `.N` down to `.1` → `.2`. Renaming over `.keep` replaces it,
    /// which is how the oldest backup gets dropped.
    fn shift_backups(&self) -> io::Result<()> {
        for n in (1..self.keep).rev() {
            match fs::rename(self.backup(n), self.backup(n + 1)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// `daemon.log` → `daemon.log.<n>`.
    fn backup(&self, n: usize) -> PathBuf {
        let mut name = self.live.as_os_str().to_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const THRESHOLD: u64 = 4 * 1024;

    fn rotator(dir: &TempDir) -> LogRotator {
        LogRotator {
            live: dir.path().join("daemon.log"),
            threshold: THRESHOLD,
            keep: BACKUPS_KEPT,
        }
    }

    fn fill(path: &Path, bytes: usize) {
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn small_and_missing_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let rotator = rotator(&dir);

        assert!(rotator.rotate_if_oversized().unwrap().is_none());

        fill(&rotator.live, 128);
        assert!(rotator.rotate_if_oversized().unwrap().is_none());
        assert!(!rotator.backup(1).exists());
    }

    #[test]
    fn oversized_file_moves_to_a_fresh_backup() {
        let dir = TempDir::new().unwrap();
        let rotator = rotator(&dir);
        fill(&rotator.live, THRESHOLD as usize + 1);

        let backup = rotator.rotate_if_oversized().unwrap().expect("rotated");

        assert_eq!(backup, rotator.backup(1));
        assert!(fs::metadata(&backup).unwrap().len() > 0);
        assert_eq!(
            fs::metadata(&rotator.live).unwrap().len(),
            0,
            "live log is fresh"
        );
    }

    #[test]
    fn backups_shift_and_the_oldest_is_dropped() {
        let dir = TempDir::new().unwrap();
        let rotator = rotator(&dir);

        for n in 1..=BACKUPS_KEPT {
            fs::write(rotator.backup(n), format!("copy-{n}")).unwrap();
        }
        fill(&rotator.live, THRESHOLD as usize + 1);

        assert!(rotator.rotate_if_oversized().unwrap().is_some());

        // Old .1 moved to .2, and nothing beyond the cap survives.
        assert_eq!(fs::read_to_string(rotator.backup(2)).unwrap(), "copy-1");
        assert!(rotator.backup(BACKUPS_KEPT).exists());
        assert!(!rotator.backup(BACKUPS_KEPT + 1).exists());
    }

    #[test]
    fn repeated_rotations_keep_newest_first() {
        let dir = TempDir::new().unwrap();
        let rotator = rotator(&dir);

        for round in 1..=3u8 {
            fs::write(&rotator.live, vec![b'0' + round; THRESHOLD as usize + 1]).unwrap();
            rotator.rotate_if_oversized().unwrap();
        }

        for n in 1..=3 {
            assert!(rotator.backup(n).exists(), ".{n} missing");
        }
        assert!(!rotator.backup(4).exists());
        // .1 holds the most recent round.
        let newest = fs::read(rotator.backup(1)).unwrap();
        assert_eq!(newest[0], b'0' + 3);
    }

    #[test]
    fn rotate_logs_covers_both_daemon_files() {
        let dir = TempDir::new().unwrap();
        let logs = crate::paths::logs_dir(dir.path());
        fs::create_dir_all(&logs).unwrap();

        let stdout = stdout_log_path(dir.path());
        let stderr = stderr_log_path(dir.path());
        fill(&stdout, ROTATE_AT_BYTES as usize + 1);
        fill(&stderr, 64);

        rotate_logs(dir.path());

        assert!(PathBuf::from(format!("{}.1", stdout.display())).exists());
        assert!(!PathBuf::from(format!("{}.1", stderr.display())).exists());
    }
}
