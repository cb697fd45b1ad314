//! Per-job workspace directories and the startup stale sweep.
//!
//! Each executor instance owns exactly one workspace directory under the
//! configured temp root. The directory name prefix is the sole discovery
//! key the stale sweep uses, so unrelated directories in the temp root are
//! never touched. Concurrent sweeps are safe: removing an already-removed
//! directory is a no-op, not an error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::ExecutorError;

/// Directory name prefix for job workspaces; the stale sweep's discovery key.
pub const WORKSPACE_PREFIX: &str = "vfxgen_job_";

/// Workspaces last modified longer ago than this are removed by the
/// startup sweep.
pub const STALE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// An exclusively-owned temporary directory for one executor instance.
///
/// Holds every script and output file created during the instance's
/// lifetime. Removed by [`JobWorkspace::destroy`] or on drop; stale
/// leftovers from crashed processes are reclaimed by [`sweep_stale`].
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Allocate a fresh, uniquely named directory under `temp_root`.
    pub fn create(temp_root: &Path) -> Result<Self, ExecutorError> {
        fs::create_dir_all(temp_root).map_err(|e| {
            ExecutorError::Resource(format!(
                "cannot create temp root {}: {e}",
                temp_root.display()
            ))
        })?;

        let root = temp_root.join(format!(
            "{WORKSPACE_PREFIX}{}",
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir(&root).map_err(|e| {
            ExecutorError::Resource(format!("cannot create workspace {}: {e}", root.display()))
        })?;

        tracing::debug!(workspace = %root.display(), "Created job workspace");
        Ok(Self { root })
    }

    /// The workspace directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Recursively remove this workspace.
    ///
    /// Idempotent, and never raises: teardown runs from `Drop`, so
    /// failures are logged and swallowed.
    pub fn destroy(&self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => tracing::debug!(workspace = %self.root.display(), "Removed job workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                workspace = %self.root.display(),
                error = %e,
                "Failed to remove job workspace",
            ),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Remove stale workspaces left behind by earlier instances.
///
/// Scans `temp_root` for directories carrying [`WORKSPACE_PREFIX`] and
/// removes any whose last-modified time is older than `max_age`.
/// Best-effort throughout: individual failures are logged and skipped,
/// never surfaced to the caller. The age cutoff is computed once at call
/// start, so a workspace created while the sweep runs is never removed.
pub fn sweep_stale(temp_root: &Path, max_age: Duration) {
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    let entries = match fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(temp_root = %temp_root.display(), error = %e, "Stale sweep skipped");
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(WORKSPACE_PREFIX) {
            continue;
        }

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(workspace = %path.display(), error = %e, "Cannot stat workspace");
                continue;
            }
        };
        if modified > cutoff {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => tracing::info!(workspace = %path.display(), "Removed stale workspace"),
            // A concurrent sweep got there first; that is fine.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                workspace = %path.display(),
                error = %e,
                "Failed to remove stale workspace; skipping",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_allocates_distinct_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let a = JobWorkspace::create(temp.path()).expect("workspace a");
        let b = JobWorkspace::create(temp.path()).expect("workspace b");

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert!(a
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .expect("name")
            .starts_with(WORKSPACE_PREFIX));
    }

    #[test]
    fn destroy_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = JobWorkspace::create(temp.path()).expect("workspace");
        let path = ws.path().to_path_buf();

        ws.destroy();
        assert!(!path.exists());
        // Second call must not panic or log an error-level failure.
        ws.destroy();
    }

    #[test]
    fn drop_removes_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = {
            let ws = JobWorkspace::create(temp.path()).expect("workspace");
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn create_fails_with_resource_error_on_unwritable_root() {
        // A regular file where the temp root should be.
        let temp = tempfile::tempdir().expect("tempdir");
        let blocked = temp.path().join("not_a_dir");
        fs::write(&blocked, b"occupied").expect("write");

        let result = JobWorkspace::create(&blocked);
        assert!(matches!(result, Err(ExecutorError::Resource(_))));
    }

    #[test]
    fn sweep_removes_only_matching_old_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stale = temp.path().join(format!("{WORKSPACE_PREFIX}stale"));
        let unrelated = temp.path().join("someone_elses_dir");
        fs::create_dir(&stale).expect("stale dir");
        fs::create_dir(&unrelated).expect("unrelated dir");

        // Ensure the directories' mtimes fall before the sweep cutoff.
        std::thread::sleep(Duration::from_millis(100));
        sweep_stale(temp.path(), Duration::ZERO);

        assert!(!stale.exists(), "matching old directory should be removed");
        assert!(unrelated.exists(), "non-matching directory must survive");
    }

    #[test]
    fn sweep_spares_fresh_workspaces() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fresh = JobWorkspace::create(temp.path()).expect("workspace");

        sweep_stale(temp.path(), STALE_MAX_AGE);
        assert!(fresh.path().exists());
    }

    #[test]
    fn sweep_of_missing_root_is_a_noop() {
        sweep_stale(Path::new("/nonexistent/vfxgen/temp"), Duration::ZERO);
    }
}
