//! Executor configuration and Blender executable discovery.
//!
//! Configuration is environment-driven via [`BlenderConfig::from_env`],
//! following the same `from_env` + `dotenvy` pattern the binaries use.
//! Executable lookup order: explicit config, the `BLENDER_PATH`
//! environment variable, a short list of well-known install locations,
//! then a `PATH` search.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ExecutorError;

/// Environment variable overriding the Blender executable path.
pub const ENV_BLENDER_PATH: &str = "BLENDER_PATH";

/// Environment variable overriding the default job timeout (seconds).
pub const ENV_TIMEOUT_SECS: &str = "VFXGEN_TIMEOUT_SECS";

/// Environment variable overriding the workspace temp root.
pub const ENV_TEMP_ROOT: &str = "VFXGEN_TEMP_ROOT";

/// Well-known install locations, checked before the `PATH` search.
const WELL_KNOWN_PATHS: &[&str] = &[
    "/usr/bin/blender",
    "/usr/local/bin/blender",
    "/opt/blender/blender",
    "/snap/bin/blender",
    "/Applications/Blender.app/Contents/MacOS/Blender",
];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Grace period between the terminate signal and the forceful kill.
const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(5);

/// Grace period between the forceful kill and abandoning the process.
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Configuration for one executor instance.
#[derive(Debug, Clone)]
pub struct BlenderConfig {
    /// Explicit executable path. Takes precedence over discovery; used
    /// as-is even if the file does not exist (the spawn then fails with
    /// [`ExecutorError::ExecutableNotFound`]).
    pub executable: Option<PathBuf>,
    /// Default wall-clock timeout for a job.
    pub default_timeout: Duration,
    /// Base directory under which job workspaces are created.
    pub temp_root: PathBuf,
    /// Bounded wait after the graceful terminate signal.
    pub term_grace: Duration,
    /// Bounded wait after the forceful kill signal.
    pub kill_grace: Duration,
}

impl Default for BlenderConfig {
    fn default() -> Self {
        Self {
            executable: None,
            default_timeout: DEFAULT_TIMEOUT,
            temp_root: env::temp_dir(),
            term_grace: DEFAULT_TERM_GRACE,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl BlenderConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or invalid.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var(ENV_BLENDER_PATH) {
            if !path.is_empty() {
                config.executable = Some(PathBuf::from(path));
            }
        }

        if let Ok(raw) = env::var(ENV_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.default_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid {ENV_TIMEOUT_SECS}; using default",
                ),
            }
        }

        if let Ok(root) = env::var(ENV_TEMP_ROOT) {
            if !root.is_empty() {
                config.temp_root = PathBuf::from(root);
            }
        }

        config
    }

    /// Resolve the Blender executable to invoke.
    ///
    /// Order: explicit config, `BLENDER_PATH`, well-known install
    /// locations, `PATH` search. The first two are returned without an
    /// existence check so that a bad override surfaces as
    /// [`ExecutorError::ExecutableNotFound`] at spawn time rather than
    /// being silently shadowed by a system install.
    pub fn resolve_executable(&self) -> Result<PathBuf, ExecutorError> {
        if let Some(path) = &self.executable {
            return Ok(path.clone());
        }

        if let Ok(path) = env::var(ENV_BLENDER_PATH) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        for candidate in WELL_KNOWN_PATHS {
            let candidate = Path::new(candidate);
            if candidate.is_file() {
                return Ok(candidate.to_path_buf());
            }
        }

        if let Some(raw_path) = env::var_os("PATH") {
            for dir in env::split_paths(&raw_path) {
                let candidate = dir.join("blender");
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(ExecutorError::ExecutableNotFound(PathBuf::from("blender")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard};

    use super::*;

    /// Serializes tests that mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    struct EnvVar {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvVar {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = env::var(key).ok();
            env::set_var(key, value);
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = env::var(key).ok();
            env::remove_var(key);
            Self { key, prev }
        }
    }

    impl Drop for EnvVar {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn defaults_are_sane() {
        let config = BlenderConfig::default();
        assert!(config.executable.is_none());
        assert_eq!(config.default_timeout, Duration::from_secs(120));
        assert_eq!(config.term_grace, Duration::from_secs(5));
        assert_eq!(config.kill_grace, Duration::from_secs(2));
    }

    #[test]
    fn from_env_reads_overrides() {
        let _guard = env_guard();
        let _path = EnvVar::set(ENV_BLENDER_PATH, "/opt/blender/blender");
        let _timeout = EnvVar::set(ENV_TIMEOUT_SECS, "45");
        let _root = EnvVar::set(ENV_TEMP_ROOT, "/var/tmp/vfxgen");

        let config = BlenderConfig::from_env();
        assert_eq!(
            config.executable,
            Some(PathBuf::from("/opt/blender/blender"))
        );
        assert_eq!(config.default_timeout, Duration::from_secs(45));
        assert_eq!(config.temp_root, PathBuf::from("/var/tmp/vfxgen"));
    }

    #[test]
    fn from_env_ignores_invalid_timeout() {
        let _guard = env_guard();
        let _path = EnvVar::unset(ENV_BLENDER_PATH);
        let _root = EnvVar::unset(ENV_TEMP_ROOT);
        let _timeout = EnvVar::set(ENV_TIMEOUT_SECS, "not-a-number");

        let config = BlenderConfig::from_env();
        assert_eq!(config.default_timeout, Duration::from_secs(120));
    }

    #[test]
    fn explicit_executable_wins_over_everything() {
        let _guard = env_guard();
        let _path = EnvVar::set(ENV_BLENDER_PATH, "/somewhere/else");

        let config = BlenderConfig {
            executable: Some(PathBuf::from("/explicit/blender")),
            ..Default::default()
        };
        let resolved = config.resolve_executable().expect("resolve");
        assert_eq!(resolved, PathBuf::from("/explicit/blender"));
    }

    #[test]
    fn env_var_wins_over_path_search() {
        let _guard = env_guard();
        let _path = EnvVar::set(ENV_BLENDER_PATH, "/env/blender");

        let config = BlenderConfig::default();
        let resolved = config.resolve_executable().expect("resolve");
        assert_eq!(resolved, PathBuf::from("/env/blender"));
    }

    #[test]
    fn path_search_finds_executable_on_path() {
        let _guard = env_guard();
        let _path = EnvVar::unset(ENV_BLENDER_PATH);

        // A real install would win the lookup; nothing to assert then.
        if WELL_KNOWN_PATHS.iter().any(|p| Path::new(p).is_file()) {
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let fake = dir.path().join("blender");
        std::fs::write(&fake, "#!/bin/sh\nexit 0\n").expect("write");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
        }

        let prev_path = env::var_os("PATH");
        env::set_var("PATH", dir.path());
        let resolved = BlenderConfig::default().resolve_executable();
        match prev_path {
            Some(p) => env::set_var("PATH", p),
            None => env::remove_var("PATH"),
        }

        assert_eq!(resolved.expect("resolve"), fake);
    }
}
