//! Error taxonomy for the Blender execution crate.
//!
//! All fatal conditions surface as typed [`ExecutorError`] values at the
//! `process_request` boundary. Nothing is retried inside this crate, and
//! teardown-time cleanup failures are logged rather than raised.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a timed-out process left (or failed to leave) the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Exited within the grace period after the graceful terminate signal.
    Terminated,
    /// Ignored the terminate signal and exited after the forceful kill.
    Killed,
    /// Exit could not be confirmed even after the forceful kill; the
    /// process was abandoned rather than blocking the caller further.
    Abandoned,
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminated => "terminated",
            Self::Killed => "killed",
            Self::Abandoned => "abandoned",
        })
    }
}

/// Errors raised by workspace management and process execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// No Blender executable at the configured or discovered path.
    /// Kept distinct from other spawn failures so callers can retry with
    /// a different path for this case only.
    #[error("Blender executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    /// The process exceeded its wall-clock timeout. Raised only after the
    /// full escalation sequence has run.
    #[error("Blender run timed out after {timeout:?} (process {outcome})")]
    Timeout {
        /// The configured wall-clock timeout that was exceeded.
        timeout: Duration,
        /// Where the escalation sequence left the process.
        outcome: TerminationOutcome,
    },

    /// The process exited on its own with a non-zero return code.
    #[error("Blender exited with code {return_code}: {stderr}")]
    ToolFailure {
        /// Process return code.
        return_code: i32,
        /// Captured stderr output (typically a Python traceback).
        stderr: String,
    },

    /// Workspace creation failed (unwritable temp root, etc.). Raised on
    /// the create path only; cleanup failures are swallowed.
    #[error("workspace resource error: {0}")]
    Resource(String),

    /// I/O error while spawning or communicating with the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_executable_not_found() {
        let err = ExecutorError::ExecutableNotFound(PathBuf::from("/opt/blender/blender"));
        assert_eq!(
            err.to_string(),
            "Blender executable not found: /opt/blender/blender"
        );
    }

    #[test]
    fn display_timeout_names_outcome() {
        let err = ExecutorError::Timeout {
            timeout: Duration::from_secs(30),
            outcome: TerminationOutcome::Killed,
        };
        assert!(err.to_string().contains("30s"));
        assert!(err.to_string().contains("killed"));
    }

    #[test]
    fn display_tool_failure_carries_stderr() {
        let err = ExecutorError::ToolFailure {
            return_code: 1,
            stderr: "Traceback (most recent call last):".to_string(),
        };
        assert!(err.to_string().contains("code 1"));
        assert!(err.to_string().contains("Traceback"));
    }

    #[test]
    fn io_error_has_source() {
        let err = ExecutorError::Io(std::io::Error::other("pipe closed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
