//! Well-known job status labels.
//!
//! Used by callers (e.g. the worker binary) when reporting a job outcome.
//! The execution core itself returns typed results and errors; these
//! labels are the stable strings surfaced to humans and logs.

/// Job created but not yet started.
pub const JOB_PENDING: &str = "pending";

/// Blender process is currently running.
pub const JOB_RUNNING: &str = "running";

/// Process exited 0.
pub const JOB_COMPLETED: &str = "completed";

/// Process exited non-zero or failed to start.
pub const JOB_FAILED: &str = "failed";

/// Process was killed after exceeding its timeout.
pub const JOB_TIMEOUT: &str = "timeout";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_are_unique() {
        let labels = [JOB_PENDING, JOB_RUNNING, JOB_COMPLETED, JOB_FAILED, JOB_TIMEOUT];
        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), labels.len(), "all status labels must be unique");
    }
}
