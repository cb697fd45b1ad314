//! Async adapter over the blocking executor, plus the process-wide
//! default runner accessor.
//!
//! [`AsyncBlenderRunner`] offloads every blocking `process_request` call
//! onto tokio's blocking worker pool, so an event loop is never blocked
//! for the wall-clock duration of a Blender run.
//!
//! Cancellation caveat: dropping the future returned by
//! [`AsyncBlenderRunner::process_request_async`] does not kill the child
//! process; the offloaded call runs to completion on the worker pool.
//! Bounding a runaway process is the executor timeout's job, not the
//! caller's cancellation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use vfxgen_core::codegen::{render_script, CodegenRegistry};
use vfxgen_core::operation::Operation;

use crate::config::BlenderConfig;
use crate::error::ExecutorError;
use crate::executor::{BlenderExecutor, ExecutionResult};
use crate::script;

/// Async front-end over a blocking [`BlenderExecutor`].
pub struct AsyncBlenderRunner {
    executor: Arc<BlenderExecutor>,
    registry: CodegenRegistry,
}

impl AsyncBlenderRunner {
    /// Create a runner with its own executor (and workspace) and the
    /// built-in code-generation catalogue.
    pub fn new(config: BlenderConfig) -> Result<Self, ExecutorError> {
        Ok(Self {
            executor: Arc::new(BlenderExecutor::new(config)?),
            registry: CodegenRegistry::with_builtins(),
        })
    }

    /// Replace the code-generation registry, e.g. to add caller-owned
    /// operation types.
    pub fn with_registry(mut self, registry: CodegenRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn executor(&self) -> &BlenderExecutor {
        &self.executor
    }

    /// Offload one blocking `process_request` call to the worker pool.
    pub async fn process_request_async(
        &self,
        script_path: PathBuf,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        let executor = Arc::clone(&self.executor);
        tokio::task::spawn_blocking(move || executor.process_request(&script_path, timeout))
            .await
            .map_err(|e| ExecutorError::Resource(format!("executor task failed: {e}")))?
    }

    /// Full pipeline: render `operations`, write the script into the
    /// workspace, and execute it with the configured default timeout.
    pub async fn run_operations(
        &self,
        operations: &[Operation],
    ) -> Result<ExecutionResult, ExecutorError> {
        // Rendering is pure; only the write and the run need offloading.
        let rendered = render_script(operations, &self.registry);
        let executor = Arc::clone(&self.executor);
        let timeout = executor.config().default_timeout;

        tokio::task::spawn_blocking(move || {
            let generated = script::write_script(executor.workspace(), &rendered)?;
            executor.process_request(&generated.path, timeout)
        })
        .await
        .map_err(|e| ExecutorError::Resource(format!("executor task failed: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Process-wide default runner
// ---------------------------------------------------------------------------

/// Explicitly-initialized default runner handle.
///
/// Replaces the ad-hoc global singleton of earlier designs: callers that
/// want one shared runner install it once at startup and fetch it through
/// an accessor, and tests reset it between cases.
static DEFAULT_RUNNER: Mutex<Option<Arc<AsyncBlenderRunner>>> = Mutex::new(None);

fn lock_default() -> MutexGuard<'static, Option<Arc<AsyncBlenderRunner>>> {
    DEFAULT_RUNNER.lock().unwrap_or_else(|e| e.into_inner())
}

/// Install the process-wide default runner, replacing any previous one.
/// Returns the shared handle.
pub fn init_default_runner(runner: AsyncBlenderRunner) -> Arc<AsyncBlenderRunner> {
    let shared = Arc::new(runner);
    *lock_default() = Some(Arc::clone(&shared));
    shared
}

/// The process-wide default runner, if one has been installed.
pub fn default_runner() -> Option<Arc<AsyncBlenderRunner>> {
    lock_default().clone()
}

/// Drop the process-wide default runner. Reset hook for tests.
pub fn reset_default_runner() {
    *lock_default() = None;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(temp_root: &std::path::Path) -> BlenderConfig {
        BlenderConfig {
            executable: Some(PathBuf::from("/bin/true")),
            temp_root: temp_root.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn default_runner_roundtrip() {
        let temp = tempfile::tempdir().expect("tempdir");

        assert!(default_runner().is_none());

        let runner = AsyncBlenderRunner::new(test_config(temp.path())).expect("runner");
        let installed = init_default_runner(runner);
        let fetched = default_runner().expect("installed runner");
        assert!(Arc::ptr_eq(&installed, &fetched));

        reset_default_runner();
        assert!(default_runner().is_none());
    }
}
