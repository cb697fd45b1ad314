//! Blocking Blender process executor with timeout escalation.
//!
//! Spawns `blender --background --script <path>` with the job workspace
//! as its working directory, drains stdout/stderr on dedicated reader
//! threads so the child can never deadlock on a full pipe, and enforces a
//! wall-clock timeout with an explicit escalation sequence:
//! terminate, grace wait, kill, grace wait. Every wait is bounded, so the
//! total time a timed-out child may linger is `term_grace + kill_grace`.
//!
//! The executor is synchronous. `process_request` calls on one instance
//! are strictly sequential; concurrency comes from running multiple
//! instances (each with its own workspace) or from [`crate::runner`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use vfxgen_core::codegen::{render_script, CodegenRegistry, SUCCESS_MARKER};
use vfxgen_core::operation::Operation;

use crate::config::BlenderConfig;
use crate::error::{ExecutorError, TerminationOutcome};
use crate::script::{self, GeneratedScript};
use crate::workspace::{self, JobWorkspace, STALE_MAX_AGE};

/// Maximum bytes captured per output stream (10 MiB). Output beyond this
/// is discarded to bound memory on runaway scripts.
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Interval between exit-status polls while waiting on the child.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Fixed flags passed ahead of the script path.
const BLENDER_FLAGS: &[&str] = &["--background", "--script"];

/// Outcome of one [`BlenderExecutor::process_request`] call.
///
/// Constructed exactly once per call and never mutated.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the process exited 0.
    pub success: bool,
    /// Process return code.
    pub return_code: i32,
    /// Complete captured stdout (capped at 10 MiB).
    pub stdout: String,
    /// Complete captured stderr (capped at 10 MiB).
    pub stderr: String,
    /// The script that was executed.
    pub script_path: PathBuf,
    /// The workspace the process ran in.
    pub workspace_path: PathBuf,
}

impl ExecutionResult {
    /// Whether the epilogue's success marker is the last stdout line.
    ///
    /// Diagnostic only: the executor itself trusts the exit code and never
    /// parses stdout content.
    pub fn has_success_marker(&self) -> bool {
        self.stdout.lines().last().map(str::trim) == Some(SUCCESS_MARKER)
    }
}

/// Lifecycle phase of a spawned child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessPhase {
    Running,
    Terminating,
    Killed,
    Reaped,
}

/// Wraps a live child process and walks it through the phase machine
/// `Running -> (Reaped | Terminating -> Killed -> Reaped)`.
///
/// Exactly one handle exists per in-flight execution.
struct ProcessHandle {
    child: Child,
    phase: ProcessPhase,
}

impl ProcessHandle {
    fn new(child: Child) -> Self {
        Self {
            child,
            phase: ProcessPhase::Running,
        }
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Poll for exit until `deadline`. Returns the exit status once the
    /// process has finished and been reaped, or `None` on deadline expiry.
    fn wait_until(&mut self, deadline: Instant) -> Result<Option<ExitStatus>, ExecutorError> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.phase = ProcessPhase::Reaped;
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Ask the process to exit gracefully (SIGTERM on Unix). Elsewhere
    /// this is already a hard kill and the escalation collapses to one step.
    fn terminate(&mut self) {
        self.phase = ProcessPhase::Terminating;
        #[cfg(unix)]
        // Safety: sending a signal to a pid we spawned and have not yet
        // reaped cannot target a recycled pid.
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM);
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }
    }

    /// Forcefully kill the process (SIGKILL).
    fn kill(&mut self) {
        self.phase = ProcessPhase::Killed;
        let _ = self.child.kill();
    }

    /// Run the full escalation sequence for a timed-out process.
    ///
    /// Both waits are bounded; if even the kill cannot be confirmed the
    /// process is abandoned rather than blocking the caller indefinitely.
    fn escalate(&mut self, term_grace: Duration, kill_grace: Duration) -> TerminationOutcome {
        self.terminate();
        tracing::debug!(pid = self.pid(), phase = ?self.phase, "Sent terminate signal");
        if matches!(self.wait_until(Instant::now() + term_grace), Ok(Some(_))) {
            return TerminationOutcome::Terminated;
        }

        self.kill();
        tracing::debug!(pid = self.pid(), phase = ?self.phase, "Sent kill signal");
        if matches!(self.wait_until(Instant::now() + kill_grace), Ok(Some(_))) {
            TerminationOutcome::Killed
        } else {
            tracing::error!(pid = self.pid(), "Kill not confirmed; abandoning process");
            TerminationOutcome::Abandoned
        }
    }
}

/// Synchronous executor owning one job workspace.
///
/// Construction sweeps stale workspaces left by earlier instances, then
/// allocates a fresh workspace. Dropping the executor terminates any live
/// child and removes the workspace; teardown never raises.
pub struct BlenderExecutor {
    config: BlenderConfig,
    workspace: JobWorkspace,
    /// PID of the in-flight child, if any, so teardown can kill a process
    /// still running when the executor is dropped.
    in_flight: Mutex<Option<u32>>,
}

impl BlenderExecutor {
    /// Create an executor with its own fresh workspace, opportunistically
    /// sweeping stale workspaces under the configured temp root first.
    pub fn new(config: BlenderConfig) -> Result<Self, ExecutorError> {
        workspace::sweep_stale(&config.temp_root, STALE_MAX_AGE);
        let workspace = JobWorkspace::create(&config.temp_root)?;
        Ok(Self {
            config,
            workspace,
            in_flight: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BlenderConfig {
        &self.config
    }

    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    pub(crate) fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }

    /// Render `operations` and write the script into this executor's
    /// workspace, ready for [`BlenderExecutor::process_request`].
    pub fn generate(
        &self,
        operations: &[Operation],
        registry: &CodegenRegistry,
    ) -> Result<GeneratedScript, ExecutorError> {
        let rendered = render_script(operations, registry);
        script::write_script(&self.workspace, &rendered)
    }

    /// Run Blender against `script_path`, blocking until exit or timeout.
    ///
    /// On clean non-zero exit this raises
    /// [`ExecutorError::ToolFailure`] with the captured stderr; a missing
    /// executable raises [`ExecutorError::ExecutableNotFound`]; a timeout
    /// raises [`ExecutorError::Timeout`] after the escalation sequence.
    pub fn process_request(
        &self,
        script_path: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        let executable = self.config.resolve_executable()?;

        let mut command = Command::new(&executable);
        command
            .args(BLENDER_FLAGS)
            .arg(script_path)
            .current_dir(self.workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::ExecutableNotFound(executable.clone())
            } else {
                ExecutorError::Io(e)
            }
        })?;

        let mut handle = ProcessHandle::new(child);
        *self.lock_in_flight() = Some(handle.pid());
        tracing::info!(
            pid = handle.pid(),
            script = %script_path.display(),
            timeout_secs = timeout.as_secs(),
            "Spawned Blender process",
        );

        // Drain both pipes concurrently so the child can never block on a
        // full pipe buffer, however verbose the script is.
        let stdout_thread = spawn_reader(handle.child.stdout.take());
        let stderr_thread = spawn_reader(handle.child.stderr.take());

        let waited = handle.wait_until(started + timeout);
        *self.lock_in_flight() = None;

        match waited {
            Ok(Some(status)) => {
                let stdout = join_reader(stdout_thread);
                let stderr = join_reader(stderr_thread);
                let return_code = status.code().unwrap_or(-1);

                if !status.success() {
                    tracing::warn!(return_code, "Blender exited with failure");
                    return Err(ExecutorError::ToolFailure {
                        return_code,
                        stderr,
                    });
                }

                tracing::info!(
                    return_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Blender run completed",
                );
                Ok(ExecutionResult {
                    success: true,
                    return_code,
                    stdout,
                    stderr,
                    script_path: script_path.to_path_buf(),
                    workspace_path: self.workspace.path().to_path_buf(),
                })
            }
            Ok(None) => {
                tracing::warn!(
                    pid = handle.pid(),
                    timeout_secs = timeout.as_secs(),
                    "Blender run exceeded timeout; escalating",
                );
                let outcome = handle.escalate(self.config.term_grace, self.config.kill_grace);

                // The readers finish once the pipes close. An abandoned
                // process may hold its pipes open, so skip joining there.
                if outcome != TerminationOutcome::Abandoned {
                    let _ = join_reader(stdout_thread);
                    let _ = join_reader(stderr_thread);
                }

                Err(ExecutorError::Timeout { timeout, outcome })
            }
            Err(e) => {
                // Waiting itself failed; make sure the child does not
                // outlive the call.
                handle.kill();
                let _ = handle.child.wait();
                Err(e)
            }
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<u32>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for BlenderExecutor {
    fn drop(&mut self) {
        // Teardown never raises. The workspace removes itself on drop.
        if let Some(pid) = self.lock_in_flight().take() {
            tracing::warn!(pid, "Executor dropped with live process; killing");
            #[cfg(unix)]
            // Safety: best-effort signal; an already-exited pid is a no-op
            // error from kill(2), which we ignore.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
}

/// Read an output stream to the end on a dedicated thread, capped at
/// [`MAX_OUTPUT_BYTES`].
fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(stream) = stream {
            let _ = stream.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf);
        }
        buf
    })
}

fn join_reader(handle: thread::JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_cmd(program: &str, args: &[&str]) -> ProcessHandle {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn test process");
        ProcessHandle::new(child)
    }

    #[test]
    fn wait_until_reaps_quick_exit() {
        let mut handle = spawn_cmd("true", &[]);
        let status = handle
            .wait_until(Instant::now() + Duration::from_secs(5))
            .expect("wait")
            .expect("should exit well within deadline");
        assert!(status.success());
        assert_eq!(handle.phase, ProcessPhase::Reaped);
    }

    #[test]
    fn wait_until_returns_none_on_deadline() {
        let mut handle = spawn_cmd("sleep", &["30"]);
        let waited = handle
            .wait_until(Instant::now() + Duration::from_millis(100))
            .expect("wait");
        assert!(waited.is_none());
        assert_eq!(handle.phase, ProcessPhase::Running);

        handle.kill();
        let _ = handle.child.wait();
    }

    #[cfg(unix)]
    #[test]
    fn escalate_terminates_cooperative_process() {
        let mut handle = spawn_cmd("sleep", &["30"]);
        let outcome = handle.escalate(Duration::from_secs(2), Duration::from_secs(2));
        assert_eq!(outcome, TerminationOutcome::Terminated);
        assert_eq!(handle.phase, ProcessPhase::Reaped);
    }

    #[cfg(unix)]
    #[test]
    fn escalate_kills_process_that_ignores_terminate() {
        let mut handle = spawn_cmd("sh", &["-c", "trap '' TERM; sleep 30"]);
        // Give the shell a moment to install the trap.
        thread::sleep(Duration::from_millis(200));

        let outcome = handle.escalate(Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(outcome, TerminationOutcome::Killed);
        assert_eq!(handle.phase, ProcessPhase::Reaped);
    }

    #[test]
    fn success_marker_checks_last_stdout_line() {
        let mut result = ExecutionResult {
            success: true,
            return_code: 0,
            stdout: format!("Blender quit\n{SUCCESS_MARKER}\n"),
            stderr: String::new(),
            script_path: PathBuf::from("/tmp/s.py"),
            workspace_path: PathBuf::from("/tmp/ws"),
        };
        assert!(result.has_success_marker());

        result.stdout = format!("{SUCCESS_MARKER}\ntrailing noise\n");
        assert!(!result.has_success_marker());
    }
}
