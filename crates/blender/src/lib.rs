//! Blender external-tool integration.
//!
//! Configuration and executable discovery, per-job workspace directories,
//! the blocking process executor with timeout escalation, and the async
//! adapter that offloads executions onto the blocking worker pool.

pub mod config;
pub mod error;
pub mod executor;
pub mod runner;
pub mod script;
pub mod workspace;

pub use config::BlenderConfig;
pub use error::ExecutorError;
pub use executor::{BlenderExecutor, ExecutionResult};
pub use runner::AsyncBlenderRunner;
pub use script::GeneratedScript;
pub use workspace::JobWorkspace;
