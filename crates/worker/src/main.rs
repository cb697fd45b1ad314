//! Job worker binary.
//!
//! Runs one operation list through the Blender execution core and
//! reports the outcome. Usage: `vfxgen-worker <job.json>` where the file
//! holds an ordered operation list in the wire format
//! `[{"type": "...", "params": {...}}, ...]`.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vfxgen_blender::config::BlenderConfig;
use vfxgen_blender::error::ExecutorError;
use vfxgen_blender::runner::AsyncBlenderRunner;
use vfxgen_core::operation::Operation;
use vfxgen_core::status;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vfxgen_worker=info,vfxgen_blender=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(job_path) = std::env::args().nth(1) else {
        eprintln!("usage: vfxgen-worker <job.json>");
        return ExitCode::FAILURE;
    };

    let raw = match std::fs::read_to_string(&job_path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(path = %job_path, error = %e, "Cannot read job file");
            return ExitCode::FAILURE;
        }
    };

    let operations: Vec<Operation> = match serde_json::from_str(&raw) {
        Ok(ops) => ops,
        Err(e) => {
            tracing::error!(path = %job_path, error = %e, "Job file is not a valid operation list");
            return ExitCode::FAILURE;
        }
    };

    let config = BlenderConfig::from_env();
    tracing::info!(
        temp_root = %config.temp_root.display(),
        timeout_secs = config.default_timeout.as_secs(),
        "Loaded executor configuration",
    );

    let runner = match AsyncBlenderRunner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create executor");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        operations = operations.len(),
        status = status::JOB_RUNNING,
        "Job started",
    );

    match runner.run_operations(&operations).await {
        Ok(result) => {
            tracing::info!(
                status = status::JOB_COMPLETED,
                return_code = result.return_code,
                marker = result.has_success_marker(),
                "Job finished",
            );
            ExitCode::SUCCESS
        }
        Err(e @ ExecutorError::Timeout { .. }) => {
            tracing::error!(status = status::JOB_TIMEOUT, error = %e, "Job timed out");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(status = status::JOB_FAILED, error = %e, "Job failed");
            ExitCode::FAILURE
        }
    }
}
