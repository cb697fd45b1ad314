//! Writing rendered scripts into a job workspace.
//!
//! Rendering itself is pure and lives in `vfxgen_core::codegen`; this
//! module is the single filesystem step between rendering and execution.

use std::fs;
use std::path::PathBuf;

use vfxgen_core::codegen::RenderedScript;

use crate::error::ExecutorError;
use crate::workspace::JobWorkspace;

/// A rendered script written to disk inside a workspace.
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    /// Absolute path of the script file.
    pub path: PathBuf,
    /// Number of operations that produced a code block.
    pub operation_count: usize,
    /// Operation types skipped during rendering, in submission order.
    pub skipped: Vec<String>,
}

/// Write `rendered` into `workspace` as `blender_script_<timestamp>.py`.
///
/// The microsecond timestamp keeps sequential scripts from one executor
/// instance distinct on disk.
pub fn write_script(
    workspace: &JobWorkspace,
    rendered: &RenderedScript,
) -> Result<GeneratedScript, ExecutorError> {
    let filename = format!(
        "blender_script_{}.py",
        chrono::Utc::now().timestamp_micros()
    );
    let path = workspace.path().join(filename);
    fs::write(&path, &rendered.source)?;

    tracing::debug!(
        script = %path.display(),
        operations = rendered.operation_count,
        skipped = rendered.skipped.len(),
        "Wrote generated script",
    );

    Ok(GeneratedScript {
        path,
        operation_count: rendered.operation_count,
        skipped: rendered.skipped.clone(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vfxgen_core::codegen::{render_script, CodegenRegistry};
    use vfxgen_core::operation::Operation;

    use super::*;

    #[test]
    fn writes_rendered_source_into_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = JobWorkspace::create(temp.path()).expect("workspace");

        let ops = vec![Operation::new("add_text", json!({"text": "hi"}))];
        let rendered = render_script(&ops, &CodegenRegistry::with_builtins());
        let script = write_script(&workspace, &rendered).expect("write");

        assert!(script.path.starts_with(workspace.path()));
        let name = script
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("name");
        assert!(name.starts_with("blender_script_") && name.ends_with(".py"));

        let on_disk = fs::read_to_string(&script.path).expect("read back");
        assert_eq!(on_disk, rendered.source);
        assert_eq!(script.operation_count, 1);
        assert!(script.skipped.is_empty());
    }
}
