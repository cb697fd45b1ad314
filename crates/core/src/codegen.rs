//! Blender Python code generation.
//!
//! A [`CodegenRegistry`] maps operation type names to pure generator
//! functions `(params) -> code block`. [`render_script`] assembles a full
//! runnable program: fixed preamble, one block per known operation in
//! submission order, fixed epilogue. Operations with no registered
//! generator are logged and skipped; a single unknown type never aborts
//! the whole script.
//!
//! Rendering is pure and deterministic: the same operation list and
//! registry always produce byte-identical output.

use std::collections::HashMap;

use serde_json::Value;

use crate::operation::Operation;

/// Marker printed as the last stdout line by the epilogue on the happy
/// path. The process executor relies on the exit code alone; this marker
/// exists for callers and diagnostics.
pub const SUCCESS_MARKER: &str = "VFXGEN_JOB_COMPLETE";

/// Fixed script preamble. Guarantees exactly one name to later blocks:
/// `scene`, the active scene handle.
const PREAMBLE: &str = r#"import bpy

# Start from an empty scene so every block sees the same baseline.
bpy.ops.wm.read_factory_settings(use_empty=True)
scene = bpy.context.scene
"#;

/// A pure code generator for one operation type.
///
/// Receives the operation's `params` object and returns a self-contained
/// Python block. Blocks may use the `scene` handle from the preamble but
/// must not depend on variables defined by other blocks.
pub type OpGenerator = fn(&Value) -> String;

/// Registry mapping operation type names to generator functions.
pub struct CodegenRegistry {
    generators: HashMap<String, OpGenerator>,
}

impl CodegenRegistry {
    /// An empty registry with no generators. Useful for tests and for
    /// callers that supply their own catalogue from scratch.
    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
        }
    }

    /// The built-in catalogue of basic scene operations.
    ///
    /// The wider VFX catalogue (particles, shader graphs) is owned by the
    /// callers and arrives through [`CodegenRegistry::register`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("add_text", builtin::add_text);
        registry.register("add_camera", builtin::add_camera);
        registry.register("add_light", builtin::add_light);
        registry.register("assign_material", builtin::assign_material);
        registry.register("set_frame_range", builtin::set_frame_range);
        registry.register("render_still", builtin::render_still);
        registry
    }

    /// Register (or replace) the generator for an operation type.
    pub fn register(&mut self, op_type: impl Into<String>, generator: OpGenerator) {
        self.generators.insert(op_type.into(), generator);
    }

    /// Look up the generator for an operation type.
    pub fn get(&self, op_type: &str) -> Option<OpGenerator> {
        self.generators.get(op_type).copied()
    }

    /// Whether a generator is registered for the given type.
    pub fn contains(&self, op_type: &str) -> bool {
        self.generators.contains_key(op_type)
    }
}

impl Default for CodegenRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// A fully rendered script, not yet written to disk.
#[derive(Debug, Clone)]
pub struct RenderedScript {
    /// Complete Python source (preamble + blocks + epilogue).
    pub source: String,
    /// Number of operations that produced a code block.
    pub operation_count: usize,
    /// Type names of operations skipped for lack of a generator,
    /// in submission order.
    pub skipped: Vec<String>,
}

/// Render an ordered operation list into a complete Blender Python script.
///
/// Unknown operation types are logged with `tracing::warn!` and skipped;
/// known operations keep their relative order. The epilogue prints
/// [`SUCCESS_MARKER`] as the final stdout line; any unhandled exception in
/// a block propagates to a non-zero exit with a traceback on stderr.
pub fn render_script(operations: &[Operation], registry: &CodegenRegistry) -> RenderedScript {
    let mut source = String::from(PREAMBLE);
    let mut operation_count = 0;
    let mut skipped = Vec::new();

    for (index, op) in operations.iter().enumerate() {
        match registry.get(&op.op_type) {
            Some(generator) => {
                source.push_str(&format!("\n# -- {} --\n", op.op_type));
                source.push_str(&generator(&op.params));
                operation_count += 1;
            }
            None => {
                tracing::warn!(
                    op_type = %op.op_type,
                    index,
                    "No generator registered for operation type; skipping",
                );
                skipped.push(op.op_type.clone());
            }
        }
    }

    source.push_str(&format!("\nprint(\"{SUCCESS_MARKER}\")\n"));

    RenderedScript {
        source,
        operation_count,
        skipped,
    }
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

/// Read a numeric parameter, falling back to `default`.
fn num(params: &Value, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// Read an integer parameter, falling back to `default`.
fn int(params: &Value, key: &str, default: i64) -> i64 {
    params.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Read a string parameter and return it as a quoted Python literal.
///
/// JSON string escaping is a subset of Python's, so the serialized form
/// embeds safely.
fn py_str(params: &Value, key: &str, default: &str) -> String {
    let raw = params.get(key).and_then(Value::as_str).unwrap_or(default);
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

/// Read a 3-element numeric array parameter as a Python tuple literal.
fn vec3(params: &Value, key: &str, default: [f64; 3]) -> String {
    let values = params
        .get(key)
        .and_then(Value::as_array)
        .filter(|a| a.len() == 3)
        .map(|a| {
            [
                a[0].as_f64().unwrap_or(default[0]),
                a[1].as_f64().unwrap_or(default[1]),
                a[2].as_f64().unwrap_or(default[2]),
            ]
        })
        .unwrap_or(default);
    format!("({}, {}, {})", values[0], values[1], values[2])
}

// ---------------------------------------------------------------------------
// Built-in generators
// ---------------------------------------------------------------------------

mod builtin {
    use serde_json::Value;

    use super::{int, num, py_str, vec3};

    /// Light types Blender accepts for `light_add`.
    const LIGHT_TYPES: &[&str] = &["POINT", "SUN", "SPOT", "AREA"];

    pub(super) fn add_text(params: &Value) -> String {
        let body = py_str(params, "text", "");
        let size = num(params, "size", 1.0);
        let extrude = num(params, "extrude", 0.0);
        let location = vec3(params, "location", [0.0, 0.0, 0.0]);
        format!(
            "bpy.ops.object.text_add(location={location})\n\
             obj = bpy.context.object\n\
             obj.data.body = {body}\n\
             obj.data.size = {size}\n\
             obj.data.extrude = {extrude}\n"
        )
    }

    pub(super) fn add_camera(params: &Value) -> String {
        let location = vec3(params, "location", [0.0, -6.0, 2.0]);
        let rotation = vec3(params, "rotation", [1.309, 0.0, 0.0]);
        format!(
            "bpy.ops.object.camera_add(location={location}, rotation={rotation})\n\
             scene.camera = bpy.context.object\n"
        )
    }

    pub(super) fn add_light(params: &Value) -> String {
        let requested = params
            .get("light_type")
            .and_then(Value::as_str)
            .map(str::to_uppercase)
            .unwrap_or_default();
        let light_type = if LIGHT_TYPES.contains(&requested.as_str()) {
            requested
        } else {
            "POINT".to_string()
        };
        let energy = num(params, "energy", 1000.0);
        let location = vec3(params, "location", [4.0, -4.0, 6.0]);
        format!(
            "bpy.ops.object.light_add(type='{light_type}', location={location})\n\
             bpy.context.object.data.energy = {energy}\n"
        )
    }

    pub(super) fn assign_material(params: &Value) -> String {
        let name = py_str(params, "name", "vfxgen_material");
        let color = params
            .get("base_color")
            .and_then(Value::as_array)
            .filter(|a| a.len() == 4)
            .map(|a| {
                let c: Vec<f64> = a.iter().map(|v| v.as_f64().unwrap_or(1.0)).collect();
                format!("({}, {}, {}, {})", c[0], c[1], c[2], c[3])
            })
            .unwrap_or_else(|| "(0.8, 0.8, 0.8, 1.0)".to_string());
        format!(
            "mat = bpy.data.materials.new(name={name})\n\
             mat.use_nodes = True\n\
             bsdf = mat.node_tree.nodes[\"Principled BSDF\"]\n\
             bsdf.inputs[\"Base Color\"].default_value = {color}\n\
             obj = bpy.context.object\n\
             if obj is not None and hasattr(obj.data, \"materials\"):\n\
             \x20\x20\x20\x20obj.data.materials.append(mat)\n"
        )
    }

    pub(super) fn set_frame_range(params: &Value) -> String {
        let start = int(params, "start", 1);
        let end = int(params, "end", 250);
        format!(
            "scene.frame_start = {start}\n\
             scene.frame_end = {end}\n"
        )
    }

    pub(super) fn render_still(params: &Value) -> String {
        let filepath = py_str(params, "filepath", "//render.png");
        let width = int(params, "resolution_x", 1920);
        let height = int(params, "resolution_y", 1080);
        format!(
            "scene.render.resolution_x = {width}\n\
             scene.render.resolution_y = {height}\n\
             scene.render.filepath = {filepath}\n\
             bpy.ops.render.render(write_still=True)\n"
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
