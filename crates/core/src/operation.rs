//! Abstract scene operation descriptors.
//!
//! Operations arrive from the API layer as an ordered JSON list:
//! `[{"type": "add_text", "params": {...}}, ...]`. The `type` selects a
//! code generator; `params` is an opaque JSON object interpreted by that
//! generator. Unknown types are valid input and are skipped during
//! generation, never rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single abstract instruction to be translated into Blender Python.
///
/// Immutable once submitted; generators receive `params` by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Operation type name, e.g. `"add_text"`. Selects the generator.
    #[serde(rename = "type")]
    pub op_type: String,

    /// Generator-specific parameters. Missing fields fall back to the
    /// generator's defaults.
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl Operation {
    /// Convenience constructor used by callers and tests.
    pub fn new(op_type: impl Into<String>, params: Value) -> Self {
        Self {
            op_type: op_type.into(),
            params,
        }
    }
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
