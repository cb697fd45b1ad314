//! Pure domain logic for the Blender job-execution core.
//!
//! Holds the operation model and the Python code-generation registry.
//! Nothing in this crate touches the filesystem or spawns processes;
//! that lives in `vfxgen-blender` for isolation and testability.

pub mod codegen;
pub mod operation;
pub mod status;
