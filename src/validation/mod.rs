//! Pre-processing checks on instructions and paths.

mod validate;

pub use validate::{validate_instruction, validate_path, ValidationResult};
