//! toolpath-nc - Toolpath processing and NC code generation.
//!
//! This library turns ordered tool points into machine code for two-axis
//! cutters, three-axis mills, a five-axis A/B table mill (Pocket NC) and a
//! five-axis waterjet (OMAX). Paths are expanded with step-down passes,
//! offsets, finishing skins and insert/retract moves, linked by collision
//! avoiding transitions and written with per-line diagnostics.
//!
//! # Example
//!
//! ```no_run
//! use toolpath_nc::{Job, SaveOutcome};
//! use std::path::Path;
//!
//! let job = Job::from_file(Path::new("job.json")).unwrap();
//! let mut instruction = job.into_instruction().unwrap();
//! instruction.process_additions().unwrap();
//! let code = instruction.write_code().unwrap();
//! match code.save(Path::new("job.ngc"), &[]).unwrap() {
//!     SaveOutcome::Saved => println!("saved"),
//!     SaveOutcome::Blocked(errors) => eprintln!("blocked by {:?}", errors),
//! }
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod job;
pub mod kinematics;
pub mod machine;
pub mod model;
pub mod parser;
pub mod transform;
pub mod validation;

// Re-exports for convenience
pub use config::{CodeStyle, MachineSettings};
pub use error::{CamError, ErrorCategory, Result};
pub use generator::{CodeInfo, SaveOutcome};
pub use job::Job;
pub use machine::{Machine, PocketNcVersion};
pub use model::{
    BoxForm, MachineInstruction, MachineOperation, MaterialForm, MaterialTool, PathLabel, PlaneForm,
    ToolPath, ToolPathAdditions, ToolPoint,
};
pub use validation::{validate_instruction, ValidationResult};

/// Generate code for a job file.
///
/// This is the main high-level function that runs the full pipeline:
/// 1. Load the job description
/// 2. Validate the instruction
/// 3. Process additions (step-down, offsets, inserts, transitions)
/// 4. Write the code
///
/// Validation warnings are logged; validation errors stop the pipeline.
/// Errors found while writing are returned inside the [`CodeInfo`].
pub fn generate_code(job_path: &std::path::Path) -> Result<CodeInfo> {
    let job = Job::from_file(job_path)?;
    let mut instruction = job.into_instruction()?;

    let validation = validate_instruction(&instruction)?;
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if !validation.passed {
        return Err(CamError::InvalidJob {
            message: validation.errors.join("; "),
        });
    }

    instruction.process_additions()?;
    instruction.write_code()
}
