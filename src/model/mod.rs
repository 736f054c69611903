//! Data model for toolpaths, operations and instructions.

mod additions;
mod form;
mod instruction;
mod material;
mod operation;
mod tool_path;
mod tool_point;

pub use additions::ToolPathAdditions;
pub use form::{BoxForm, FormIntersection, MaterialForm, PlaneForm};
pub use instruction::MachineInstruction;
pub use material::{EndShape, MaterialTool};
pub use operation::MachineOperation;
pub use tool_path::{PathLabel, ProcessedPath, ToolPath};
pub use tool_point::{normalize_or_z, ToolPoint};
