//! Code generation: the shared accumulator and per-format writers.

mod code_info;
pub mod gcode;
pub mod omx;

pub use code_info::{CodeInfo, MachineState, SaveOutcome};
pub use gcode::{format_angle, format_coord, AxisWords, GcodeWriter};
