//! Readers turning written code back into tool points.

mod gcode;
mod omx;

pub use gcode::{parse_words, read_gcode, strip_comments, GcodeMove};
pub use omx::{read_omx, UNREADABLE_ORIENTATION};
