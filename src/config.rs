//! Configuration constants and settings shared by machines and writers.

use serde::{Deserialize, Serialize};

use crate::model::{MaterialTool, ToolPathAdditions};

/// Floating-point comparison epsilon.
pub const EPS: f64 = 0.0001;

/// Tolerance on |dz| - 1 below which a tool direction counts as vertical.
pub const CUSP_TOLERANCE: f64 = 1e-7;

/// Feed and speed changes smaller than this are not re-emitted.
pub const FEED_SPEED_TOLERANCE: f64 = 0.01;

/// Upper bound on waypoint insertions while routing a transition.
pub const MAX_ROUTE_STEPS: usize = 100;

/// Largest orientation change (radians) per interpolated transition step.
pub const TRANSITION_ANGLE_STEP: f64 = std::f64::consts::PI / 60.0;

/// Integer scale used when handing polygons to the clipper library.
pub const CLIPPER_SCALE: f64 = 100_000.0;

/// Number of samples taken along a lead arc before refining.
pub const LEAD_ARC_DIVISIONS: usize = 40;

/// Points written along a lead arc.
pub const LEAD_ARC_POINTS: usize = 12;

/// Default drop-middle threshold, in multiples of the tool width.
pub const AUTO_DROP_MIDDLE_FACTOR: f64 = 8.0;

/// Line terminator for emitted code.
pub const LINE_END: &str = "\r\n";

/// How a machine formats comments and line numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeStyle {
    /// Token opening a comment.
    pub comment_start: String,
    /// Token closing a comment.
    pub comment_end: String,
    /// Prefix of numbered lines, empty to disable numbering.
    pub line_prefix: String,
    /// Zero-padded width of the line number.
    pub line_width: usize,
    /// Increment between line numbers.
    pub line_step: u32,
    /// Extension of written files.
    pub extension: String,
}

impl Default for CodeStyle {
    fn default() -> Self {
        Self {
            comment_start: "(".to_string(),
            comment_end: ")".to_string(),
            line_prefix: "N".to_string(),
            line_width: 5,
            line_step: 10,
            extension: "ngc".to_string(),
        }
    }
}

impl CodeStyle {
    /// Style used by OMAX `.omx` files: bracketed comments, no numbering.
    pub fn omax() -> Self {
        Self {
            comment_start: "[COMMENT]".to_string(),
            comment_end: "[END]".to_string(),
            line_prefix: String::new(),
            line_width: 0,
            line_step: 0,
            extension: "omx".to_string(),
        }
    }

    /// Whether lines get a number prefix.
    pub fn numbered(&self) -> bool {
        !self.line_prefix.is_empty()
    }

    /// Format the number prefix for the given line, including the trailing space.
    pub fn line_number(&self, line: u32) -> String {
        if !self.numbered() {
            return String::new();
        }
        format!(
            "{}{:0width$} ",
            self.line_prefix,
            line,
            width = self.line_width
        )
    }
}

/// Settings common to every machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSettings {
    /// Machine name, written into file headers.
    pub name: String,
    /// Tools configured on the machine.
    #[serde(default)]
    pub tools: Vec<MaterialTool>,
    /// Comment and numbering style.
    #[serde(default)]
    pub style: CodeStyle,
    /// Literal code written after the generated file header.
    #[serde(default)]
    pub header: String,
    /// Literal code written before the generated file footer.
    #[serde(default)]
    pub footer: String,
    /// Additions that replace any `replaceable` additions during validation.
    #[serde(default)]
    pub default_additions: ToolPathAdditions,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            name: "Machine".to_string(),
            tools: Vec::new(),
            style: CodeStyle::default(),
            header: String::new(),
            footer: String::new(),
            default_additions: ToolPathAdditions::basic(),
        }
    }
}

impl MachineSettings {
    /// Create settings with a name and default style.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The single configured tool, if exactly one is configured.
    pub fn sole_tool(&self) -> Option<&MaterialTool> {
        match self.tools.as_slice() {
            [tool] => Some(tool),
            _ => None,
        }
    }
}

/// Utility functions for floating-point comparisons.
pub mod float_cmp {
    use super::EPS;

    /// Check if a float is approximately zero.
    #[inline]
    pub fn approx_zero(a: f64) -> bool {
        a.abs() < EPS
    }

    /// Check if a is in range [min, max] with epsilon tolerance.
    #[inline]
    pub fn in_range(a: f64, min: f64, max: f64) -> bool {
        a >= min - EPS && a <= max + EPS
    }
}

/// Utility functions for angle operations.
pub mod angle {
    use std::f64::consts::{PI, TAU};

    /// Shift `angle` by whole turns so it lies within half a turn of `near`.
    #[inline]
    pub fn unwrap_near(angle: f64, near: f64) -> f64 {
        angle + TAU * ((near - angle) / TAU).round()
    }

    /// Normalize an angle in radians to (-PI, PI].
    #[inline]
    pub fn normalize(angle: f64) -> f64 {
        let mut a = angle % TAU;
        if a <= -PI {
            a += TAU;
        } else if a > PI {
            a -= TAU;
        }
        a
    }
}
