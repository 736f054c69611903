//! A single machine position with tool orientation and per-point settings.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One position of the tool tip along a path.
///
/// Feed and speed use negative values for "unset": the writer then falls back
/// to the values of the path's material tool. A feed of exactly zero is a
/// rapid move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPoint {
    /// Tool tip position.
    pub pt: Point3<f64>,
    /// Unit tool direction, pointing from the tip towards the spindle.
    pub dir: Vector3<f64>,
    /// Spindle speed (or cut quality on a waterjet), negative when unset.
    pub speed: f64,
    /// Feed rate, negative when unset, zero for rapid.
    pub feed: f64,
    /// Optional name, written as a comment.
    #[serde(default)]
    pub name: String,
    /// Literal code written before the move.
    #[serde(default)]
    pub pre_code: String,
    /// Literal code written after the move.
    #[serde(default)]
    pub post_code: String,
    /// Errors raised while processing this point.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Warnings raised while processing this point.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Default for ToolPoint {
    fn default() -> Self {
        Self {
            pt: Point3::origin(),
            dir: Vector3::z(),
            speed: -1.0,
            feed: -1.0,
            name: String::new(),
            pre_code: String::new(),
            post_code: String::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ToolPoint {
    /// Create a point with a vertical tool.
    pub fn new(pt: Point3<f64>) -> Self {
        Self {
            pt,
            ..Default::default()
        }
    }

    /// Create a point with the given tool direction (normalized).
    pub fn with_dir(pt: Point3<f64>, dir: Vector3<f64>) -> Self {
        Self {
            pt,
            dir: normalize_or_z(dir),
            ..Default::default()
        }
    }

    /// Create a point from raw coordinates.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Set the feed, returning the point.
    pub fn feed(mut self, feed: f64) -> Self {
        self.feed = feed;
        self
    }

    /// Set the speed, returning the point.
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Whether the move into this point is a rapid.
    pub fn is_rapid(&self) -> bool {
        self.feed == 0.0
    }

    /// Copy of this point moved to a new position, keeping orientation and settings.
    ///
    /// Diagnostics are not carried over: they belong to the original position.
    pub fn moved_to(&self, pt: Point3<f64>) -> Self {
        Self {
            pt,
            errors: Vec::new(),
            warnings: Vec::new(),
            ..self.clone()
        }
    }

    /// Copy of this point shifted by `v`.
    pub fn translated(&self, v: &Vector3<f64>) -> Self {
        self.moved_to(self.pt + v)
    }

    /// Record an error against this point.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record a warning against this point.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Distance between the tips of two points.
    pub fn distance(&self, other: &ToolPoint) -> f64 {
        (other.pt - self.pt).norm()
    }
}

/// Normalize a direction, falling back to +Z for degenerate input.
pub fn normalize_or_z(v: Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::z)
}
