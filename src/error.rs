//! Error types for toolpath processing and code generation.

use thiserror::Error;

/// Broad classes of failure, used by callers to decide how to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The pipeline was driven in the wrong order or with incomplete data.
    Validation,
    /// The geometry admits no valid answer.
    Geometry,
    /// Input text or job files could not be understood.
    Input,
    /// Reading or writing files failed.
    Io,
}

/// Main error type for toolpath processing.
#[derive(Debug, Error)]
pub enum CamError {
    #[error("Material tool not set for path '{path}': validate the instruction before processing")]
    MaterialToolMissing { path: String },

    #[error("Material form not set for path '{path}': validate the instruction before processing")]
    MaterialFormMissing { path: String },

    #[error("Path '{path}' still has unresolved additions; process additions before writing code")]
    UnresolvedAdditions { path: String },

    #[error("Empty path '{path}': at least one tool point is required")]
    EmptyPath { path: String },

    #[error("No material tool found in any path and the machine has {configured} configured tools")]
    NoMaterialTool { configured: usize },

    #[error("No material form found in any path")]
    NoMaterialForm,

    #[error("No gouge-free rotation from ({x1:.3}, {y1:.3}, {z1:.3}) to ({x2:.3}, {y2:.3}, {z2:.3}) in either direction")]
    NoSafeRoute {
        x1: f64,
        y1: f64,
        z1: f64,
        x2: f64,
        y2: f64,
        z2: f64,
    },

    #[error("Projection failed: {message}")]
    ProjectionFailed { message: String },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Invalid job description: {message}")]
    InvalidJob { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CamError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CamError::MaterialToolMissing { .. } => ErrorCategory::Validation,
            CamError::MaterialFormMissing { .. } => ErrorCategory::Validation,
            CamError::UnresolvedAdditions { .. } => ErrorCategory::Validation,
            CamError::EmptyPath { .. } => ErrorCategory::Validation,
            CamError::NoMaterialTool { .. } => ErrorCategory::Validation,
            CamError::NoMaterialForm => ErrorCategory::Validation,
            CamError::NoSafeRoute { .. } => ErrorCategory::Geometry,
            CamError::ProjectionFailed { .. } => ErrorCategory::Geometry,
            CamError::ParseError { .. } => ErrorCategory::Input,
            CamError::InvalidJob { .. } => ErrorCategory::Input,
            CamError::Io(_) => ErrorCategory::Io,
            CamError::Json(_) => ErrorCategory::Input,
        }
    }

    /// Build a [`CamError::NoSafeRoute`] from the two route endpoints.
    pub fn no_safe_route(from: &nalgebra::Point3<f64>, to: &nalgebra::Point3<f64>) -> Self {
        CamError::NoSafeRoute {
            x1: from.x,
            y1: from.y,
            z1: from.z,
            x2: to.x,
            y2: to.y,
            z2: to.z,
        }
    }
}

/// Result type alias for toolpath operations.
pub type Result<T> = std::result::Result<T, CamError>;
