//! Geometric transformations applied to toolpaths during processing.

pub mod height;
pub mod lead;
pub mod offset;
pub mod step_down;
pub mod surface;

pub use offset::{offset_closed, offset_open, offset_path};
pub use surface::{project_onto_mesh, project_path, Mesh, MeshHit};
