//! OMAX `.omx` waterjet files.
//!
//! Each move is one line of comma separated fields:
//! `[0],X, Y, Z, tiltStart, tiltEnd, bow, quality, offset, R, R, R, R, R, 27, dirs,[END]`
//! where `dirs` holds the start and end jet directions, negated, joined by `|`.

use nalgebra::{Point3, Vector3};

use super::CodeInfo;
use crate::model::ToolPoint;

/// First lines of every file; controllers refuse files without them.
pub const OMX_HEADER: &str = "This is an OMAX (.OMX) file.  Do not modify the first 2 lines of this file.\n2";

/// Jet direction for a tool direction (nozzle towards the part).
pub fn jet_direction(dir: &Vector3<f64>) -> Vector3<f64> {
    Vector3::zeros() - dir
}

/// Format one move line.
pub fn omx_line(pt: &Point3<f64>, start_jet: &Vector3<f64>, end_jet: &Vector3<f64>, quality: f64) -> String {
    format!(
        "[0],{:.4}, {:.4}, {:.4}, 0, 0, 0.0000, {:.0}, 0, R, R, R, R, R, 27, {:.4}|{:.4}|{:.4}|{:.4}|{:.4}|{:.4},[END]",
        pt.x,
        pt.y,
        pt.z,
        quality,
        -start_jet.x,
        -start_jet.y,
        -start_jet.z,
        -end_jet.x,
        -end_jet.y,
        -end_jet.z,
    )
}

/// Write one point; the jet tilts from this point's direction to `next`'s.
pub fn write_point(co: &mut CodeInfo, tp: &ToolPoint, next: Option<&ToolPoint>, quality: f64) {
    if !tp.name.is_empty() {
        co.append_comment(&tp.name);
    }
    if !tp.pre_code.is_empty() {
        co.append_line(&tp.pre_code);
    }

    let end_dir = next.map_or(tp.dir, |n| n.dir);
    co.append_line(&omx_line(
        &tp.pt,
        &jet_direction(&tp.dir),
        &jet_direction(&end_dir),
        quality,
    ));

    co.state.x = tp.pt.x;
    co.state.y = tp.pt.y;
    co.state.z = tp.pt.z;
    co.state.speed = quality;
    co.state.dir = tp.dir;
    co.grow_range("X", tp.pt.x);
    co.grow_range("Y", tp.pt.y);
    co.grow_range("Z", tp.pt.z);

    if !tp.post_code.is_empty() {
        co.append_line(&tp.post_code);
    }
    co.add_point_diagnostics(tp);
}
