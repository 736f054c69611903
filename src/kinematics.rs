//! Kinematics of a five-axis machine with an A/B rotary table.
//!
//! The table tilts about X (A) and turns about Z (B). In machine space the
//! tool always points along +Z; a part-space tool direction `d` is brought
//! there by `Rx(A - π/2) · Rz(B)`. Every physical orientation except the
//! vertical one has two solutions: `(A, B)` and `(π - A, B + π)`. At the
//! vertical (the cusp) B is free.

use nalgebra::{Point3, Rotation3, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::config::{angle, CUSP_TOLERANCE};
use crate::model::ToolPoint;

/// Machine-space position of the table axes and the tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbPosition {
    /// Linear axes.
    pub m: Point3<f64>,
    /// Tilt, radians.
    pub a: f64,
    /// Rotation, radians.
    pub b: f64,
}

/// Rotation taking part space into machine space.
pub fn table_rotation(a: f64, b: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), a - FRAC_PI_2)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), b)
}

/// Whether a tool direction sits on the cusp.
pub fn is_cusp(dir: &Vector3<f64>) -> bool {
    dir.z.abs() > 1.0 - CUSP_TOLERANCE
}

/// Principal rotary angles of a tool direction; B is `None` on the cusp.
pub fn ik_angles(dir: &Vector3<f64>) -> (f64, Option<f64>) {
    let a = dir.z.clamp(-1.0, 1.0).asin();
    if is_cusp(dir) {
        return (a.signum() * FRAC_PI_2, None);
    }
    (a, Some((-dir.x).atan2(-dir.y)))
}

/// The other table stance reaching the same orientation.
pub fn double_stance(a: f64, b: f64) -> (f64, f64) {
    (PI - a, b + PI)
}

/// Machine linear axes for a part point at the given table angles.
pub fn machine_point(
    pt: &Point3<f64>,
    a: f64,
    b: f64,
    pivot: &Vector3<f64>,
    tool_length: f64,
) -> Point3<f64> {
    table_rotation(a, b) * pt + pivot + Vector3::z() * tool_length
}

/// Inverse kinematics of a single point in the principal stance.
///
/// On the cusp B is taken from `b_hint`; otherwise B is unwrapped to lie
/// within half a turn of it.
pub fn ik_five_axis_ab_table(
    tp: &ToolPoint,
    pivot: &Vector3<f64>,
    tool_length: f64,
    b_hint: f64,
) -> AbPosition {
    let (a, b) = ik_angles(&tp.dir);
    let b = b.map_or(b_hint, |b| angle::unwrap_near(b, b_hint));
    AbPosition {
        m: machine_point(&tp.pt, a, b, pivot, tool_length),
        a,
        b,
    }
}

/// Forward kinematics: part-space tip position and tool direction.
pub fn fk_five_axis_ab_table(
    pos: &AbPosition,
    pivot: &Vector3<f64>,
    tool_length: f64,
) -> (Point3<f64>, Vector3<f64>) {
    let inv = table_rotation(pos.a, pos.b).inverse();
    let q = inv * (pos.m - pivot - Vector3::z() * tool_length);
    (q, inv * Vector3::z())
}

/// Inverse kinematics along a path.
///
/// `stance` may swap a solution for its double stance. B is unwrapped from
/// point to point starting near `start_b`. Runs of cusp points get B
/// interpolated by arc length between the defined neighbours, or copied
/// from the one neighbour that exists.
pub fn ik_path<F>(
    points: &[ToolPoint],
    pivot: &Vector3<f64>,
    tool_length: f64,
    start_b: f64,
    stance: F,
) -> Vec<AbPosition>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let mut angles: Vec<(f64, Option<f64>)> = points
        .iter()
        .map(|p| match ik_angles(&p.dir) {
            (a, Some(b)) => {
                let (a, b) = stance(a, b);
                (a, Some(b))
            }
            cusp => cusp,
        })
        .collect();

    let mut near = start_b;
    for (_, b) in angles.iter_mut() {
        if let Some(b) = b {
            *b = angle::unwrap_near(*b, near);
            near = *b;
        }
    }

    let mut i = 0;
    while i < angles.len() {
        if angles[i].1.is_some() {
            i += 1;
            continue;
        }
        let start = i;
        while i < angles.len() && angles[i].1.is_none() {
            i += 1;
        }
        let left = start.checked_sub(1).and_then(|k| angles[k].1);
        let right = angles.get(i).and_then(|x| x.1);

        match (left, right) {
            (Some(l), Some(r)) => {
                let from = start - 1;
                let mut lengths = vec![0.0; i - from + 1];
                for k in from + 1..=i {
                    lengths[k - from] = lengths[k - from - 1] + points[k - 1].distance(&points[k]);
                }
                let total = lengths[i - from];
                for k in start..i {
                    let t = if total > 0.0 {
                        lengths[k - from] / total
                    } else {
                        (k - from) as f64 / (i - from) as f64
                    };
                    angles[k].1 = Some(l + (r - l) * t);
                }
            }
            (Some(b), None) | (None, Some(b)) => {
                for entry in &mut angles[start..i] {
                    entry.1 = Some(b);
                }
            }
            (None, None) => {
                for entry in &mut angles[start..i] {
                    entry.1 = Some(start_b);
                }
            }
        }
    }

    points
        .iter()
        .zip(angles)
        .map(|(p, (a, b))| {
            let b = b.unwrap_or(start_b);
            AbPosition {
                m: machine_point(&p.pt, a, b, pivot, tool_length),
                a,
                b,
            }
        })
        .collect()
}
