//! Height offsetting for 3-axis paths.
//!
//! A path given as surface contact points is lifted so the tool's cutting
//! surface, rather than its tip, follows it. Each segment is moved off its
//! surface by the tool's cut offset; neighbouring offset lines are
//! intersected and points whose order would reverse (gouging back into cut
//! material) are removed.

use nalgebra::{Point3, Vector3};

use crate::model::{MaterialTool, ToolPath, ToolPoint};

/// Upward normal of a segment inside its vertical plane.
fn segment_normal(from: &Point3<f64>, to: &Point3<f64>) -> Vector3<f64> {
    let up = Vector3::z();
    match (to - from).try_normalize(f64::EPSILON) {
        Some(s) => (up - s * s.dot(&up))
            .try_normalize(1e-9)
            .unwrap_or(up),
        None => up,
    }
}

/// Midpoint of closest approach of two lines, `None` when parallel.
fn line_intersection(
    a0: &Point3<f64>,
    a1: &Point3<f64>,
    b0: &Point3<f64>,
    b1: &Point3<f64>,
) -> Option<Point3<f64>> {
    let d1 = a1 - a0;
    let d2 = b1 - b0;
    let r = a0 - b0;
    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let b = d1.dot(&d2);
    let c = d1.dot(&r);
    let f = d2.dot(&r);
    let denom = a * e - b * b;
    if denom.abs() < 1e-12 * a.max(1.0) * e.max(1.0) {
        return None;
    }
    let s = (b * f - c * e) / denom;
    let t = (a * f - b * c) / denom;
    let pa = a0 + d1 * s;
    let pb = b0 + d2 * t;
    Some(Point3::from((pa.coords + pb.coords) / 2.0))
}

/// Lift a path of contact points to tool tip positions.
pub fn height_offset(tp: &ToolPath, mt: &MaterialTool) -> ToolPath {
    let points = &tp.points;
    if points.len() < 2 {
        let lifted = points
            .iter()
            .map(|p| p.translated(&-mt.cut_offset(&Vector3::z(), &Vector3::z())))
            .collect();
        return tp.derived(lifted, tp.label);
    }

    // Offset line for every segment.
    let lines: Vec<(Point3<f64>, Point3<f64>)> = points
        .windows(2)
        .map(|w| {
            let normal = segment_normal(&w[0].pt, &w[1].pt);
            let shift = -mt.cut_offset(&Vector3::z(), &normal);
            (w[0].pt + shift, w[1].pt + shift)
        })
        .collect();

    let mut moved: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    moved.push(lines[0].0);
    for pair in lines.windows(2) {
        let (a0, a1) = pair[0];
        let (b0, b1) = pair[1];
        moved.push(line_intersection(&a0, &a1, &b0, &b1).unwrap_or(b0));
    }
    moved.push(lines[lines.len() - 1].1);

    // Drop points whose offset runs against the original direction.
    let mut stack: Vec<(Point3<f64>, usize)> = Vec::with_capacity(points.len());
    for (i, q) in moved.iter().enumerate() {
        while let Some((top, j)) = stack.last() {
            let forward = (q - top).dot(&(points[i].pt - points[*j].pt));
            if forward < 0.0 {
                stack.pop();
            } else {
                break;
            }
        }
        stack.push((*q, i));
    }

    let lifted: Vec<ToolPoint> = stack
        .into_iter()
        .map(|(q, i)| points[i].moved_to(q))
        .collect();
    tp.derived(lifted, tp.label)
}
