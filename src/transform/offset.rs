//! Planar offsetting of toolpaths.
//!
//! Offsets go to the left of the direction of travel, viewed from the plane
//! normal. Closed paths are offset with the clipper library on integer-scaled
//! coordinates; open paths use a local per-vertex miter and are not corrected
//! for self-intersection.

use geo::{Area, Coord, LineString, Polygon};
use geo_clipper::{Clipper, EndType, JoinType};
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::config::{float_cmp, CLIPPER_SCALE, EPS};
use crate::model::{normalize_or_z, ToolPath, ToolPoint};

/// Miter length cap, in multiples of the offset distance.
const MITER_LIMIT: f64 = 4.0;

/// Offset a path by its requested offset vector.
///
/// A closed path may split into several loops or vanish entirely.
pub fn offset_path(tp: &ToolPath) -> Vec<ToolPath> {
    let vector = tp.additions.offset;
    let distance = vector.norm();
    if distance < EPS || tp.points.len() < 2 {
        return vec![tp.clone()];
    }
    let normal = vector / distance;
    let tolerance = tp
        .material_tool
        .as_ref()
        .map_or(0.01, |mt| mt.tolerance.max(EPS));

    if tp.is_closed() {
        let loops = offset_closed(&tp.points, &normal, distance, tolerance);
        debug!("Offset '{}' by {:.3}: {} loops", tp.name, distance, loops.len());
        loops
            .into_iter()
            .map(|points| tp.derived(points, tp.label))
            .collect()
    } else {
        vec![tp.derived(offset_open(&tp.points, &normal, distance), tp.label)]
    }
}

/// Orthonormal in-plane axes `(u, v)` with `u × v = normal`.
fn plane_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = (helper - normal * normal.dot(&helper)).normalize();
    (u, normal.cross(&u))
}

fn nearest_index(points: &[Point3<f64>], target: &Point3<f64>) -> usize {
    points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).norm().total_cmp(&(*b - target).norm()))
        .map_or(0, |(i, _)| i)
}

/// Offset a closed loop of points.
///
/// The loop keeps its orientation, starts at the vertex nearest the original
/// start and ends with a copy of its first point.
pub fn offset_closed(
    points: &[ToolPoint],
    normal: &Vector3<f64>,
    distance: f64,
    tolerance: f64,
) -> Vec<Vec<ToolPoint>> {
    let n = normalize_or_z(*normal);
    let (u, v) = plane_basis(&n);

    let ring = match (points.first(), points.last()) {
        (Some(a), Some(b)) if points.len() > 1 && float_cmp::approx_zero(a.distance(b)) => &points[..points.len() - 1],
        _ => points,
    };
    if ring.len() < 3 {
        return Vec::new();
    }

    let origin = ring[0].pt;
    let height = ring.iter().map(|p| n.dot(&(p.pt - origin))).sum::<f64>() / ring.len() as f64;
    let coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|p| {
            let d = p.pt - origin;
            Coord {
                x: d.dot(&u),
                y: d.dot(&v),
            }
        })
        .collect();

    let polygon = Polygon::new(LineString::from(coords.clone()), vec![]);
    let ccw = polygon.signed_area() > 0.0;
    let polygon = if ccw {
        polygon
    } else {
        let mut reversed = coords;
        reversed.reverse();
        Polygon::new(LineString::from(reversed), vec![])
    };
    // Left of travel is inside a counter-clockwise loop.
    let delta = if ccw { -distance } else { distance };

    let result = polygon.offset(
        delta,
        JoinType::Round(tolerance),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    );

    let original: Vec<Point3<f64>> = ring.iter().map(|p| p.pt).collect();
    let mut loops = Vec::new();
    for poly in result.0 {
        let mut exterior: Vec<Coord<f64>> = poly.exterior().0.clone();
        if exterior.len() > 1 && exterior.first() == exterior.last() {
            exterior.pop();
        }
        if exterior.len() < 3 {
            continue;
        }
        let area = Polygon::new(LineString::from(exterior.clone()), vec![]).signed_area();
        if area < 0.0 {
            exterior.reverse();
        }

        let mut loop_pts: Vec<Point3<f64>> = exterior
            .iter()
            .map(|c| origin + u * c.x + v * c.y + n * height)
            .collect();

        let seam = nearest_index(&loop_pts, &origin);
        loop_pts.rotate_left(seam);
        if !ccw {
            loop_pts[1..].reverse();
        }

        let mut out: Vec<ToolPoint> = loop_pts
            .iter()
            .map(|p| ring[nearest_index(&original, p)].moved_to(*p))
            .collect();
        if let Some(first) = out.first().cloned() {
            out.push(first);
        }
        loops.push(out);
    }
    loops
}

/// Offset an open polyline.
pub fn offset_open(points: &[ToolPoint], normal: &Vector3<f64>, distance: f64) -> Vec<ToolPoint> {
    let n = normalize_or_z(*normal);
    let lefts: Vec<Option<Vector3<f64>>> = points
        .windows(2)
        .map(|w| n.cross(&(w[1].pt - w[0].pt)).try_normalize(f64::EPSILON))
        .collect();

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let before = if i > 0 { lefts.get(i - 1).copied().flatten() } else { None };
            let after = lefts.get(i).copied().flatten();
            let shift = match (before, after) {
                (Some(a), Some(b)) => match (a + b).try_normalize(f64::EPSILON) {
                    Some(m) => {
                        let scale = (distance / m.dot(&a).max(EPS)).min(distance * MITER_LIMIT);
                        m * scale
                    }
                    None => a * distance,
                },
                (Some(a), None) | (None, Some(a)) => a * distance,
                (None, None) => Vector3::zeros(),
            };
            p.translated(&shift)
        })
        .collect()
}
