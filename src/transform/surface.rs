//! Projection of points onto triangle meshes.
//!
//! Each point casts one independent ray, so the queries run in parallel.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CamError, Result};
use crate::model::{ToolPath, ToolPoint};

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

/// Where a ray met the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshHit {
    pub point: Point3<f64>,
    /// Unit triangle normal, facing back along the ray.
    pub normal: Vector3<f64>,
    /// Distance along the ray.
    pub distance: f64,
}

impl Mesh {
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self { vertices, triangles }
    }

    /// Nearest hit of a ray, ignoring triangles with bad indices.
    pub fn raycast(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<MeshHit> {
        let mut best: Option<MeshHit> = None;
        for tri in &self.triangles {
            let (a, b, c) = match (
                self.vertices.get(tri[0]),
                self.vertices.get(tri[1]),
                self.vertices.get(tri[2]),
            ) {
                (Some(a), Some(b), Some(c)) => (a, b, c),
                _ => continue,
            };
            if let Some(t) = ray_triangle(origin, dir, a, b, c) {
                if best.map_or(true, |h| t < h.distance) {
                    let mut normal = (b - a).cross(&(c - a)).normalize();
                    if normal.dot(dir) > 0.0 {
                        normal = -normal;
                    }
                    best = Some(MeshHit {
                        point: origin + dir * t,
                        normal,
                        distance: t,
                    });
                }
            }
        }
        best
    }
}

/// Möller–Trumbore ray/triangle intersection, returning the ray parameter.
fn ray_triangle(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<f64> {
    const EPSILON: f64 = 1e-12;
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = s.dot(&p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = dir.dot(&q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&q) * inv;
    (t >= 0.0).then_some(t)
}

/// Cast one ray per point along `direction` and return the nearest hits.
pub fn project_onto_mesh(
    points: &[Point3<f64>],
    mesh: &Mesh,
    direction: &Vector3<f64>,
) -> Vec<Option<MeshHit>> {
    let dir = direction.try_normalize(f64::EPSILON).unwrap_or(-Vector3::z());
    points.par_iter().map(|p| mesh.raycast(p, &dir)).collect()
}

/// Project a path onto a mesh, pointing the tool along the surface normal.
///
/// Points that miss the mesh are dropped.
pub fn project_path(tp: &ToolPath, mesh: &Mesh, direction: &Vector3<f64>) -> Result<ToolPath> {
    let origins: Vec<Point3<f64>> = tp.points.iter().map(|p| p.pt).collect();
    let hits = project_onto_mesh(&origins, mesh, direction);

    let points: Vec<ToolPoint> = tp
        .points
        .iter()
        .zip(hits)
        .filter_map(|(p, hit)| {
            hit.map(|h| {
                let mut out = p.moved_to(h.point);
                out.dir = h.normal;
                out
            })
        })
        .collect();

    if points.is_empty() {
        return Err(CamError::ProjectionFailed {
            message: format!("no point of '{}' hits the mesh", tp.name),
        });
    }
    debug!(
        "Projected '{}': {} of {} points hit",
        tp.name,
        points.len(),
        tp.points.len()
    );
    Ok(tp.derived(points, tp.label))
}
