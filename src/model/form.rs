//! Material geometry queried by the processing stages.
//!
//! The pipeline treats a material form as an oracle answering "how far inside
//! the material is this point, and which way is out". Two simple forms are
//! provided; richer geometry can implement [`MaterialForm`] directly.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EPS;

/// Answer to a material query.
#[derive(Debug, Clone, PartialEq)]
pub struct FormIntersection {
    /// Whether a way out of the material was found.
    pub is_set: bool,
    /// Distance travelled inside the (grown) material before leaving it.
    pub through_distance: f64,
    /// Direction in which the material is left.
    pub away_direction: Vector3<f64>,
    /// Point where the (grown) material is left.
    pub hit_point: Point3<f64>,
}

impl FormIntersection {
    /// The query point is outside the material.
    pub fn outside(point: Point3<f64>, away: Vector3<f64>) -> Self {
        Self {
            is_set: true,
            through_distance: 0.0,
            away_direction: away,
            hit_point: point,
        }
    }

    /// No way out was found along the query.
    pub fn unset(point: Point3<f64>) -> Self {
        Self {
            is_set: false,
            through_distance: 0.0,
            away_direction: Vector3::z(),
            hit_point: point,
        }
    }

    /// Whether the query point was inside the material.
    pub fn inside(&self) -> bool {
        self.through_distance > EPS
    }
}

/// Material being cut.
pub trait MaterialForm: fmt::Debug + Send + Sync {
    /// Clearance above the material for rapid moves.
    fn safe_distance(&self) -> f64;

    /// Tolerance of the material surface.
    fn material_tolerance(&self) -> f64;

    /// Nearest way out of the material grown by `tolerance`.
    fn intersect(&self, point: &Point3<f64>, tolerance: f64) -> FormIntersection;

    /// Where a ray from `point` along `direction` leaves the material grown by `tolerance`.
    fn intersect_ray(
        &self,
        point: &Point3<f64>,
        direction: &Vector3<f64>,
        tolerance: f64,
    ) -> FormIntersection;

    /// Deepest point of a segment inside the material grown by `tolerance`.
    ///
    /// The default samples the segment at the material tolerance, capped at
    /// 500 samples.
    fn deepest_on_segment(
        &self,
        from: &Point3<f64>,
        to: &Point3<f64>,
        tolerance: f64,
    ) -> Option<(Point3<f64>, FormIntersection)> {
        let length = (to - from).norm();
        let step = self.material_tolerance().max(EPS);
        let samples = ((length / step).ceil() as usize).clamp(2, 500);

        let mut deepest: Option<(Point3<f64>, FormIntersection)> = None;
        for i in 0..=samples {
            let t = i as f64 / samples as f64;
            let p = from + (to - from) * t;
            let inter = self.intersect(&p, tolerance);
            if !inter.inside() {
                continue;
            }
            let deeper = deepest
                .as_ref()
                .map_or(true, |(_, d)| inter.through_distance > d.through_distance);
            if deeper {
                deepest = Some((p, inter));
            }
        }
        deepest
    }
}

/// Material filling the half-space below a plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneForm {
    /// A point on the material surface.
    pub origin: Point3<f64>,
    /// Outward surface normal.
    pub normal: Vector3<f64>,
    /// Clearance above the material for rapid moves.
    pub safe_distance: f64,
    /// Tolerance of the material surface.
    pub tolerance: f64,
}

impl PlaneForm {
    /// Material below `z = height`.
    pub fn horizontal(height: f64, safe_distance: f64) -> Self {
        Self {
            origin: Point3::new(0.0, 0.0, height),
            normal: Vector3::z(),
            safe_distance,
            tolerance: 0.01,
        }
    }

    fn unit_normal(&self) -> Vector3<f64> {
        self.normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::z)
    }

    /// Depth of a point below the grown surface.
    fn depth(&self, point: &Point3<f64>, tolerance: f64) -> f64 {
        tolerance - self.unit_normal().dot(&(point - self.origin))
    }
}

impl MaterialForm for PlaneForm {
    fn safe_distance(&self) -> f64 {
        self.safe_distance
    }

    fn material_tolerance(&self) -> f64 {
        self.tolerance
    }

    fn intersect(&self, point: &Point3<f64>, tolerance: f64) -> FormIntersection {
        let n = self.unit_normal();
        let depth = self.depth(point, tolerance);
        if depth <= 0.0 {
            return FormIntersection::outside(*point, n);
        }
        FormIntersection {
            is_set: true,
            through_distance: depth,
            away_direction: n,
            hit_point: point + n * depth,
        }
    }

    fn intersect_ray(
        &self,
        point: &Point3<f64>,
        direction: &Vector3<f64>,
        tolerance: f64,
    ) -> FormIntersection {
        let n = self.unit_normal();
        let depth = self.depth(point, tolerance);
        if depth <= 0.0 {
            return FormIntersection::outside(*point, n);
        }
        let dir = match direction.try_normalize(f64::EPSILON) {
            Some(d) => d,
            None => return FormIntersection::unset(*point),
        };
        let rise = n.dot(&dir);
        if rise <= EPS {
            return FormIntersection::unset(*point);
        }
        let t = depth / rise;
        FormIntersection {
            is_set: true,
            through_distance: t,
            away_direction: dir,
            hit_point: point + dir * t,
        }
    }

    fn deepest_on_segment(
        &self,
        from: &Point3<f64>,
        to: &Point3<f64>,
        tolerance: f64,
    ) -> Option<(Point3<f64>, FormIntersection)> {
        // Depth is linear along a segment, so an end is deepest.
        let a = self.intersect(from, tolerance);
        let b = self.intersect(to, tolerance);
        let (p, inter) = if a.through_distance >= b.through_distance {
            (*from, a)
        } else {
            (*to, b)
        };
        inter.inside().then_some((p, inter))
    }
}

/// Axis-aligned block of material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxForm {
    /// Lower corner.
    pub min: Point3<f64>,
    /// Upper corner.
    pub max: Point3<f64>,
    /// Clearance around the block for rapid moves.
    pub safe_distance: f64,
    /// Tolerance of the material surface.
    pub tolerance: f64,
}

impl BoxForm {
    /// Create a block from two corners.
    pub fn new(min: Point3<f64>, max: Point3<f64>, safe_distance: f64) -> Self {
        Self {
            min: min.inf(&max),
            max: min.sup(&max),
            safe_distance,
            tolerance: 0.01,
        }
    }

    fn grown(&self, tolerance: f64) -> (Point3<f64>, Point3<f64>) {
        let t = Vector3::repeat(tolerance);
        (self.min - t, self.max + t)
    }

    fn contains(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        let (lo, hi) = self.grown(tolerance);
        (0..3).all(|i| point[i] > lo[i] && point[i] < hi[i])
    }
}

impl MaterialForm for BoxForm {
    fn safe_distance(&self) -> f64 {
        self.safe_distance
    }

    fn material_tolerance(&self) -> f64 {
        self.tolerance
    }

    fn intersect(&self, point: &Point3<f64>, tolerance: f64) -> FormIntersection {
        let (lo, hi) = self.grown(tolerance);

        if !self.contains(point, tolerance) {
            let nearest = point.sup(&lo).inf(&hi);
            let away = (point - nearest)
                .try_normalize(f64::EPSILON)
                .unwrap_or_else(Vector3::z);
            return FormIntersection::outside(*point, away);
        }

        // Leave through the closest face.
        let mut best = (f64::INFINITY, Vector3::z());
        for i in 0..3 {
            let mut axis = Vector3::zeros();
            axis[i] = 1.0;
            let up = hi[i] - point[i];
            if up < best.0 {
                best = (up, axis);
            }
            let down = point[i] - lo[i];
            if down < best.0 {
                best = (down, -axis);
            }
        }
        let (distance, away) = best;
        FormIntersection {
            is_set: true,
            through_distance: distance,
            away_direction: away,
            hit_point: point + away * distance,
        }
    }

    fn intersect_ray(
        &self,
        point: &Point3<f64>,
        direction: &Vector3<f64>,
        tolerance: f64,
    ) -> FormIntersection {
        let dir = match direction.try_normalize(f64::EPSILON) {
            Some(d) => d,
            None => return FormIntersection::unset(*point),
        };
        if !self.contains(point, tolerance) {
            return FormIntersection::outside(*point, dir);
        }

        let (lo, hi) = self.grown(tolerance);
        let mut t_exit = f64::INFINITY;
        for i in 0..3 {
            if dir[i] > EPS {
                t_exit = t_exit.min((hi[i] - point[i]) / dir[i]);
            } else if dir[i] < -EPS {
                t_exit = t_exit.min((lo[i] - point[i]) / dir[i]);
            }
        }
        if !t_exit.is_finite() {
            return FormIntersection::unset(*point);
        }
        FormIntersection {
            is_set: true,
            through_distance: t_exit,
            away_direction: dir,
            hit_point: point + dir * t_exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    // ==================== PlaneForm tests ====================

    #[test]
    fn test_plane_point_inside() {
        let form = PlaneForm::horizontal(0.0, 5.0);
        let inter = form.intersect(&Point3::new(1.0, 1.0, -2.0), 0.0);
        assert!(inter.inside());
        assert!((inter.through_distance - 2.0).abs() < TOL);
        assert!((inter.hit_point.z).abs() < TOL);
    }

    #[test]
    fn test_plane_point_outside() {
        let form = PlaneForm::horizontal(0.0, 5.0);
        let inter = form.intersect(&Point3::new(0.0, 0.0, 1.0), 0.0);
        assert!(!inter.inside());
        assert!(inter.is_set);
    }

    #[test]
    fn test_plane_safe_distance_grows_material() {
        let form = PlaneForm::horizontal(0.0, 5.0);
        let inter = form.intersect(&Point3::new(0.0, 0.0, 1.0), form.safe_distance());
        assert!((inter.through_distance - 4.0).abs() < TOL);
    }

    #[test]
    fn test_plane_ray_exit() {
        let form = PlaneForm::horizontal(0.0, 5.0);
        let dir = Vector3::new(1.0, 0.0, 1.0);
        let inter = form.intersect_ray(&Point3::new(0.0, 0.0, -1.0), &dir, 0.0);
        assert!(inter.is_set);
        assert!((inter.hit_point - Point3::new(1.0, 0.0, 0.0)).norm() < TOL);
    }

    #[test]
    fn test_plane_ray_parallel_never_exits() {
        let form = PlaneForm::horizontal(0.0, 5.0);
        let inter = form.intersect_ray(&Point3::new(0.0, 0.0, -1.0), &Vector3::x(), 0.0);
        assert!(!inter.is_set);
    }

    #[test]
    fn test_plane_deepest_on_segment() {
        let form = PlaneForm::horizontal(0.0, 5.0);
        let found = form.deepest_on_segment(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(10.0, 0.0, -3.0),
            0.0,
        );
        let (p, inter) = found.expect("segment dips into material");
        assert!((p.x - 10.0).abs() < TOL);
        assert!((inter.through_distance - 3.0).abs() < TOL);
    }

    // ==================== BoxForm tests ====================

    #[test]
    fn test_box_nearest_face() {
        let form = BoxForm::new(Point3::new(0.0, 0.0, -10.0), Point3::new(100.0, 100.0, 0.0), 5.0);
        let inter = form.intersect(&Point3::new(50.0, 50.0, -1.0), 0.0);
        assert!((inter.through_distance - 1.0).abs() < TOL);
        assert!((inter.away_direction - Vector3::z()).norm() < TOL);
    }

    #[test]
    fn test_box_ray_exit() {
        let form = BoxForm::new(Point3::new(0.0, 0.0, -10.0), Point3::new(100.0, 100.0, 0.0), 5.0);
        let inter = form.intersect_ray(&Point3::new(50.0, 50.0, -4.0), &Vector3::z(), 5.0);
        assert!((inter.hit_point.z - 5.0).abs() < TOL);
        assert!((inter.through_distance - 9.0).abs() < TOL);
    }

    #[test]
    fn test_box_default_segment_sampling() {
        let form = BoxForm::new(Point3::new(0.0, 0.0, -10.0), Point3::new(10.0, 10.0, 0.0), 5.0);
        let found = form.deepest_on_segment(
            &Point3::new(-5.0, 5.0, 1.0),
            &Point3::new(15.0, 5.0, 1.0),
            5.0,
        );
        let (p, _) = found.expect("segment passes through the grown block");
        assert!(p.x > -5.0 && p.x < 15.0);

        let clear = form.deepest_on_segment(
            &Point3::new(-5.0, 5.0, 6.0),
            &Point3::new(15.0, 5.0, 6.0),
            5.0,
        );
        assert!(clear.is_none());
    }
}
