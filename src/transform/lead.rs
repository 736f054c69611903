//! Insert and retract moves, with optional lead arcs on closed paths.

use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;
use tracing::warn;

use crate::config::{LEAD_ARC_DIVISIONS, LEAD_ARC_POINTS};
use crate::machine::Machine;
use crate::model::{MaterialForm, MaterialTool, PathLabel, ToolPath, ToolPathAdditions, ToolPoint};

/// Which end of the path a lead arc attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadEnd {
    In,
    Out,
}

/// Split a path into insert, cut and retract paths.
///
/// Straight moves run along the tool direction from the entry point to the
/// material surface (plunge feed) and on to safe distance (rapid). A closed
/// path with a lead curvature first gets a tangent arc on its outside. When
/// `straight` is false only the arcs are added, for machines without a
/// vertical axis. The returned paths carry no additions.
pub fn insert_retract(tp: &ToolPath, machine: &Machine, straight: bool) -> Vec<ToolPath> {
    let additions = tp.additions.clone();
    let mut cut = tp.clone();
    cut.additions = ToolPathAdditions::none();

    let (mt, form) = match (tp.material_tool.as_deref(), tp.material_form.as_deref()) {
        (Some(mt), Some(form)) if !tp.points.is_empty() => (mt, form),
        _ => return vec![cut],
    };
    let use_lead = tp.is_closed() && additions.lead_curvature > 0.0;
    let clearance = mt.insert_width / 2.0;

    let mut insert_pts = Vec::new();
    if additions.insert {
        let mut entry = cut.points[0].clone();
        if use_lead {
            match lead_arc(&cut.points, additions.lead_curvature, clearance, machine, LeadEnd::In) {
                Some(mut arc) => {
                    arc[0].feed = mt.feed_plunge;
                    entry = arc[0].clone();
                    insert_pts = arc;
                }
                None => {
                    warn!("Lead-in on '{}' could not clear the path", tp.name);
                    cut.points[0].add_warning("Lead-in could not clear the path, point used as is");
                }
            }
        }
        if straight {
            match straight_moves(&entry, form, machine, mt) {
                Some(mut moves) => {
                    moves.extend(insert_pts);
                    insert_pts = moves;
                }
                None => cut.points[0].add_warning("No way out of the material along the tool direction"),
            }
        }
    }

    let mut retract_pts = Vec::new();
    if additions.retract {
        let last = cut.points.len() - 1;
        let mut exit = cut.points[last].clone();
        if use_lead {
            match lead_arc(&cut.points, additions.lead_curvature, clearance, machine, LeadEnd::Out) {
                Some(arc) => {
                    if let Some(end) = arc.last() {
                        exit = end.clone();
                    }
                    retract_pts = arc;
                }
                None => {
                    warn!("Lead-out on '{}' could not clear the path", tp.name);
                    cut.points[last].add_warning("Lead-out could not clear the path, point used as is");
                }
            }
        }
        if straight {
            match straight_moves(&exit, form, machine, mt) {
                Some(mut moves) => {
                    // Surface first, then up to safe distance.
                    moves.reverse();
                    retract_pts.extend(moves);
                }
                None => cut.points[last].add_warning("No way out of the material along the tool direction"),
            }
        }
    }

    let mut out = Vec::with_capacity(3);
    if !insert_pts.is_empty() {
        out.push(cut.derived(insert_pts, PathLabel::Insert));
    }
    out.push(cut.clone());
    if !retract_pts.is_empty() {
        out.push(cut.derived(retract_pts, PathLabel::Retract));
    }
    out
}

/// Copy of a point for a synthesized move: position kept, annotations dropped.
fn bare(point: &ToolPoint) -> ToolPoint {
    let mut p = point.moved_to(point.pt);
    p.name.clear();
    p.pre_code.clear();
    p.post_code.clear();
    p
}

/// Points from safe distance down to the surface above `entry`.
///
/// Empty when `entry` is already clear of the material; `None` when no way
/// out exists along the tool direction.
pub fn straight_moves(
    entry: &ToolPoint,
    form: &dyn MaterialForm,
    machine: &Machine,
    mt: &MaterialTool,
) -> Option<Vec<ToolPoint>> {
    let safe = form.safe_distance();
    if !form.intersect(&entry.pt, safe).inside() {
        return Some(Vec::new());
    }
    let dir = machine.tool_dir(entry);
    let clear = form.intersect_ray(&entry.pt, &dir, safe);
    if !clear.is_set {
        return None;
    }
    let template = bare(entry);
    let mut moves = vec![template.moved_to(clear.hit_point).feed(0.0)];

    let surface = form.intersect_ray(&entry.pt, &dir, 0.0);
    if surface.is_set && surface.inside() {
        moves.push(template.moved_to(surface.hit_point).feed(mt.feed_plunge));
    }
    Some(moves)
}

fn distance_to_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < f64::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

fn distance_to_path(p: &Point3<f64>, points: &[ToolPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| distance_to_segment(p, &w[0].pt, &w[1].pt))
        .fold(f64::INFINITY, f64::min)
}

/// Tangent arc on the outside of a closed path.
///
/// The arc has radius `1 / curvature` and is walked until it is `clearance`
/// away from the path. Points run in cutting order and exclude the path's
/// own end point. `None` when no point of the half circle clears the path.
pub fn lead_arc(
    points: &[ToolPoint],
    curvature: f64,
    clearance: f64,
    machine: &Machine,
    end: LeadEnd,
) -> Option<Vec<ToolPoint>> {
    if points.len() < 3 || curvature <= 0.0 {
        return None;
    }
    let (anchor, neighbour) = match end {
        LeadEnd::In => (&points[0], &points[1]),
        LeadEnd::Out => (&points[points.len() - 1], &points[points.len() - 2]),
    };
    let n = machine.tool_dir(anchor);
    let raw = match end {
        LeadEnd::In => neighbour.pt - anchor.pt,
        LeadEnd::Out => anchor.pt - neighbour.pt,
    };
    let t = (raw - n * raw.dot(&n)).try_normalize(f64::EPSILON)?;

    // Newell area along the tool direction decides the winding.
    let winding: f64 = points
        .windows(2)
        .map(|w| w[0].pt.coords.cross(&w[1].pt.coords).dot(&n))
        .sum();
    let outside: Vector3<f64> = if winding > 0.0 { t.cross(&n) } else { n.cross(&t) };

    let r = 1.0 / curvature;
    let centre = anchor.pt + outside * r;
    let along = match end {
        LeadEnd::In => -t,
        LeadEnd::Out => t,
    };
    let at = |theta: f64| centre - outside * (r * theta.cos()) + along * (r * theta.sin());
    let clear = |theta: f64| distance_to_path(&at(theta), points) >= clearance;

    let step = PI / LEAD_ARC_DIVISIONS as f64;
    let k = (1..=LEAD_ARC_DIVISIONS).find(|&k| clear(k as f64 * step))?;
    let mut lo = (k - 1) as f64 * step;
    let mut hi = k as f64 * step;
    for _ in 0..20 {
        let mid = (lo + hi) / 2.0;
        if clear(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let template = bare(anchor);
    let count = LEAD_ARC_POINTS;
    let arc = (0..count)
        .map(|j| {
            let theta = match end {
                LeadEnd::In => hi * (1.0 - j as f64 / count as f64),
                LeadEnd::Out => hi * (j + 1) as f64 / count as f64,
            };
            template.moved_to(at(theta))
        })
        .collect();
    Some(arc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineSettings;
    use crate::model::PlaneForm;
    use std::sync::Arc;

    fn machine() -> Machine {
        Machine::three_axis(MachineSettings::new("Test"))
    }

    fn square(additions: ToolPathAdditions) -> ToolPath {
        let pts = [
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ];
        let polyline: Vec<Point3<f64>> = pts.iter().map(|&(x, y)| Point3::new(x, y, -1.0)).collect();
        ToolPath::from_polyline(
            "square",
            &polyline,
            Some(Arc::new(MaterialTool::default())),
            Some(Arc::new(PlaneForm::horizontal(0.0, 5.0))),
            additions,
            0.0,
        )
    }

    // ==================== Straight move tests ====================

    #[test]
    fn test_straight_insert_and_retract() {
        let out = insert_retract(&square(ToolPathAdditions::basic()), &machine(), true);
        assert_eq!(out.len(), 3);
        let insert = &out[0];
        assert_eq!(insert.label, PathLabel::Insert);
        assert_eq!(insert.points[0].pt, Point3::new(0.0, 0.0, 5.0));
        assert!(insert.points[0].is_rapid());
        assert_eq!(insert.points[1].pt, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(insert.points[1].feed, MaterialTool::default().feed_plunge);

        let retract = &out[2];
        assert_eq!(retract.label, PathLabel::Retract);
        assert_eq!(retract.points[0].pt, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(retract.points[1].pt, Point3::new(0.0, 0.0, 5.0));
        assert!(retract.points[1].is_rapid());

        assert!(out.iter().all(|p| !p.additions.any()));
    }

    #[test]
    fn test_no_insert_when_clear() {
        let mut tp = square(ToolPathAdditions::basic());
        for p in &mut tp.points {
            p.pt.z = 10.0;
        }
        let out = insert_retract(&tp, &machine(), true);
        assert_eq!(out.len(), 1);
    }

    // ==================== Lead arc tests ====================

    #[test]
    fn test_lead_arc_outside_and_clear() {
        let additions = ToolPathAdditions {
            lead_curvature: 0.5,
            ..ToolPathAdditions::basic()
        };
        let tp = square(additions);
        let arc = lead_arc(&tp.points, 0.5, 1.5, &machine(), LeadEnd::In).unwrap();
        assert_eq!(arc.len(), LEAD_ARC_POINTS);
        // Counter-clockwise square: the outside of the first edge is -Y.
        assert!(arc.iter().all(|p| p.pt.y < 1e-9));
        assert!(distance_to_path(&arc[0].pt, &tp.points) >= 1.5 - 1e-6);

        let out = insert_retract(&tp, &machine(), true);
        let insert = &out[0];
        assert!(insert.points.len() > LEAD_ARC_POINTS);
        assert!(out[1].points[0].warnings.is_empty());
    }

    #[test]
    fn test_lead_arc_failure_warns() {
        let additions = ToolPathAdditions {
            lead_curvature: 10.0,
            ..ToolPathAdditions::basic()
        };
        let tp = square(additions);
        // Radius 0.1 can never get 5 away from the path.
        let mut mt = MaterialTool::default();
        mt.insert_width = 10.0;
        let tp = ToolPath {
            material_tool: Some(Arc::new(mt)),
            ..tp
        };
        let out = insert_retract(&tp, &machine(), true);
        let cut = out.iter().find(|p| p.label == PathLabel::None).unwrap();
        assert!(!cut.points[0].warnings.is_empty());
    }
}
