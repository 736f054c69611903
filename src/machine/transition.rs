//! Safe links between paths, and the jump check made while writing.
//!
//! A transition leaves the end of one path, climbs out of the way of the
//! material, turns the rotary axes in small steps and stops just short of
//! the next path. Moves that start or end inside the safe envelope are not
//! routed; they are only checked against the tool's path jump.

use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use super::Machine;
use crate::config::{float_cmp, EPS, MAX_ROUTE_STEPS, TRANSITION_ANGLE_STEP};
use crate::error::{CamError, Result};
use crate::generator::CodeInfo;
use crate::model::{MaterialForm, MaterialTool, PathLabel, ToolPath, ToolPoint};

pub const LONG_JUMP: &str = "Jump through material longer than path jump";

/// Distance kept between a waypoint and the grown material.
const ROUTE_CLEARANCE: f64 = 10.0 * EPS;

/// Gouge samples taken between consecutive route points.
const GOUGE_SAMPLES: usize = 4;

/// Route from the last point of `from` towards the first point of `to`.
///
/// The result holds `from`'s last point followed by the waypoints; `to`'s
/// first point is not included. `first` marks the link out of the
/// instruction start, which may jump freely.
pub fn route(machine: &Machine, from: &ToolPath, to: &ToolPath, first: bool) -> Result<ToolPath> {
    let mut path = to.derived(Vec::new(), PathLabel::Transition);
    path.name.clear();
    path.pre_code.clear();
    path.post_code.clear();

    let (Some(start), Some(end)) = (from.last_point(), to.first_point()) else {
        return Ok(path);
    };
    path.points.push(start.clone());

    if matches!(machine, Machine::TwoAxis(_)) {
        return Ok(path);
    }
    let (Some(form), Some(mt)) = (
        to.material_form.as_ref().or(from.material_form.as_ref()),
        to.material_tool.as_ref().or(from.material_tool.as_ref()),
    ) else {
        return Ok(path);
    };

    let safe = form.safe_distance();
    if form.intersect(&start.pt, safe).inside() || form.intersect(&end.pt, safe).inside() {
        let distance = start.distance(end);
        if !first && distance > mt.path_jump {
            warn!(
                "Jump of {:.3} inside material exceeds path jump {:.3}",
                distance, mt.path_jump
            );
            path.points[0].add_error(LONG_JUMP);
        }
        return Ok(path);
    }

    let waypoints = avoid_material(form.as_ref(), start.pt, end.pt, safe);
    if float_cmp::approx_zero(machine.ang_diff(start, end, mt, false)) {
        path.points.extend(waypoints.iter().map(|p| rapid_at(start, *p, start.dir)));
        return Ok(path);
    }

    for long_way in [false, true] {
        let moves = oriented_moves(machine, start, end, mt, &waypoints, long_way);
        if !gouges(machine, form.as_ref(), mt, start, &moves, end) {
            debug!(
                "Transition with {} moves{}",
                moves.len(),
                if long_way { ", turning the long way" } else { "" }
            );
            path.points.extend(moves);
            return Ok(path);
        }
    }
    Err(CamError::no_safe_route(&start.pt, &end.pt))
}

/// Copy of a point for a synthesized rapid.
fn rapid_at(template: &ToolPoint, pt: Point3<f64>, dir: Vector3<f64>) -> ToolPoint {
    let mut p = template.moved_to(pt);
    p.dir = dir;
    p.feed = 0.0;
    p.name.clear();
    p.pre_code.clear();
    p.post_code.clear();
    p
}

/// Interior waypoints taking a straight segment around the grown material.
///
/// The deepest point of each offending segment is pushed out along the way
/// out of the material, until every segment is clear or the step budget
/// runs out.
fn avoid_material(form: &dyn MaterialForm, a: Point3<f64>, b: Point3<f64>, safe: f64) -> Vec<Point3<f64>> {
    let mut pts = vec![a, b];
    let mut steps = 0;
    let mut i = 0;
    while i + 1 < pts.len() {
        if steps >= MAX_ROUTE_STEPS {
            warn!("Transition routing gave up after {} waypoints", steps);
            break;
        }
        match form.deepest_on_segment(&pts[i], &pts[i + 1], safe) {
            Some((_, hit)) if hit.is_set => {
                pts.insert(i + 1, hit.hit_point + hit.away_direction * ROUTE_CLEARANCE);
                steps += 1;
            }
            _ => i += 1,
        }
    }
    pts[1..pts.len() - 1].to_vec()
}

/// Rapid moves along the waypoints with the orientation turned in steps.
///
/// Orientation follows the machine's own interpolation from `start` to
/// `end`, spread over the route by length.
fn oriented_moves(
    machine: &Machine,
    start: &ToolPoint,
    end: &ToolPoint,
    mt: &MaterialTool,
    waypoints: &[Point3<f64>],
    long_way: bool,
) -> Vec<ToolPoint> {
    let mut corners = Vec::with_capacity(waypoints.len() + 2);
    corners.push(start.pt);
    corners.extend_from_slice(waypoints);
    corners.push(end.pt);

    let lengths: Vec<f64> = corners.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
    let total: f64 = lengths.iter().sum();
    let total_ang = machine.ang_diff(start, end, mt, long_way);
    let segments = lengths.len();

    let mut moves = Vec::new();
    let mut done = 0.0;
    for (k, len) in lengths.iter().enumerate() {
        let share = if total > EPS { len / total } else { 1.0 / segments as f64 };
        let steps = ((total_ang * share / TRANSITION_ANGLE_STEP).ceil() as usize).max(1);
        for j in 1..=steps {
            if k + 1 == segments && j == steps {
                break;
            }
            let f = j as f64 / steps as f64;
            let t = done + share * f;
            let dir = machine.interpolate(start, end, mt, t, long_way).dir;
            let pt = corners[k] + (corners[k + 1] - corners[k]) * f;
            moves.push(rapid_at(start, pt, dir));
        }
        done += share;
    }
    moves
}

/// Whether the tool tip enters the material anywhere along the moves.
fn gouges(
    machine: &Machine,
    form: &dyn MaterialForm,
    mt: &MaterialTool,
    start: &ToolPoint,
    moves: &[ToolPoint],
    end: &ToolPoint,
) -> bool {
    let sequence: Vec<&ToolPoint> = std::iter::once(start).chain(moves).chain(std::iter::once(end)).collect();
    sequence.windows(2).any(|w| {
        (1..GOUGE_SAMPLES).any(|s| {
            let t = s as f64 / GOUGE_SAMPLES as f64;
            let tip = machine.interpolate(w[0], w[1], mt, t, false);
            form.intersect(&tip.pt, 0.0).inside()
        })
    })
}

/// Check the move from one written path to the next.
///
/// Moves out of an insert or transition, and into a retract or transition,
/// are part of a generated sequence and skipped. Anything else that starts
/// or ends inside the safe envelope and is longer than the tool's path jump
/// is an error.
pub fn jump_check(co: &mut CodeInfo, from: &ToolPath, to: &ToolPath) {
    if matches!(from.label, PathLabel::Insert | PathLabel::Transition)
        || matches!(to.label, PathLabel::Retract | PathLabel::Transition)
    {
        return;
    }
    let (Some(a), Some(b)) = (from.last_point(), to.first_point()) else {
        return;
    };
    let (Some(form), Some(mt)) = (
        to.material_form.as_ref().or(from.material_form.as_ref()),
        to.material_tool.as_ref().or(from.material_tool.as_ref()),
    ) else {
        return;
    };

    let safe = form.safe_distance();
    let inside = form.intersect(&a.pt, safe).inside() || form.intersect(&b.pt, safe).inside();
    if inside && a.distance(b) > mt.path_jump {
        co.add_error(LONG_JUMP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineSettings;
    use crate::kinematics::table_rotation;
    use crate::machine::PocketNcVersion;
    use crate::model::{BoxForm, PlaneForm};
    use std::sync::Arc;

    fn path(label: PathLabel, points: Vec<ToolPoint>, form: Arc<dyn MaterialForm>) -> ToolPath {
        let mut tp = ToolPath::with_points("P", points);
        tp.material_tool = Some(Arc::new(MaterialTool::default()));
        tp.material_form = Some(form);
        tp.label = label;
        tp
    }

    fn block() -> Arc<dyn MaterialForm> {
        Arc::new(BoxForm::new(Point3::new(0.0, 0.0, -10.0), Point3::new(20.0, 20.0, 0.0), 5.0))
    }

    // ==================== Routing tests ====================

    #[test]
    fn test_route_starts_at_from_and_excludes_to() {
        let machine = Machine::three_axis(MachineSettings::new("Mill"));
        let plane: Arc<dyn MaterialForm> = Arc::new(PlaneForm::horizontal(0.0, 5.0));
        let from = path(PathLabel::Retract, vec![ToolPoint::at(0.0, 0.0, 6.0)], plane.clone());
        let to = path(PathLabel::Insert, vec![ToolPoint::at(30.0, 0.0, 6.0)], plane);

        let t = machine.transition(&from, &to, false).unwrap();
        assert_eq!(t.label, PathLabel::Transition);
        assert_eq!(t.points.len(), 1);
        assert_eq!(t.points[0].pt, Point3::new(0.0, 0.0, 6.0));
    }

    #[test]
    fn test_route_climbs_over_material() {
        let machine = Machine::three_axis(MachineSettings::new("Mill"));
        // Low clearance on both sides of a block.
        let from = path(PathLabel::Retract, vec![ToolPoint::at(-6.0, 10.0, -5.0)], block());
        let to = path(PathLabel::Insert, vec![ToolPoint::at(26.0, 10.0, -5.0)], block());

        let t = machine.transition(&from, &to, false).unwrap();
        assert!(t.points.len() > 1);
        let form = block();
        let mut all: Vec<Point3<f64>> = t.points.iter().map(|p| p.pt).collect();
        all.push(Point3::new(26.0, 10.0, -5.0));
        for w in all.windows(2) {
            assert!(form.deepest_on_segment(&w[0], &w[1], 5.0 - 1e-3).is_none());
        }
    }

    #[test]
    fn test_long_jump_inside_material_is_error() {
        let machine = Machine::three_axis(MachineSettings::new("Mill"));
        let plane: Arc<dyn MaterialForm> = Arc::new(PlaneForm::horizontal(0.0, 5.0));
        let from = path(PathLabel::RoughCut, vec![ToolPoint::at(0.0, 0.0, -1.0)], plane.clone());
        let to = path(PathLabel::RoughCut, vec![ToolPoint::at(10.0, 0.0, -1.0)], plane);

        let t = machine.transition(&from, &to, false).unwrap();
        assert_eq!(t.points.len(), 1);
        assert_eq!(t.points[0].errors, vec![LONG_JUMP.to_string()]);

        let first = machine.transition(&from, &to, true).unwrap();
        assert!(first.points[0].errors.is_empty());
    }

    #[test]
    fn test_five_axis_route_turns_in_steps() {
        let machine = Machine::pocket_nc(MachineSettings::new("Pocket NC"), PocketNcVersion::V2);
        let plane: Arc<dyn MaterialForm> = Arc::new(PlaneForm::horizontal(0.0, 5.0));
        let from = path(
            PathLabel::Retract,
            vec![ToolPoint::with_dir(Point3::new(0.0, 0.0, 20.0), Vector3::new(0.0, -1.0, 1.0))],
            plane.clone(),
        );
        let to = path(
            PathLabel::Insert,
            vec![ToolPoint::with_dir(Point3::new(0.0, 10.0, 20.0), Vector3::new(-1.0, 0.0, 1.0))],
            plane,
        );

        let t = machine.transition(&from, &to, false).unwrap();
        let mt = MaterialTool::default();
        let mut all = t.points.clone();
        all.push(to.points[0].clone());
        assert!(all.len() > 2);
        for w in all.windows(2) {
            assert!(machine.ang_diff(&w[0], &w[1], &mt, false) <= TRANSITION_ANGLE_STEP + 1e-9);
        }
        assert!(t.points[1..].iter().all(|p| p.is_rapid()));
    }

    /// Tool direction for table angles given in degrees.
    fn table_dir(a: f64, b: f64) -> Vector3<f64> {
        table_rotation(a.to_radians(), b.to_radians()).inverse() * Vector3::z()
    }

    /// Turn in place at a tip high above the table, with material just below it.
    fn reorient(a0: f64, b0: f64, a1: f64, b1: f64, surface: f64, safe: f64) -> (ToolPath, ToolPath) {
        let plane: Arc<dyn MaterialForm> = Arc::new(PlaneForm::horizontal(surface, safe));
        let tip = Point3::new(0.0, 0.0, 1000.0);
        let from = path(PathLabel::Retract, vec![ToolPoint::with_dir(tip, table_dir(a0, b0))], plane.clone());
        let to = path(PathLabel::Insert, vec![ToolPoint::with_dir(tip, table_dir(a1, b1))], plane);
        (from, to)
    }

    #[test]
    fn test_five_axis_route_turns_long_way_when_short_way_gouges() {
        let machine = Machine::pocket_nc(MachineSettings::new("Pocket NC"), PocketNcVersion::V2);
        let mt = MaterialTool::default();
        let (from, to) = reorient(30.0, 0.0, 60.0, 20.0, 999.8, 0.1);
        let form = from.material_form.clone().unwrap();

        // Turning A in 3 degree steps drops the tip 0.28 below the surface.
        let short = oriented_moves(&machine, &from.points[0], &to.points[0], &mt, &[], false);
        assert!(gouges(&machine, form.as_ref(), &mt, &from.points[0], &short, &to.points[0]));

        let t = machine.transition(&from, &to, false).unwrap();
        // 340 degrees of B in 3 degree steps, without the end point.
        assert_eq!(t.points.len(), 1 + 113);
        let mut all = t.points.clone();
        all.push(to.points[0].clone());
        for w in all.windows(2) {
            assert!(machine.ang_diff(&w[0], &w[1], &mt, false) <= TRANSITION_ANGLE_STEP + 1e-9);
        }
        assert!(!gouges(&machine, form.as_ref(), &mt, &all[0], &all[1..all.len() - 1], &to.points[0]));
    }

    #[test]
    fn test_five_axis_route_fails_when_both_ways_gouge() {
        let machine = Machine::pocket_nc(MachineSettings::new("Pocket NC"), PocketNcVersion::V2);
        let (from, to) = reorient(-20.0, 0.0, 80.0, 179.0, 999.95, 0.02);

        assert!(matches!(
            machine.transition(&from, &to, false),
            Err(CamError::NoSafeRoute { .. })
        ));
    }

    // ==================== Jump check tests ====================

    #[test]
    fn test_jump_check() {
        let machine = Machine::three_axis(MachineSettings::new("Mill"));
        let plane: Arc<dyn MaterialForm> = Arc::new(PlaneForm::horizontal(0.0, 5.0));
        let a = path(PathLabel::RoughCut, vec![ToolPoint::at(0.0, 0.0, -1.0)], plane.clone());
        let b = path(PathLabel::RoughCut, vec![ToolPoint::at(10.0, 0.0, -1.0)], plane.clone());
        let retract = path(PathLabel::Retract, vec![ToolPoint::at(10.0, 0.0, -1.0)], plane);

        let mut co = machine.new_code_info();
        jump_check(&mut co, &a, &retract);
        assert!(co.errors().is_empty());
        jump_check(&mut co, &a, &b);
        assert!(co.errors().contains_key(LONG_JUMP));
    }
}
