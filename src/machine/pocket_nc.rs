//! Pocket NC five-axis mills: A tilts the table about X, B turns it about Z.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::config::{angle, float_cmp, MachineSettings};
use crate::error::Result;
use crate::generator::{AxisWords, CodeInfo, GcodeWriter};
use crate::kinematics::{double_stance, fk_five_axis_ab_table, ik_path, AbPosition};
use crate::model::{MaterialTool, ToolPath, ToolPoint};
use crate::parser::read_gcode;

pub const A_OUT_OF_RANGE: &str = "A axis out of range";
pub const B_OUT_OF_RANGE: &str = "B axis out of range";

/// Hardware revision; they differ in A travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocketNcVersion {
    V1,
    #[default]
    V2,
}

impl PocketNcVersion {
    /// A axis travel, degrees.
    pub fn a_limits(self) -> (f64, f64) {
        match self {
            PocketNcVersion::V1 => (-5.0, 95.0),
            PocketNcVersion::V2 => (-25.0, 135.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PocketNc {
    pub settings: MachineSettings,
    pub version: PocketNcVersion,
    /// Machine coordinates of the table's rotation centre.
    pub pivot: Vector3<f64>,
    /// Use the second table stance when the first is out of travel.
    pub double_stance: bool,
    /// B axis travel, degrees.
    pub b_limits: (f64, f64),
}

impl PocketNc {
    pub fn new(settings: MachineSettings, version: PocketNcVersion) -> Self {
        Self {
            settings,
            version,
            pivot: Vector3::zeros(),
            double_stance: false,
            b_limits: (-9999.0, 9999.0),
        }
    }

    fn tool_length(mt: &MaterialTool) -> f64 {
        mt.tool_length.max(0.0)
    }

    fn a_in_range(&self, a: f64) -> bool {
        let (lo, hi) = self.version.a_limits();
        float_cmp::in_range(a.to_degrees(), lo, hi)
    }

    fn b_in_range(&self, b: f64) -> bool {
        float_cmp::in_range(b.to_degrees(), self.b_limits.0, self.b_limits.1)
    }

    /// Pick the table stance for principal angles.
    fn stance(&self, a: f64, b: f64) -> (f64, f64) {
        if !self.double_stance || (self.a_in_range(a) && self.b_in_range(angle::normalize(b))) {
            return (a, b);
        }
        let (a2, b2) = double_stance(a, b);
        if self.a_in_range(a2) && self.b_in_range(angle::normalize(b2)) {
            (a2, b2)
        } else {
            (a, b)
        }
    }

    /// Machine positions along a sequence of points, B continuous from `start_b`.
    pub fn ik(&self, points: &[ToolPoint], mt: &MaterialTool, start_b: f64) -> Vec<AbPosition> {
        ik_path(points, &self.pivot, Self::tool_length(mt), start_b, |a, b| self.stance(a, b))
    }

    /// Part-space tip and tool direction of a machine position.
    pub fn fk(&self, pos: &AbPosition, mt: &MaterialTool) -> (Point3<f64>, Vector3<f64>) {
        fk_five_axis_ab_table(pos, &self.pivot, Self::tool_length(mt))
    }

    /// Machine positions of two points, B of the second turned the long way if asked.
    fn endpoints(&self, from: &ToolPoint, to: &ToolPoint, mt: &MaterialTool, long_way: bool) -> (AbPosition, AbPosition) {
        let pair = [from.clone(), to.clone()];
        let pos = self.ik(&pair, mt, 0.0);
        let (start, mut end) = (pos[0], pos[1]);
        if long_way {
            end.b -= TAU * (end.b - start.b).signum();
        }
        (start, end)
    }

    pub(super) fn interpolate(
        &self,
        from: &ToolPoint,
        to: &ToolPoint,
        mt: &MaterialTool,
        t: f64,
        long_way: bool,
    ) -> ToolPoint {
        let (start, end) = self.endpoints(from, to, mt, long_way);
        let pos = AbPosition {
            m: start.m + (end.m - start.m) * t,
            a: start.a + (end.a - start.a) * t,
            b: start.b + (end.b - start.b) * t,
        };
        let (pt, dir) = self.fk(&pos, mt);
        let template = if t < 1.0 { from } else { to };
        let mut p = template.moved_to(pt);
        p.dir = dir;
        p
    }

    pub(super) fn ang_diff(&self, from: &ToolPoint, to: &ToolPoint, mt: &MaterialTool, long_way: bool) -> f64 {
        let (start, end) = self.endpoints(from, to, mt, long_way);
        (end.a - start.a).abs().max((end.b - start.b).abs())
    }

    /// Attach travel errors for a position to its point.
    fn check_limits(&self, tp: &mut ToolPoint, pos: &AbPosition) {
        if !self.a_in_range(pos.a) {
            tp.add_error(A_OUT_OF_RANGE);
        }
        if !self.b_in_range(pos.b) {
            tp.add_error(B_OUT_OF_RANGE);
        }
    }

    /// Seed the machine state from the instruction's start point.
    pub(super) fn set_start_state(&self, co: &mut CodeInfo, start: &ToolPath) {
        let Some(first) = start.first_point() else {
            return;
        };
        let mt = start.material_tool.as_deref().cloned().unwrap_or_default();
        let pos = self.ik(std::slice::from_ref(first), &mt, 0.0)[0];
        co.state.x = pos.m.x;
        co.state.y = pos.m.y;
        co.state.z = pos.m.z;
        co.state.a = pos.a;
        co.state.b = pos.b;
    }

    pub(super) fn write_code(&self, co: &mut CodeInfo, tp: &ToolPath) -> Result<()> {
        let mt = tp.require_tool()?.clone();
        let positions = self.ik(&tp.points, &mt, co.state.b);

        let mut points = tp.points.clone();
        for (p, pos) in points.iter_mut().zip(positions.iter()) {
            self.check_limits(p, pos);
        }
        let words: Vec<AxisWords> = positions
            .iter()
            .map(|pos| AxisWords {
                x: pos.m.x,
                y: pos.m.y,
                z: Some(pos.m.z),
                ab: Some((pos.a, pos.b)),
            })
            .collect();
        GcodeWriter::new(co, true).write_path(tp, &points, &words)
    }

    pub(super) fn read_code(&self, code: &str) -> Result<ToolPath> {
        let mt = self.settings.sole_tool().cloned().unwrap_or_default();
        let points = read_gcode(code, &self.settings.style)?
            .into_iter()
            .map(|m| {
                let pos = AbPosition {
                    m: Point3::new(m.x, m.y, m.z),
                    a: m.a.to_radians(),
                    b: m.b.to_radians(),
                };
                let (pt, dir) = self.fk(&pos, &mt);
                ToolPoint::with_dir(pt, dir).feed(m.feed).speed(m.speed)
            })
            .collect();
        Ok(ToolPath::with_points("Read", points))
    }
}
