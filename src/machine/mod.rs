//! Machines: kinematics, code writing and reading per axis configuration.
//!
//! [`Machine`] is a closed set of machine kinds; every capability dispatches
//! on the kind. Adding a machine means adding a variant.

mod omax;
mod pocket_nc;
mod three_axis;
pub mod transition;
mod two_axis;

pub use omax::Omax5;
pub use pocket_nc::{PocketNc, PocketNcVersion};
pub use three_axis::ThreeAxis;
pub use two_axis::TwoAxis;

use nalgebra::Vector3;

use crate::config::MachineSettings;
use crate::error::Result;
use crate::generator::{CodeInfo, GcodeWriter};
use crate::model::{
    normalize_or_z, MachineInstruction, MachineOperation, MaterialTool, ToolPath, ToolPoint,
};

/// A machine the code is written for.
#[derive(Debug, Clone)]
pub enum Machine {
    /// X/Y cutter switched on and off, e.g. a laser or drag knife.
    TwoAxis(TwoAxis),
    /// X/Y/Z mill with a fixed vertical tool.
    ThreeAxis(ThreeAxis),
    /// Five-axis mill with an A/B rotary table.
    PocketNc(PocketNc),
    /// Five-axis waterjet with a tilting head.
    Omax5(Omax5),
}

impl Machine {
    pub fn two_axis(settings: MachineSettings) -> Self {
        Machine::TwoAxis(TwoAxis::new(settings))
    }

    pub fn three_axis(settings: MachineSettings) -> Self {
        Machine::ThreeAxis(ThreeAxis::new(settings))
    }

    pub fn pocket_nc(settings: MachineSettings, version: PocketNcVersion) -> Self {
        Machine::PocketNc(PocketNc::new(settings, version))
    }

    pub fn omax5(settings: MachineSettings) -> Self {
        Machine::Omax5(Omax5::new(settings))
    }

    /// Settings shared by every kind.
    pub fn settings(&self) -> &MachineSettings {
        match self {
            Machine::TwoAxis(m) => &m.settings,
            Machine::ThreeAxis(m) => &m.settings,
            Machine::PocketNc(m) => &m.settings,
            Machine::Omax5(m) => &m.settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings().name
    }

    /// Fresh accumulator in this machine's code style.
    pub fn new_code_info(&self) -> CodeInfo {
        CodeInfo::new(self.settings().style.clone())
    }

    /// Direction the tool can move out of the material at a point.
    pub fn tool_dir(&self, tp: &ToolPoint) -> Vector3<f64> {
        match self {
            Machine::TwoAxis(_) | Machine::ThreeAxis(_) => Vector3::z(),
            Machine::PocketNc(_) | Machine::Omax5(_) => normalize_or_z(tp.dir),
        }
    }

    /// Point a fraction `t` of the way between two points, moving the machine axes.
    ///
    /// `long_way` turns rotary axes the long way round.
    pub fn interpolate(
        &self,
        from: &ToolPoint,
        to: &ToolPoint,
        mt: &MaterialTool,
        t: f64,
        long_way: bool,
    ) -> ToolPoint {
        match self {
            Machine::TwoAxis(_) | Machine::ThreeAxis(_) => lerp_point(from, to, t),
            Machine::PocketNc(m) => m.interpolate(from, to, mt, t, long_way),
            Machine::Omax5(m) => m.interpolate(from, to, t),
        }
    }

    /// Largest rotary change between two points, radians.
    pub fn ang_diff(&self, from: &ToolPoint, to: &ToolPoint, mt: &MaterialTool, long_way: bool) -> f64 {
        match self {
            Machine::TwoAxis(_) | Machine::ThreeAxis(_) => 0.0,
            Machine::PocketNc(m) => m.ang_diff(from, to, mt, long_way),
            Machine::Omax5(_) => from.dir.angle(&to.dir),
        }
    }

    /// Add the insert and retract moves a path asks for.
    pub fn insert_retract(&self, tp: &ToolPath) -> Vec<ToolPath> {
        match self {
            Machine::TwoAxis(m) => m.insert_retract(tp, self),
            _ => crate::transform::lead::insert_retract(tp, self, true),
        }
    }

    /// Safe link from the end of `from` to the start of `to`.
    ///
    /// The result starts with `from`'s last point and stops short of `to`'s
    /// first point.
    pub fn transition(&self, from: &ToolPath, to: &ToolPath, first: bool) -> Result<ToolPath> {
        transition::route(self, from, to, first)
    }

    /// Check the move between two written paths.
    pub fn write_transition(&self, co: &mut CodeInfo, from: &ToolPath, to: &ToolPath) -> Result<()> {
        transition::jump_check(co, from, to);
        Ok(())
    }

    pub fn write_file_start(&self, co: &mut CodeInfo, mi: &MachineInstruction) -> Result<()> {
        let settings = self.settings();
        match self {
            Machine::Omax5(m) => m.write_file_start(co, mi),
            Machine::PocketNc(m) => {
                m.set_start_state(co, &mi.start_path);
                GcodeWriter::new(co, true).program_start(&settings.name, &mi.name, &settings.header, &mi.pre_code);
            }
            Machine::TwoAxis(_) => {
                GcodeWriter::new(co, false).program_start(&settings.name, &mi.name, &settings.header, &mi.pre_code)
            }
            Machine::ThreeAxis(_) => {
                if let Some(p) = mi.start_path.first_point() {
                    co.state.x = p.pt.x;
                    co.state.y = p.pt.y;
                    co.state.z = p.pt.z;
                }
                GcodeWriter::new(co, true).program_start(&settings.name, &mi.name, &settings.header, &mi.pre_code)
            }
        }
        Ok(())
    }

    pub fn write_file_end(&self, co: &mut CodeInfo, mi: &MachineInstruction) {
        let settings = self.settings();
        match self {
            Machine::Omax5(m) => m.write_file_end(co, mi),
            Machine::TwoAxis(_) => GcodeWriter::new(co, false).program_end(&mi.post_code, &settings.footer),
            _ => GcodeWriter::new(co, true).program_end(&mi.post_code, &settings.footer),
        }
    }

    pub fn write_op_start(&self, co: &mut CodeInfo, op: &MachineOperation) {
        if !op.name.is_empty() {
            co.append_comment(&format!("Operation: {}", op.name));
        }
        if !op.pre_code.is_empty() {
            co.append_line(&op.pre_code);
        }
    }

    pub fn write_op_end(&self, co: &mut CodeInfo, op: &MachineOperation) {
        if !op.post_code.is_empty() {
            co.append_line(&op.post_code);
        }
    }

    /// Write one processed path.
    pub fn write_code(&self, co: &mut CodeInfo, tp: &ToolPath) -> Result<()> {
        match self {
            Machine::TwoAxis(m) => m.write_code(co, tp),
            Machine::ThreeAxis(m) => m.write_code(co, tp),
            Machine::PocketNc(m) => m.write_code(co, tp),
            Machine::Omax5(m) => m.write_code(co, tp),
        }
    }

    /// Parse code written by this machine back into a single path.
    pub fn read_code(&self, code: &str) -> Result<ToolPath> {
        match self {
            Machine::TwoAxis(m) => m.read_code(code),
            Machine::ThreeAxis(m) => m.read_code(code),
            Machine::PocketNc(m) => m.read_code(code),
            Machine::Omax5(m) => m.read_code(code),
        }
    }
}

/// Straight-line interpolation of position and direction.
pub(crate) fn lerp_point(from: &ToolPoint, to: &ToolPoint, t: f64) -> ToolPoint {
    let template = if t < 1.0 { from } else { to };
    let mut p = template.moved_to(from.pt + (to.pt - from.pt) * t);
    p.dir = if t <= 0.0 {
        from.dir
    } else if t >= 1.0 {
        to.dir
    } else {
        normalize_or_z(from.dir.lerp(&to.dir, t))
    };
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn machines() -> Vec<Machine> {
        vec![
            Machine::two_axis(MachineSettings::new("2")),
            Machine::three_axis(MachineSettings::new("3")),
            Machine::pocket_nc(MachineSettings::new("5"), PocketNcVersion::V2),
            Machine::omax5(MachineSettings::new("W")),
        ]
    }

    #[test]
    fn test_interpolate_endpoints_all_machines() {
        let mt = MaterialTool::default();
        let a = ToolPoint::with_dir(Point3::new(1.0, 2.0, 3.0), Vector3::new(0.2, 0.1, 1.0));
        let b = ToolPoint::with_dir(Point3::new(-4.0, 0.5, 8.0), Vector3::new(-0.3, 0.4, 1.0));
        for m in machines() {
            let start = m.interpolate(&a, &b, &mt, 0.0, false);
            let end = m.interpolate(&a, &b, &mt, 1.0, false);
            assert!((start.pt - a.pt).norm() < 1e-9, "{}", m.name());
            assert!((end.pt - b.pt).norm() < 1e-9, "{}", m.name());
            assert!((start.dir - a.dir).norm() < 1e-9, "{}", m.name());
            assert!((end.dir - b.dir).norm() < 1e-9, "{}", m.name());
        }
    }

    #[test]
    fn test_tool_dir() {
        let tp = ToolPoint::with_dir(Point3::origin(), Vector3::new(1.0, 0.0, 1.0));
        assert_eq!(machines()[1].tool_dir(&tp), Vector3::z());
        assert!((machines()[2].tool_dir(&tp) - tp.dir).norm() < 1e-12);
    }

    #[test]
    fn test_ang_diff_zero_for_fixed_tool() {
        let mt = MaterialTool::default();
        let a = ToolPoint::with_dir(Point3::origin(), Vector3::x());
        let b = ToolPoint::with_dir(Point3::origin(), Vector3::z());
        assert_eq!(machines()[1].ang_diff(&a, &b, &mt, false), 0.0);
        assert!((machines()[3].ang_diff(&a, &b, &mt, false) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }
}
