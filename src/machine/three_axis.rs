//! Three-axis mills with a fixed vertical tool.

use crate::config::MachineSettings;
use crate::error::Result;
use crate::generator::{AxisWords, CodeInfo, GcodeWriter};
use crate::model::{ToolPath, ToolPoint};
use crate::parser::read_gcode;

#[derive(Debug, Clone)]
pub struct ThreeAxis {
    pub settings: MachineSettings,
}

impl ThreeAxis {
    pub fn new(settings: MachineSettings) -> Self {
        Self { settings }
    }

    pub(super) fn write_code(&self, co: &mut CodeInfo, tp: &ToolPath) -> Result<()> {
        let words: Vec<AxisWords> = tp
            .points
            .iter()
            .map(|p| AxisWords::xyz(p.pt.x, p.pt.y, p.pt.z))
            .collect();
        GcodeWriter::new(co, true).write_path(tp, &tp.points, &words)
    }

    pub(super) fn read_code(&self, code: &str) -> Result<ToolPath> {
        let points = read_gcode(code, &self.settings.style)?
            .into_iter()
            .map(|m| ToolPoint::at(m.x, m.y, m.z).feed(m.feed).speed(m.speed))
            .collect();
        Ok(ToolPath::with_points("Read", points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::model::{MaterialTool, PlaneForm};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn path() -> ToolPath {
        let mut tp = ToolPath::with_points(
            "Line",
            vec![
                ToolPoint::at(0.0, 0.0, 5.0).feed(0.0),
                ToolPoint::at(0.0, 0.0, -1.0),
                ToolPoint::at(20.0, 0.0, -1.0),
            ],
        );
        tp.material_tool = Some(Arc::new(MaterialTool::default()));
        tp.material_form = Some(Arc::new(PlaneForm::horizontal(0.0, 5.0)));
        tp
    }

    #[test]
    fn test_write_tool_change_and_moves() {
        let machine = Machine::three_axis(MachineSettings::new("Mill"));
        let mut co = machine.new_code_info();
        machine.write_code(&mut co, &path()).unwrap();

        let lines: Vec<&str> = co.code().lines().collect();
        assert_eq!(
            lines,
            vec![
                "(Tool: Tool in Material)",
                "N00010 M05",
                "N00020 T1 M06",
                "N00030 G43 H1",
                "(Material form changed)",
                "(Line)",
                "N00040 M03 S1000",
                "N00050 G00 X0.000 Y0.000 Z5.000",
                "N00060 G01 X0.000 Y0.000 Z-1.000 F100",
                "N00070 G01 X20.000 Y0.000 Z-1.000",
            ]
        );
    }

    #[test]
    fn test_read_back() {
        let machine = Machine::three_axis(MachineSettings::new("Mill"));
        let mut co = machine.new_code_info();
        machine.write_code(&mut co, &path()).unwrap();

        let read = machine.read_code(co.code()).unwrap();
        let original = path();
        assert_eq!(read.points.len(), original.points.len());
        for (r, o) in read.points.iter().zip(original.points.iter()) {
            assert!(r.distance(o) < 1e-3);
        }
        assert_eq!(read.points[0].feed, 0.0);
        assert_eq!(read.points[2].feed, 100.0);
    }
}
