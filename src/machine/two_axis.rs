//! Two-axis cutters switched on and off, like lasers and plasma tables.

use crate::config::MachineSettings;
use crate::error::Result;
use crate::generator::{AxisWords, CodeInfo, GcodeWriter};
use crate::model::{ToolPath, ToolPoint};
use crate::parser::read_gcode;
use crate::transform::lead;

use super::Machine;

#[derive(Debug, Clone)]
pub struct TwoAxis {
    pub settings: MachineSettings,
    /// Code switching the cutter on.
    pub activate_command: String,
    /// Code switching the cutter off.
    pub deactivate_command: String,
}

impl TwoAxis {
    pub fn new(settings: MachineSettings) -> Self {
        Self {
            settings,
            activate_command: "M03".to_string(),
            deactivate_command: "M05".to_string(),
        }
    }

    /// Lead arcs only; the cutter is switched on at the first point and off
    /// at the last when the path asks for activation.
    pub(super) fn insert_retract(&self, tp: &ToolPath, machine: &Machine) -> Vec<ToolPath> {
        let activate = tp.additions.activate != 0;
        let mut paths = lead::insert_retract(tp, machine, false);
        if !activate {
            return paths;
        }

        if let Some(first) = paths.first_mut().and_then(|p| p.points.first_mut()) {
            first.pre_code = join_code(&self.activate_command, &first.pre_code);
        }
        if let Some(last) = paths.last_mut().and_then(|p| p.points.last_mut()) {
            last.post_code = join_code(&last.post_code, &self.deactivate_command);
        }
        paths
    }

    pub(super) fn write_code(&self, co: &mut CodeInfo, tp: &ToolPath) -> Result<()> {
        let words: Vec<AxisWords> = tp
            .points
            .iter()
            .map(|p| AxisWords::xy(p.pt.x, p.pt.y))
            .collect();
        GcodeWriter::new(co, false).write_path(tp, &tp.points, &words)
    }

    pub(super) fn read_code(&self, code: &str) -> Result<ToolPath> {
        let points = read_gcode(code, &self.settings.style)?
            .into_iter()
            .map(|m| ToolPoint::at(m.x, m.y, 0.0).feed(m.feed).speed(m.speed))
            .collect();
        Ok(ToolPath::with_points("Read", points))
    }
}

/// Join two code snippets on separate lines, skipping empty ones.
fn join_code(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ => format!("{}\n{}", first, second),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MaterialTool, PathLabel, PlaneForm, ToolPathAdditions};
    use std::sync::Arc;

    fn machine() -> Machine {
        Machine::two_axis(MachineSettings::new("Laser"))
    }

    fn square(activate: i32) -> ToolPath {
        let mut tp = ToolPath::with_points(
            "Square",
            vec![
                ToolPoint::at(0.0, 0.0, 0.0),
                ToolPoint::at(10.0, 0.0, 0.0),
                ToolPoint::at(10.0, 10.0, 0.0),
            ],
        );
        tp.material_tool = Some(Arc::new(MaterialTool::default()));
        tp.material_form = Some(Arc::new(PlaneForm::horizontal(0.0, 5.0)));
        tp.additions = ToolPathAdditions {
            activate,
            ..ToolPathAdditions::basic()
        };
        tp
    }

    #[test]
    fn test_activation_wraps_path() {
        let paths = machine().insert_retract(&square(1));
        let first = &paths[0].points[0];
        let last = paths.last().unwrap().points.last().unwrap();
        assert_eq!(first.pre_code, "M03");
        assert_eq!(last.post_code, "M05");
    }

    #[test]
    fn test_no_activation() {
        let paths = machine().insert_retract(&square(0));
        assert!(paths.iter().all(|p| p.label != PathLabel::Insert));
        assert!(paths[0].points[0].pre_code.is_empty());
    }

    #[test]
    fn test_writes_xy_only() {
        let mut co = machine().new_code_info();
        machine().write_code(&mut co, &square(0)).unwrap();
        assert!(co.code().contains("G01 X10.000 Y10.000\r\n"));
        assert!(!co.code().contains(" Z"));
        assert!(!co.code().contains("M06"));
    }

    #[test]
    fn test_read_back() {
        let mut co = machine().new_code_info();
        machine().write_code(&mut co, &square(0)).unwrap();
        let tp = machine().read_code(co.code()).unwrap();
        // The first point sits at the origin, where the reader starts.
        assert_eq!(tp.points.len(), 2);
        assert_eq!(tp.points[1].pt.y, 10.0);
        assert_eq!(tp.points[1].feed, 100.0);
    }
}
