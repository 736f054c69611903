//! Top-level unit sent to a machine.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{MachineOperation, PathLabel, ToolPath, ToolPathAdditions, ToolPoint};
use crate::error::{CamError, Result};
use crate::generator::CodeInfo;
use crate::machine::Machine;

/// Operations for one machine, with approach and retreat paths.
#[derive(Debug, Clone, Serialize)]
pub struct MachineInstruction {
    /// Operations in cutting order.
    pub operations: Vec<MachineOperation>,
    /// Approach path, synthesized during processing when empty.
    pub start_path: ToolPath,
    /// Retreat path, synthesized during processing when empty.
    pub end_path: ToolPath,
    /// Instruction name, written into the file header.
    pub name: String,
    /// Literal code written after the file header.
    pub pre_code: String,
    /// Literal code written before the file footer.
    pub post_code: String,
    /// Machine the code is written for.
    #[serde(skip)]
    pub machine: Arc<Machine>,
}

impl MachineInstruction {
    pub fn new(name: impl Into<String>, machine: Arc<Machine>) -> Self {
        Self {
            operations: Vec::new(),
            start_path: ToolPath::new("Start"),
            end_path: ToolPath::new("End"),
            name: name.into(),
            pre_code: String::new(),
            post_code: String::new(),
            machine,
        }
    }

    /// Add an operation, returning the instruction.
    pub fn with_operation(mut self, op: MachineOperation) -> Self {
        self.operations.push(op);
        self
    }

    /// First point of the first operation that has one.
    pub fn first_point(&self) -> Option<&ToolPoint> {
        self.operations.iter().find_map(|op| op.first_point())
    }

    /// Last point of the last operation that has one.
    pub fn last_point(&self) -> Option<&ToolPoint> {
        self.operations.iter().rev().find_map(|op| op.last_point())
    }

    /// Every path in writing order, including start and end.
    pub fn all_paths(&self) -> impl Iterator<Item = &ToolPath> {
        std::iter::once(&self.start_path)
            .chain(self.operations.iter().flat_map(|op| op.paths.iter()))
            .chain(std::iter::once(&self.end_path))
    }

    /// Build the path every other path is validated against.
    ///
    /// Takes the first tool and form found in any path, falling back to the
    /// machine's only configured tool.
    fn seed_path(&self) -> Result<ToolPath> {
        let tool = self
            .all_paths()
            .find_map(|p| p.material_tool.clone())
            .or_else(|| self.machine.settings().sole_tool().cloned().map(Arc::new))
            .ok_or(CamError::NoMaterialTool {
                configured: self.machine.settings().tools.len(),
            })?;
        let form = self
            .all_paths()
            .find_map(|p| p.material_form.clone())
            .ok_or(CamError::NoMaterialForm)?;

        Ok(ToolPath {
            material_tool: Some(tool),
            material_form: Some(form),
            ..ToolPath::new("Seed")
        })
    }

    /// A rapid point at safe distance above `point`, along the tool direction.
    fn clearance_point(&self, point: &ToolPoint, seed: &ToolPath) -> Result<ToolPoint> {
        let form = seed.require_form()?;
        let dir = self.machine.tool_dir(point);
        let exit = form.intersect_ray(&point.pt, &dir, form.safe_distance());
        let mut lifted = point.moved_to(exit.hit_point).feed(0.0);
        lifted.name.clear();
        lifted.pre_code.clear();
        lifted.post_code.clear();
        Ok(lifted)
    }

    /// Validate and resolve the additions of every path.
    ///
    /// Afterwards the start and end paths hold exactly the approach and
    /// retreat points and every path has [`ToolPathAdditions::none`].
    pub fn process_additions(&mut self) -> Result<()> {
        let machine = self.machine.clone();
        let seed = self.seed_path()?;

        let mut start = self.start_path.clone();
        start.validate(&seed, &machine);
        start.additions = ToolPathAdditions::none();
        if start.points.is_empty() {
            if let Some(first) = self.first_point() {
                start.points.push(self.clearance_point(first, &seed)?);
            }
        }
        start.label = PathLabel::Transition;

        let mut prev = start.clone();
        for op in &mut self.operations {
            op.process_additions(&machine, &mut prev)?;
        }

        let mut end = self.end_path.clone();
        end.validate(&prev, &machine);
        end.additions = ToolPathAdditions::none();
        if end.points.is_empty() {
            if let Some(last) = self.last_point() {
                end.points.push(self.clearance_point(last, &seed)?);
            }
        }
        if let Some(first_end) = end.points.first().cloned() {
            if !prev.points.is_empty() {
                let target = end.derived(vec![first_end], PathLabel::Transition);
                let mut route = machine.transition(&prev, &target, true)?;
                if !route.points.is_empty() {
                    route.points.remove(0);
                }
                route.points.extend(end.points);
                end.points = route.points;
            }
        }
        end.label = PathLabel::Transition;

        self.start_path = start;
        self.end_path = end;

        info!(
            "Processed instruction '{}': {} operations, {} paths",
            self.name,
            self.operations.len(),
            self.operations.iter().map(|op| op.paths.len()).sum::<usize>()
        );
        Ok(())
    }

    /// Write the whole instruction.
    ///
    /// Fails when a path still has unresolved additions. Errors found while
    /// writing are collected in the returned [`CodeInfo`], not raised.
    pub fn write_code(&self) -> Result<CodeInfo> {
        if let Some(path) = self.all_paths().find(|p| p.additions.any()) {
            return Err(CamError::UnresolvedAdditions {
                path: path.name.clone(),
            });
        }

        let machine = &self.machine;
        let mut co = machine.new_code_info();
        machine.write_file_start(&mut co, self)?;
        let mut before = None;
        if !self.start_path.points.is_empty() {
            machine.write_code(&mut co, &self.start_path)?;
            before = Some(&self.start_path);
        }
        for op in &self.operations {
            before = op.write_code(&mut co, machine, before)?;
        }
        if !self.end_path.points.is_empty() {
            if let Some(prev) = before {
                machine.write_transition(&mut co, prev, &self.end_path)?;
            }
            machine.write_code(&mut co, &self.end_path)?;
        }
        machine.write_file_end(&mut co, self);

        debug!("Wrote {} lines for '{}'", co.line_count(), self.name);
        Ok(co)
    }

    /// Parse code written for `machine` back into an instruction.
    ///
    /// All points land in a single path of a single operation.
    pub fn read_code(machine: Arc<Machine>, code: &str) -> Result<Self> {
        let path = machine.read_code(code)?;
        let op = MachineOperation::new("Read", vec![path]);
        Ok(Self::new("Read", machine).with_operation(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineSettings;
    use crate::machine::transition::LONG_JUMP;
    use crate::model::{MaterialTool, PlaneForm};
    use nalgebra::Point3;

    fn instruction(with_tool: bool) -> MachineInstruction {
        let machine = Arc::new(Machine::three_axis(MachineSettings::new("Test")));
        let path = ToolPath::from_polyline(
            "slot",
            &[Point3::new(0.0, 0.0, -1.0), Point3::new(10.0, 0.0, -1.0)],
            with_tool.then(|| Arc::new(MaterialTool::default())),
            Some(Arc::new(PlaneForm::horizontal(0.0, 5.0))),
            ToolPathAdditions::replaceable(),
            0.0,
        );
        MachineInstruction::new("job", machine).with_operation(MachineOperation::new("op", vec![path]))
    }

    #[test]
    fn test_missing_tool_is_fatal() {
        let mut mi = instruction(false);
        assert!(matches!(
            mi.process_additions(),
            Err(CamError::NoMaterialTool { configured: 0 })
        ));
    }

    #[test]
    fn test_sole_machine_tool_is_used() {
        let mut settings = MachineSettings::new("Test");
        settings.tools.push(MaterialTool::default());
        let mut mi = instruction(false);
        mi.machine = Arc::new(Machine::three_axis(settings));
        mi.process_additions().unwrap();
        assert!(mi.all_paths().all(|p| p.material_tool.is_some()));
    }

    #[test]
    fn test_start_and_end_synthesized_at_safe_height() {
        let mut mi = instruction(true);
        mi.process_additions().unwrap();
        let start = mi.start_path.points.first().unwrap();
        assert_eq!(start.pt, Point3::new(0.0, 0.0, 5.0));
        assert!(start.is_rapid());
        let end = mi.end_path.points.last().unwrap();
        assert_eq!(end.pt, Point3::new(10.0, 0.0, 5.0));
    }

    #[test]
    fn test_write_rejects_unprocessed() {
        let mi = instruction(true);
        assert!(matches!(
            mi.write_code(),
            Err(CamError::UnresolvedAdditions { .. })
        ));
    }

    #[test]
    fn test_write_after_processing() {
        let mut mi = instruction(true);
        mi.process_additions().unwrap();
        let co = mi.write_code().unwrap();
        assert!(!co.has_errors(&[]));
        assert!(co.code().contains("M30"));
    }

    #[test]
    fn test_jump_between_operations_is_checked() {
        let machine = Arc::new(Machine::three_axis(MachineSettings::new("Test")));
        let cut = |name: &str, x: f64| {
            ToolPath::from_polyline(
                name,
                &[Point3::new(x, 0.0, -1.0), Point3::new(x + 1.0, 0.0, -1.0)],
                Some(Arc::new(MaterialTool::default())),
                Some(Arc::new(PlaneForm::horizontal(0.0, 5.0))),
                ToolPathAdditions::none(),
                0.0,
            )
        };
        let mut mi = MachineInstruction::new("job", machine)
            .with_operation(MachineOperation::new("first", vec![cut("a", 0.0)]))
            .with_operation(MachineOperation::new("second", vec![cut("b", 30.0)]));
        mi.process_additions().unwrap();
        let co = mi.write_code().unwrap();

        let lines = co.errors().get(LONG_JUMP).expect("long jump reported");
        assert_eq!(lines.len(), 1);
        assert!(co.has_errors(&[]));
    }
}
