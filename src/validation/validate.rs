//! Checks run on an instruction before processing.

use crate::config::float_cmp;
use crate::error::{CamError, Result};
use crate::machine::Machine;
use crate::model::{MachineInstruction, ToolPath};

/// Validation result with warnings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Whether validation passed.
    pub passed: bool,
    /// Warning messages.
    pub warnings: Vec<String>,
    /// Error messages.
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// Create a passing result.
    pub fn ok() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    /// Create a failing result with an error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            errors: vec![message.into()],
            ..Default::default()
        }
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.passed = false;
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
        if !other.passed {
            self.passed = false;
        }
    }
}

/// Validate every path of an instruction.
///
/// An instruction without operations is an error in itself; everything
/// else is collected into the result.
pub fn validate_instruction(mi: &MachineInstruction) -> Result<ValidationResult> {
    if mi.operations.is_empty() {
        return Err(CamError::InvalidJob {
            message: format!("instruction '{}' has no operations", mi.name),
        });
    }

    let mut result = ValidationResult::ok();
    if mi.all_paths().all(|p| p.material_tool.is_none()) && mi.machine.settings().sole_tool().is_none() {
        result.add_error(format!(
            "No material tool in any path and {} tools configured on the machine",
            mi.machine.settings().tools.len()
        ));
    }
    if mi.all_paths().all(|p| p.material_form.is_none()) {
        result.add_error("No material form in any path");
    }

    for (op_idx, op) in mi.operations.iter().enumerate() {
        if op.paths.is_empty() {
            result.add_warning(format!("Operation {}: No paths", op_idx + 1));
        }
        for (path_idx, path) in op.paths.iter().enumerate() {
            let label = format!("Operation {}, Path {}", op_idx + 1, path_idx + 1);
            result.merge(validate_path(path, &mi.machine, &label));
        }
    }

    Ok(result)
}

/// Validate a single path; `label` prefixes every message.
pub fn validate_path(path: &ToolPath, machine: &Machine, label: &str) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let additions = &path.additions;

    if path.points.is_empty() {
        result.add_warning(format!("{}: No points", label));
        return result;
    }

    for (i, p) in path.points.iter().enumerate() {
        if !p.pt.coords.iter().all(|v| v.is_finite()) {
            result.add_error(format!("{}: Point {} is not finite", label, i + 1));
        }
        if p.dir.norm() < 0.5 {
            result.add_error(format!("{}: Point {} has no tool direction", label, i + 1));
        }
    }

    if let Some(mt) = path.material_tool.as_deref() {
        if additions.step_down && mt.cut_depth <= 0.0 {
            result.add_error(format!("{}: Step down needs a positive cut depth", label));
        }
        if (additions.has_offset() || additions.three_axis_height_offset) && mt.tool_width <= 0.0 {
            result.add_error(format!("{}: Offsets need a positive tool width", label));
        }
        if mt.feed_cut <= 0.0 {
            result.add_warning(format!("{}: Tool '{}' has no cutting feed", label, mt.tool_name));
        }
    }

    if additions.onion.iter().any(|h| *h < 0.0) {
        result.add_error(format!("{}: Onion heights must not be negative", label));
    }
    if additions.tabbing {
        result.add_warning(format!("{}: Tabbing is not supported and will be ignored", label));
    }
    if additions.lead_curvature > 0.0 && !path.is_closed() {
        result.add_warning(format!("{}: Lead arcs are only added to closed paths", label));
    }

    match machine {
        Machine::TwoAxis(_) => {
            if path.points.iter().any(|p| !float_cmp::approx_zero(p.pt.z)) {
                result.add_warning(format!("{}: Z values are ignored on a two-axis machine", label));
            }
        }
        Machine::ThreeAxis(_) => {
            if path.points.iter().any(|p| (p.dir - nalgebra::Vector3::z()).norm() > crate::config::EPS) {
                result.add_warning(format!("{}: Tilted tool directions are ignored on a three-axis machine", label));
            }
        }
        Machine::PocketNc(_) | Machine::Omax5(_) => {}
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineSettings;
    use crate::model::{MachineOperation, MaterialTool, PlaneForm, ToolPathAdditions, ToolPoint};
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn machine() -> Arc<Machine> {
        Arc::new(Machine::three_axis(MachineSettings::new("Mill")))
    }

    fn path(additions: ToolPathAdditions) -> ToolPath {
        let mut tp = ToolPath::with_points(
            "P",
            vec![ToolPoint::at(0.0, 0.0, -1.0), ToolPoint::at(5.0, 0.0, -1.0)],
        );
        tp.material_tool = Some(Arc::new(MaterialTool::default()));
        tp.material_form = Some(Arc::new(PlaneForm::horizontal(0.0, 5.0)));
        tp.additions = additions;
        tp
    }

    #[test]
    fn test_valid_instruction() {
        let mi = MachineInstruction::new("Job", machine())
            .with_operation(MachineOperation::new("Op", vec![path(ToolPathAdditions::basic())]));
        let result = validate_instruction(&mi).unwrap();
        assert!(result.passed, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_instruction_is_fatal() {
        let mi = MachineInstruction::new("Job", machine());
        assert!(matches!(validate_instruction(&mi), Err(CamError::InvalidJob { .. })));
    }

    #[test]
    fn test_missing_tool_reported() {
        let mut tp = path(ToolPathAdditions::none());
        tp.material_tool = None;
        let mi = MachineInstruction::new("Job", machine()).with_operation(MachineOperation::new("Op", vec![tp]));
        let result = validate_instruction(&mi).unwrap();
        assert!(!result.passed);
        assert!(result.errors[0].contains("No material tool"));
    }

    #[test]
    fn test_tabbing_and_negative_onion() {
        let additions = ToolPathAdditions {
            tabbing: true,
            onion: vec![-1.0],
            ..ToolPathAdditions::none()
        };
        let result = validate_path(&path(additions), &machine(), "P");
        assert!(!result.passed);
        assert!(result.warnings.iter().any(|w| w.contains("Tabbing")));
    }

    #[test]
    fn test_tilted_direction_on_three_axis() {
        let mut tp = path(ToolPathAdditions::none());
        tp.points[0].dir = Vector3::new(1.0, 0.0, 1.0).normalize();
        let result = validate_path(&tp, &machine(), "P");
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_merge() {
        let mut result = ValidationResult::ok();
        result.merge(ValidationResult::error("bad"));
        assert!(!result.passed);
        assert_eq!(result.errors, vec!["bad".to_string()]);
    }
}
