//! One coherent cutting operation made of several toolpaths.

use serde::Serialize;
use tracing::debug;

use super::{PathLabel, ToolPath, ToolPoint};
use crate::error::Result;
use crate::generator::CodeInfo;
use crate::machine::Machine;

/// Ordered toolpaths cut as one operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MachineOperation {
    /// Toolpaths in cutting order.
    pub paths: Vec<ToolPath>,
    /// Operation name, written as a comment.
    pub name: String,
    /// Literal code written before the operation.
    pub pre_code: String,
    /// Literal code written after the operation.
    pub post_code: String,
}

impl MachineOperation {
    pub fn new(name: impl Into<String>, paths: Vec<ToolPath>) -> Self {
        Self {
            paths,
            name: name.into(),
            ..Default::default()
        }
    }

    /// First point of the first non-empty path.
    pub fn first_point(&self) -> Option<&ToolPoint> {
        self.paths.iter().find_map(|p| p.first_point())
    }

    /// Last point of the last non-empty path.
    pub fn last_point(&self) -> Option<&ToolPoint> {
        self.paths.iter().rev().find_map(|p| p.last_point())
    }

    /// Whether any path still requests a transformation.
    pub fn has_unresolved_additions(&self) -> Option<&ToolPath> {
        self.paths.iter().find(|p| p.additions.any())
    }

    /// Resolve the additions of every path and link the results.
    ///
    /// All paths finish step-down level `n` before any starts level `n + 1`,
    /// then finishing levels follow in the same order. Non-contiguous
    /// neighbours are joined by machine transitions. `prev` is the last
    /// validated path before this operation and is updated to this
    /// operation's last path.
    pub fn process_additions(&mut self, machine: &Machine, prev: &mut ToolPath) -> Result<()> {
        let mut rough: Vec<Vec<ToolPath>> = Vec::new();
        let mut finish: Vec<Vec<ToolPath>> = Vec::new();

        let mut last = prev.clone();
        for path in &self.paths {
            let mut path = path.clone();
            path.validate(&last, machine);
            last = path.clone();

            let processed = path.process_additions(machine)?;
            merge_levels(&mut rough, processed.rough);
            merge_levels(&mut finish, processed.finish);
        }

        let sequence: Vec<ToolPath> = rough.into_iter().chain(finish).flatten().collect();
        let mut linked: Vec<ToolPath> = Vec::with_capacity(sequence.len() * 2);

        if let (Some(first), false) = (sequence.first(), prev.points.is_empty()) {
            // Only the instruction start reaches here labelled as a transition.
            let from_start = prev.label == PathLabel::Transition;
            let mut lead = machine.transition(prev, first, from_start)?;
            if !lead.points.is_empty() {
                lead.points.remove(0);
            }
            if !lead.points.is_empty() {
                linked.push(lead);
            }
        }

        for path in sequence {
            if let Some(before) = linked.last_mut() {
                if needs_transition(before, &path) {
                    let transition = machine.transition(before, &path, false)?;
                    before.points.pop();
                    if before.points.is_empty() {
                        linked.pop();
                    }
                    linked.push(transition);
                }
            }
            linked.push(path);
        }

        debug!("Operation '{}' linked into {} paths", self.name, linked.len());

        if let Some(tail) = linked.iter().rev().find(|p| !p.points.is_empty()) {
            *prev = tail.clone();
        } else {
            *prev = last;
        }
        self.paths = linked;
        Ok(())
    }

    /// Write every path, checking jumps between neighbours.
    ///
    /// `before` is the last path written ahead of this operation, so the
    /// move into the first path is checked too. Returns the last path
    /// written, or `before` when the operation is empty.
    pub fn write_code<'a>(
        &'a self,
        co: &mut CodeInfo,
        machine: &Machine,
        mut before: Option<&'a ToolPath>,
    ) -> Result<Option<&'a ToolPath>> {
        machine.write_op_start(co, self);
        for path in self.paths.iter().filter(|p| !p.points.is_empty()) {
            if let Some(prev) = before {
                machine.write_transition(co, prev, path)?;
            }
            machine.write_code(co, path)?;
            before = Some(path);
        }
        machine.write_op_end(co, self);
        Ok(before)
    }
}

/// Whether moving from `before` to `after` needs a linking transition.
fn needs_transition(before: &ToolPath, after: &ToolPath) -> bool {
    !(before.label == PathLabel::Insert
        || before.label == PathLabel::Transition
        || after.label == PathLabel::Retract)
}

fn merge_levels(into: &mut Vec<Vec<ToolPath>>, levels: Vec<Vec<ToolPath>>) {
    for (i, level) in levels.into_iter().enumerate() {
        if into.len() <= i {
            into.push(Vec::new());
        }
        into[i].extend(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineSettings;
    use crate::model::{MaterialTool, PlaneForm, ToolPathAdditions};
    use nalgebra::Point3;
    use std::sync::Arc;

    fn line(name: &str, x: f64, depth: f64, additions: ToolPathAdditions) -> ToolPath {
        ToolPath::from_polyline(
            name,
            &[Point3::new(x, 0.0, -depth), Point3::new(x, 20.0, -depth)],
            Some(Arc::new(MaterialTool::default())),
            Some(Arc::new(PlaneForm::horizontal(0.0, 5.0))),
            additions,
            0.0,
        )
    }

    #[test]
    fn test_first_point_is_first() {
        let op = MachineOperation::new(
            "op",
            vec![
                ToolPath::new("empty"),
                line("a", 1.0, 1.0, ToolPathAdditions::none()),
                line("b", 2.0, 1.0, ToolPathAdditions::none()),
            ],
        );
        assert_eq!(op.first_point().map(|p| p.pt.x), Some(1.0));
        assert_eq!(op.last_point().map(|p| p.pt.x), Some(2.0));
    }

    #[test]
    fn test_levels_grouped_across_paths() {
        let machine = Machine::three_axis(MachineSettings::new("Test"));
        let mut op = MachineOperation::new(
            "pocket",
            vec![
                line("a", 0.0, 2.0, ToolPathAdditions::basic()),
                line("b", 50.0, 2.0, ToolPathAdditions::basic()),
            ],
        );
        let mut prev = ToolPath::new("start");
        op.process_additions(&machine, &mut prev).unwrap();

        let cut_xs: Vec<(f64, f64)> = op
            .paths
            .iter()
            .filter(|p| p.label == PathLabel::RoughCut)
            .map(|p| (p.points[0].pt.x, p.points[0].pt.z))
            .collect();
        // Both paths at level 0 before either at level 1.
        assert_eq!(cut_xs.len(), 4);
        assert!((cut_xs[0].1 - (-1.0)).abs() < 1e-9);
        assert!((cut_xs[1].1 - (-1.0)).abs() < 1e-9);
        assert!((cut_xs[2].1 - (-2.0)).abs() < 1e-9);
        assert!(cut_xs[0].0 < cut_xs[1].0);

        assert!(op.paths.iter().all(|p| !p.additions.any()));
        assert!(op.paths.iter().any(|p| p.label == PathLabel::Transition));
        assert_eq!(prev.label, PathLabel::Retract);
    }

    #[test]
    fn test_transition_between_adjacent_cuts() {
        let machine = Machine::three_axis(MachineSettings::new("Test"));
        let mut op = MachineOperation::new(
            "plain",
            vec![
                line("a", 0.0, 1.0, ToolPathAdditions::none()),
                line("b", 1.0, 1.0, ToolPathAdditions::none()),
            ],
        );
        let mut prev = ToolPath::new("start");
        op.process_additions(&machine, &mut prev).unwrap();

        let labels: Vec<PathLabel> = op.paths.iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec![PathLabel::FinishCut, PathLabel::Transition, PathLabel::FinishCut]
        );
        // The transition starts where the first path used to end.
        assert_eq!(op.paths[0].points.len(), 1);
        assert_eq!(op.paths[1].points[0].pt, Point3::new(0.0, 20.0, -1.0));
    }
}
