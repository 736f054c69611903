//! Ordered tool points with the tool, material and transformations they use.

use nalgebra::Point3;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{MaterialForm, MaterialTool, ToolPathAdditions, ToolPoint};
use crate::config::float_cmp;
use crate::error::{CamError, Result};
use crate::machine::Machine;
use crate::transform::{height, lead, offset, step_down};

/// Role of a path produced by processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PathLabel {
    /// User path, not yet processed.
    #[default]
    None,
    /// Move from clearance into the material.
    Insert,
    /// Move from the material back to clearance.
    Retract,
    /// One step-down level of a roughing pass.
    RoughCut,
    /// Finishing pass, possibly lifted by an onion height.
    FinishCut,
    /// Rapid link between two paths.
    Transition,
}

/// The unit of geometric processing.
///
/// The material tool and form are optional until the path has been validated
/// against its predecessor; processing and writing fail without them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolPath {
    /// Tool points in cutting order.
    pub points: Vec<ToolPoint>,
    /// Tool and cutting parameters.
    pub material_tool: Option<Arc<MaterialTool>>,
    /// Material being cut.
    #[serde(skip)]
    pub material_form: Option<Arc<dyn MaterialForm>>,
    /// Transformations still to apply.
    pub additions: ToolPathAdditions,
    /// Path name, written as a comment.
    pub name: String,
    /// Literal code written before the path.
    pub pre_code: String,
    /// Literal code written after the path.
    pub post_code: String,
    /// Role assigned by processing.
    pub label: PathLabel,
}

/// Result of [`ToolPath::process_additions`].
///
/// Each inner list is one level; paths within a level already carry their
/// insert and retract moves.
#[derive(Debug, Clone, Default)]
pub struct ProcessedPath {
    /// Roughing paths grouped by step-down level, shallowest first.
    pub rough: Vec<Vec<ToolPath>>,
    /// Finishing paths grouped by onion height, highest first.
    pub finish: Vec<Vec<ToolPath>>,
}

impl ToolPath {
    /// Create an empty path with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a path from points, keeping everything else at defaults.
    pub fn with_points(name: impl Into<String>, points: Vec<ToolPoint>) -> Self {
        Self {
            points,
            ..Self::new(name)
        }
    }

    /// Copy of this path with different points and label; tool, form and code are kept.
    pub fn derived(&self, points: Vec<ToolPoint>, label: PathLabel) -> Self {
        Self {
            points,
            label,
            ..self.clone()
        }
    }

    /// Build a path from an ordered polyline.
    ///
    /// Points closer than the tool's `min_step` to the previous kept point
    /// are dropped (the final point always survives) and segments longer
    /// than `max_segment` are subdivided. A non-positive `max_segment`
    /// disables subdivision.
    pub fn from_polyline(
        name: impl Into<String>,
        polyline: &[Point3<f64>],
        material_tool: Option<Arc<MaterialTool>>,
        material_form: Option<Arc<dyn MaterialForm>>,
        additions: ToolPathAdditions,
        max_segment: f64,
    ) -> Self {
        let min_step = material_tool
            .as_ref()
            .map_or(0.0, |mt| mt.min_step.max(0.0));

        let mut kept: Vec<Point3<f64>> = Vec::with_capacity(polyline.len());
        for (i, p) in polyline.iter().enumerate() {
            let last = i + 1 == polyline.len();
            match kept.last() {
                Some(prev) if (p - prev).norm() < min_step => {
                    if last && kept.len() > 1 {
                        kept.pop();
                        kept.push(*p);
                    }
                }
                _ => kept.push(*p),
            }
        }

        let mut points = Vec::with_capacity(kept.len());
        for (i, p) in kept.iter().enumerate() {
            if i > 0 && max_segment > 0.0 {
                let prev = kept[i - 1];
                let pieces = ((p - prev).norm() / max_segment).ceil() as usize;
                for k in 1..pieces {
                    let t = k as f64 / pieces as f64;
                    points.push(ToolPoint::new(prev + (p - prev) * t));
                }
            }
            points.push(ToolPoint::new(*p));
        }

        Self {
            points,
            material_tool,
            material_form,
            additions,
            ..Self::new(name)
        }
    }

    /// First tool point.
    pub fn first_point(&self) -> Option<&ToolPoint> {
        self.points.first()
    }

    /// Last tool point.
    pub fn last_point(&self) -> Option<&ToolPoint> {
        self.points.last()
    }

    /// Whether the path returns to its start.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => self.points.len() > 2 && float_cmp::approx_zero(a.distance(b)),
            _ => false,
        }
    }

    /// Polyline length of the path.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    /// The material tool, or an error naming this path.
    pub fn require_tool(&self) -> Result<&Arc<MaterialTool>> {
        self.material_tool
            .as_ref()
            .ok_or_else(|| CamError::MaterialToolMissing {
                path: self.name.clone(),
            })
    }

    /// The material form, or an error naming this path.
    pub fn require_form(&self) -> Result<&Arc<dyn MaterialForm>> {
        self.material_form
            .as_ref()
            .ok_or_else(|| CamError::MaterialFormMissing {
                path: self.name.clone(),
            })
    }

    /// Fill in what this path leaves open from the path before it.
    ///
    /// A missing tool or form is taken from `prev`; replaceable additions are
    /// swapped for the machine's defaults.
    pub fn validate(&mut self, prev: &ToolPath, machine: &Machine) {
        if self.material_tool.is_none() {
            self.material_tool = prev.material_tool.clone();
        }
        if self.material_form.is_none() {
            self.material_form = prev.material_form.clone();
        }
        if self.additions.replaceable {
            self.additions = machine.settings().default_additions.clone();
            self.additions.replaceable = false;
        }
    }

    /// Copy of the path moved `height` along the machine's tool direction at each point.
    pub fn lifted(&self, height: f64, machine: &Machine) -> ToolPath {
        let points = self
            .points
            .iter()
            .map(|p| p.translated(&(machine.tool_dir(p) * height)))
            .collect();
        ToolPath {
            points,
            ..self.clone()
        }
    }

    /// Resolve every requested transformation.
    ///
    /// Applies, in order: planar offset, 3-axis height offset, step-down,
    /// finishing passes and insert/retract. Every returned path has
    /// [`ToolPathAdditions::none`].
    pub fn process_additions(&self, machine: &Machine) -> Result<ProcessedPath> {
        let mt = self.require_tool()?.clone();
        self.require_form()?;
        if self.points.is_empty() {
            return Err(CamError::EmptyPath {
                path: self.name.clone(),
            });
        }

        if self.additions.tabbing {
            warn!("Tabbing requested on '{}' is not supported, ignoring", self.name);
        }

        let mut bases = if self.additions.has_offset() {
            offset::offset_path(self)
        } else {
            vec![self.clone()]
        };
        if bases.len() > 1 {
            debug!("Offset of '{}' produced {} loops", self.name, bases.len());
        }

        if self.additions.three_axis_height_offset {
            bases = bases
                .iter()
                .map(|b| height::height_offset(b, &mt))
                .collect();
        }
        bases.retain(|b| !b.points.is_empty());

        let mut processed = ProcessedPath::default();

        if self.additions.step_down {
            for base in &bases {
                for (level, paths) in step_down::step_down(base, machine)?.into_iter().enumerate() {
                    if processed.rough.len() <= level {
                        processed.rough.push(Vec::new());
                    }
                    for path in paths {
                        processed.rough[level].extend(machine.insert_retract(&path));
                    }
                }
            }
        }

        for height in self.additions.sorted_onion() {
            let mut level = Vec::new();
            for base in &bases {
                let mut finish = base.lifted(height, machine);
                finish.label = PathLabel::FinishCut;
                finish.additions = ToolPathAdditions {
                    step_down: false,
                    onion: vec![0.0],
                    three_axis_height_offset: false,
                    tabbing: false,
                    offset: nalgebra::Vector3::zeros(),
                    ..finish.additions.clone()
                };
                level.extend(machine.insert_retract(&finish));
            }
            processed.finish.push(level);
        }

        for path in processed
            .rough
            .iter_mut()
            .chain(processed.finish.iter_mut())
            .flatten()
        {
            path.additions = ToolPathAdditions::none();
        }

        debug!(
            "Processed '{}': {} rough levels, {} finish levels",
            self.name,
            processed.rough.len(),
            processed.finish.len()
        );
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineSettings;
    use crate::model::PlaneForm;

    fn machine() -> Machine {
        Machine::three_axis(MachineSettings::new("Test"))
    }

    fn square(z: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(10.0, 0.0, z),
            Point3::new(10.0, 10.0, z),
            Point3::new(0.0, 10.0, z),
            Point3::new(0.0, 0.0, z),
        ]
    }

    fn ready(additions: ToolPathAdditions) -> ToolPath {
        ToolPath::from_polyline(
            "square",
            &square(-2.5),
            Some(Arc::new(MaterialTool::default())),
            Some(Arc::new(PlaneForm::horizontal(0.0, 5.0))),
            additions,
            0.0,
        )
    }

    // ==================== Construction tests ====================

    #[test]
    fn test_from_polyline_drops_short_steps() {
        let mt = MaterialTool {
            min_step: 0.5,
            ..Default::default()
        };
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(5.2, 0.0, 0.0),
        ];
        let tp = ToolPath::from_polyline("p", &pts, Some(Arc::new(mt)), None, ToolPathAdditions::none(), 0.0);
        assert_eq!(tp.points.len(), 2);
        assert_eq!(tp.points[1].pt, Point3::new(5.2, 0.0, 0.0));
    }

    #[test]
    fn test_from_polyline_subdivides() {
        let pts = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        let tp = ToolPath::from_polyline("p", &pts, None, None, ToolPathAdditions::none(), 2.5);
        assert_eq!(tp.points.len(), 5);
        assert!((tp.points[1].pt.x - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_is_closed() {
        let tp = ToolPath::from_polyline("sq", &square(0.0), None, None, ToolPathAdditions::none(), 0.0);
        assert!(tp.is_closed());
        let open = ToolPath::with_points("line", vec![ToolPoint::at(0.0, 0.0, 0.0), ToolPoint::at(0.0, 0.0, 0.0)]);
        assert!(!open.is_closed());
    }

    // ==================== Validation tests ====================

    #[test]
    fn test_validate_copies_from_previous() {
        let prev = ready(ToolPathAdditions::none());
        let mut tp = ToolPath::from_polyline("next", &square(0.0), None, None, ToolPathAdditions::replaceable(), 0.0);
        tp.validate(&prev, &machine());
        assert!(tp.material_tool.is_some());
        assert!(tp.material_form.is_some());
        assert!(!tp.additions.replaceable);
        assert_eq!(tp.additions, {
            let mut a = machine().settings().default_additions.clone();
            a.replaceable = false;
            a
        });
    }

    #[test]
    fn test_process_requires_tool_and_form() {
        let tp = ToolPath::from_polyline("bare", &square(0.0), None, None, ToolPathAdditions::none(), 0.0);
        assert!(matches!(
            tp.process_additions(&machine()),
            Err(CamError::MaterialToolMissing { .. })
        ));

        let mut empty = ready(ToolPathAdditions::none());
        empty.points.clear();
        assert!(matches!(
            empty.process_additions(&machine()),
            Err(CamError::EmptyPath { .. })
        ));
    }

    // ==================== Processing tests ====================

    #[test]
    fn test_plain_path_gives_one_finish_pass() {
        let processed = ready(ToolPathAdditions::none())
            .process_additions(&machine())
            .unwrap();
        assert!(processed.rough.is_empty());
        assert_eq!(processed.finish.len(), 1);
        assert_eq!(processed.finish[0].len(), 1);
        assert_eq!(processed.finish[0][0].label, PathLabel::FinishCut);
    }

    #[test]
    fn test_onion_levels_sorted_and_lifted() {
        let additions = ToolPathAdditions {
            onion: vec![0.0, 1.0],
            ..ToolPathAdditions::none()
        };
        let processed = ready(additions).process_additions(&machine()).unwrap();
        assert_eq!(processed.finish.len(), 2);
        let high = &processed.finish[0][0];
        let low = &processed.finish[1][0];
        assert!((high.points[0].pt.z - (-1.5)).abs() < 1e-9);
        assert!((low.points[0].pt.z - (-2.5)).abs() < 1e-9);
    }

    #[test]
    fn test_step_down_levels_and_resolved_additions() {
        let processed = ready(ToolPathAdditions::basic())
            .process_additions(&machine())
            .unwrap();
        // 2.5 deep with 1.0 cut depth
        assert_eq!(processed.rough.len(), 3);
        for path in processed.rough.iter().chain(processed.finish.iter()).flatten() {
            assert!(!path.additions.any());
        }
        let labels: Vec<PathLabel> = processed.rough[0].iter().map(|p| p.label).collect();
        assert_eq!(labels.first(), Some(&PathLabel::Insert));
        assert!(labels.contains(&PathLabel::RoughCut));
        assert_eq!(labels.last(), Some(&PathLabel::Retract));
    }
}
