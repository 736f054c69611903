//! JSON job descriptions: a machine, its tools, the material and the paths to cut.
//!
//! ```json
//! {
//!   "name": "Pocket",
//!   "machine": { "kind": "three_axis", "settings": { "name": "Mill" } },
//!   "tools": [{ "tool_name": "3mm ball", "cut_depth": 1.0 }],
//!   "form": { "kind": "plane", "height": 0.0, "safe_distance": 5.0 },
//!   "operations": [
//!     { "name": "Slot", "paths": [{ "points": [[0, 0, -2], [20, 0, -2]] }] }
//!   ]
//! }
//! ```

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::MachineSettings;
use crate::error::{CamError, Result};
use crate::machine::{Machine, PocketNcVersion};
use crate::model::{
    BoxForm, MachineInstruction, MachineOperation, MaterialForm, MaterialTool, PlaneForm, ToolPath,
    ToolPathAdditions,
};
use crate::transform::{project_path, Mesh};

/// Machine kind with its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MachineSpec {
    TwoAxis {
        #[serde(default)]
        settings: MachineSettings,
        #[serde(default)]
        activate_command: Option<String>,
        #[serde(default)]
        deactivate_command: Option<String>,
    },
    ThreeAxis {
        #[serde(default)]
        settings: MachineSettings,
    },
    PocketNc {
        #[serde(default)]
        settings: MachineSettings,
        #[serde(default)]
        version: PocketNcVersion,
        #[serde(default)]
        pivot: Option<Vector3<f64>>,
        #[serde(default)]
        double_stance: bool,
        /// B axis travel, degrees.
        #[serde(default)]
        b_limits: Option<(f64, f64)>,
    },
    Omax5 {
        #[serde(default)]
        settings: MachineSettings,
        /// Largest head tilt, degrees.
        #[serde(default)]
        tilt_max: Option<f64>,
    },
}

impl MachineSpec {
    /// Build the machine; `tools` fill in when the settings list none.
    pub fn build(&self, tools: &[MaterialTool]) -> Machine {
        let with_tools = |settings: &MachineSettings| {
            let mut settings = settings.clone();
            if settings.tools.is_empty() {
                settings.tools = tools.to_vec();
            }
            settings
        };

        match self {
            MachineSpec::TwoAxis {
                settings,
                activate_command,
                deactivate_command,
            } => {
                let mut machine = crate::machine::TwoAxis::new(with_tools(settings));
                if let Some(cmd) = activate_command {
                    machine.activate_command = cmd.clone();
                }
                if let Some(cmd) = deactivate_command {
                    machine.deactivate_command = cmd.clone();
                }
                Machine::TwoAxis(machine)
            }
            MachineSpec::ThreeAxis { settings } => Machine::three_axis(with_tools(settings)),
            MachineSpec::PocketNc {
                settings,
                version,
                pivot,
                double_stance,
                b_limits,
            } => {
                let mut machine = crate::machine::PocketNc::new(with_tools(settings), *version);
                if let Some(pivot) = pivot {
                    machine.pivot = *pivot;
                }
                if let Some(limits) = b_limits {
                    machine.b_limits = *limits;
                }
                machine.double_stance = *double_stance;
                Machine::PocketNc(machine)
            }
            MachineSpec::Omax5 { settings, tilt_max } => {
                let mut machine = crate::machine::Omax5::new(with_tools(settings));
                if let Some(tilt) = tilt_max {
                    machine.tilt_max = *tilt;
                }
                Machine::Omax5(machine)
            }
        }
    }
}

/// Material block description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormSpec {
    /// Material below a horizontal plane.
    Plane { height: f64, safe_distance: f64 },
    /// Axis-aligned block.
    Box {
        min: Point3<f64>,
        max: Point3<f64>,
        safe_distance: f64,
    },
}

impl FormSpec {
    pub fn build(&self) -> Arc<dyn MaterialForm> {
        match self {
            FormSpec::Plane { height, safe_distance } => Arc::new(PlaneForm::horizontal(*height, *safe_distance)),
            FormSpec::Box {
                min,
                max,
                safe_distance,
            } => Arc::new(BoxForm::new(*min, *max, *safe_distance)),
        }
    }
}

fn default_additions() -> ToolPathAdditions {
    ToolPathAdditions::replaceable()
}

fn default_projection() -> Vector3<f64> {
    -Vector3::z()
}

/// One polyline to cut.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSpec {
    #[serde(default)]
    pub name: String,
    pub points: Vec<Point3<f64>>,
    /// Tool direction per point; vertical when absent.
    #[serde(default)]
    pub dirs: Option<Vec<Vector3<f64>>>,
    /// Index into the job's tools.
    #[serde(default)]
    pub tool: usize,
    /// Feed for every point; the tool's cutting feed when absent.
    #[serde(default)]
    pub feed: Option<f64>,
    /// Speed for every point; the tool's speed when absent.
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default = "default_additions")]
    pub additions: ToolPathAdditions,
    /// Subdivide longer segments; zero keeps them.
    #[serde(default)]
    pub max_segment: f64,
    /// Drop the points onto the job's mesh before processing.
    #[serde(default)]
    pub project: bool,
    #[serde(default = "default_projection")]
    pub project_direction: Vector3<f64>,
    #[serde(default)]
    pub pre_code: String,
    #[serde(default)]
    pub post_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    #[serde(default)]
    pub name: String,
    pub paths: Vec<PathSpec>,
    #[serde(default)]
    pub pre_code: String,
    #[serde(default)]
    pub post_code: String,
}

/// A whole job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub name: String,
    pub machine: MachineSpec,
    #[serde(default)]
    pub tools: Vec<MaterialTool>,
    pub form: FormSpec,
    /// Surface for projected paths.
    #[serde(default)]
    pub mesh: Option<Mesh>,
    pub operations: Vec<OperationSpec>,
    #[serde(default)]
    pub pre_code: String,
    #[serde(default)]
    pub post_code: String,
}

impl Job {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Build the instruction this job describes, ready for processing.
    pub fn into_instruction(self) -> Result<MachineInstruction> {
        let machine = Arc::new(self.machine.build(&self.tools));
        let tools: Vec<Arc<MaterialTool>> = self.tools.iter().cloned().map(Arc::new).collect();
        let form = self.form.build();

        let mut mi = MachineInstruction::new(self.name.clone(), machine);
        mi.pre_code = self.pre_code.clone();
        mi.post_code = self.post_code.clone();

        for op in &self.operations {
            let mut paths = Vec::with_capacity(op.paths.len());
            for (i, spec) in op.paths.iter().enumerate() {
                paths.push(self.build_path(spec, i, &tools, &form)?);
            }
            let mut operation = MachineOperation::new(op.name.clone(), paths);
            operation.pre_code = op.pre_code.clone();
            operation.post_code = op.post_code.clone();
            mi.operations.push(operation);
        }

        debug!(
            "Job '{}' built with {} operations on {}",
            self.name,
            mi.operations.len(),
            mi.machine.name()
        );
        Ok(mi)
    }

    fn build_path(
        &self,
        spec: &PathSpec,
        index: usize,
        tools: &[Arc<MaterialTool>],
        form: &Arc<dyn MaterialForm>,
    ) -> Result<ToolPath> {
        let name = if spec.name.is_empty() {
            format!("Path {}", index + 1)
        } else {
            spec.name.clone()
        };
        // Paths without tools inherit during validation; an index past the
        // list is a mistake.
        let tool = match tools.get(spec.tool) {
            Some(tool) => Some(tool.clone()),
            None if tools.is_empty() => None,
            None => {
                return Err(CamError::InvalidJob {
                    message: format!("path '{}' uses tool {} but only {} defined", name, spec.tool, tools.len()),
                })
            }
        };

        let mut tp = match &spec.dirs {
            Some(dirs) => {
                if dirs.len() != spec.points.len() {
                    return Err(CamError::InvalidJob {
                        message: format!(
                            "path '{}' has {} points but {} directions",
                            name,
                            spec.points.len(),
                            dirs.len()
                        ),
                    });
                }
                let points = spec
                    .points
                    .iter()
                    .zip(dirs)
                    .map(|(p, d)| crate::model::ToolPoint::with_dir(*p, *d))
                    .collect();
                ToolPath {
                    material_tool: tool,
                    material_form: Some(form.clone()),
                    additions: spec.additions.clone(),
                    ..ToolPath::with_points(name, points)
                }
            }
            None => ToolPath::from_polyline(
                name,
                &spec.points,
                tool,
                Some(form.clone()),
                spec.additions.clone(),
                spec.max_segment,
            ),
        };
        tp.pre_code = spec.pre_code.clone();
        tp.post_code = spec.post_code.clone();

        for p in &mut tp.points {
            if let Some(feed) = spec.feed {
                p.feed = feed;
            }
            if let Some(speed) = spec.speed {
                p.speed = speed;
            }
        }

        if spec.project {
            let mesh = self.mesh.as_ref().ok_or_else(|| CamError::InvalidJob {
                message: format!("path '{}' asks for projection but the job has no mesh", tp.name),
            })?;
            tp = project_path(&tp, mesh, &spec.project_direction)?;
        }
        Ok(tp)
    }
}
