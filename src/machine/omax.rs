//! OMAX five-axis waterjet with a tilting cutting head.

use nalgebra::{Unit, Vector3};

use crate::config::{CodeStyle, MachineSettings};
use crate::error::Result;
use crate::generator::omx::{self, OMX_HEADER};
use crate::generator::{CodeInfo, GcodeWriter};
use crate::model::{normalize_or_z, MachineInstruction, ToolPath, ToolPoint};
use crate::parser::read_omx;

pub const TILT_OUT_OF_RANGE: &str = "Tilt out of range";

#[derive(Debug, Clone)]
pub struct Omax5 {
    pub settings: MachineSettings,
    /// Largest head tilt from vertical, degrees.
    pub tilt_max: f64,
}

impl Omax5 {
    /// The style is always the OMAX one, whatever the settings say.
    pub fn new(mut settings: MachineSettings) -> Self {
        settings.style = CodeStyle::omax();
        Self {
            settings,
            tilt_max: 59.0,
        }
    }

    /// Positions are lerped, directions slerped.
    pub(super) fn interpolate(&self, from: &ToolPoint, to: &ToolPoint, t: f64) -> ToolPoint {
        let template = if t < 1.0 { from } else { to };
        let mut p = template.moved_to(from.pt + (to.pt - from.pt) * t);
        p.dir = if t <= 0.0 {
            from.dir
        } else if t >= 1.0 {
            to.dir
        } else {
            let a = Unit::new_normalize(normalize_or_z(from.dir));
            let b = Unit::new_normalize(normalize_or_z(to.dir));
            a.try_slerp(&b, t, 1e-9)
                .map(|u| u.into_inner())
                .unwrap_or_else(|| normalize_or_z(from.dir.lerp(&to.dir, t)))
        };
        p
    }

    pub(super) fn write_file_start(&self, co: &mut CodeInfo, mi: &MachineInstruction) {
        co.append_line_no_num(OMX_HEADER);
        co.append_comment(&format!("Machine: {}", self.settings.name));
        if !mi.name.is_empty() {
            co.append_comment(&format!("Instruction: {}", mi.name));
        }
        if !self.settings.header.is_empty() {
            co.append_line(&self.settings.header);
        }
        if !mi.pre_code.is_empty() {
            co.append_line(&mi.pre_code);
        }
    }

    pub(super) fn write_file_end(&self, co: &mut CodeInfo, mi: &MachineInstruction) {
        if !mi.post_code.is_empty() {
            co.append_line(&mi.post_code);
        }
        if !self.settings.footer.is_empty() {
            co.append_line(&self.settings.footer);
        }
    }

    pub(super) fn write_code(&self, co: &mut CodeInfo, tp: &ToolPath) -> Result<()> {
        let mt = GcodeWriter::new(co, false).begin_path(tp)?;
        for (i, point) in tp.points.iter().enumerate() {
            let mut p = point.clone();
            if p.dir.angle(&Vector3::z()).to_degrees() > self.tilt_max {
                p.add_error(TILT_OUT_OF_RANGE);
            }
            let quality = if p.is_rapid() {
                0.0
            } else if p.speed < 0.0 {
                mt.speed
            } else {
                p.speed
            };
            omx::write_point(co, &p, tp.points.get(i + 1), quality);
        }
        GcodeWriter::new(co, false).end_path(tp);
        Ok(())
    }

    pub(super) fn read_code(&self, code: &str) -> Result<ToolPath> {
        Ok(ToolPath::with_points("Read", read_omx(code)?))
    }
}
