//! G-code writing on top of [`CodeInfo`].

use std::sync::Arc;
use tracing::debug;

use super::CodeInfo;
use crate::config::FEED_SPEED_TOLERANCE;
use crate::error::Result;
use crate::model::{MaterialTool, ToolPath, ToolPoint};

/// Axis values for one move, positions in machine units, angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisWords {
    pub x: f64,
    pub y: f64,
    /// Absent on machines without a vertical axis.
    pub z: Option<f64>,
    /// Rotary A and B, on five-axis machines.
    pub ab: Option<(f64, f64)>,
}

impl AxisWords {
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            ab: None,
        }
    }

    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            ab: None,
        }
    }
}

/// G-code writer sharing the instruction's [`CodeInfo`].
pub struct GcodeWriter<'a> {
    co: &'a mut CodeInfo,
    /// Whether the machine has a spindle to start and a tool changer.
    spindle: bool,
}

impl<'a> GcodeWriter<'a> {
    pub fn new(co: &'a mut CodeInfo, spindle: bool) -> Self {
        Self { co, spindle }
    }

    // === Program ===

    /// File header: names, modal setup and literal header code.
    pub fn program_start(&mut self, machine: &str, instruction: &str, header: &str, pre_code: &str) {
        self.co.append_comment(&format!("Machine: {}", machine));
        if !instruction.is_empty() {
            self.co.append_comment(&format!("Instruction: {}", instruction));
        }
        self.co.append_line("G90 G21 G17");
        if !header.is_empty() {
            self.co.append_line(header);
        }
        if !pre_code.is_empty() {
            self.co.append_line(pre_code);
        }
    }

    /// File footer: literal code, spindle stop and program end.
    pub fn program_end(&mut self, post_code: &str, footer: &str) {
        if !post_code.is_empty() {
            self.co.append_line(post_code);
        }
        if !footer.is_empty() {
            self.co.append_line(footer);
        }
        if self.spindle {
            self.co.append_line("M05");
        }
        self.co.append_line("M30");
    }

    // === Tool control ===

    /// Load a tool; feed and speed are re-emitted afterwards.
    pub fn tool_change(&mut self, mt: &MaterialTool) {
        debug!("Tool change to {} ({})", mt.tool_number, mt.tool_name);
        self.co
            .append_comment(&format!("Tool: {} in {}", mt.tool_name, mt.mat_name));
        if self.spindle {
            self.co.append_line("M05");
            self.co.append_line(&format!("T{} M06", mt.tool_number));
            self.co.append_line(&format!("G43 H{}", mt.tool_number));
        }
        self.co.state.feed = -1.0;
        self.co.state.speed = -1.0;
    }

    /// Start the spindle when the speed changes.
    pub fn spindle_speed(&mut self, speed: f64) {
        if !self.spindle || (speed - self.co.state.speed).abs() <= FEED_SPEED_TOLERANCE {
            return;
        }
        self.co.append_line(&format!("M03 S{:.0}", speed));
        self.co.state.speed = speed;
    }

    // === Paths ===

    /// Path preamble: tool and form changes, name and literal code.
    ///
    /// Returns the path's tool.
    pub fn begin_path(&mut self, tp: &ToolPath) -> Result<Arc<MaterialTool>> {
        let mt = tp.require_tool()?.clone();
        let form = tp.require_form()?;
        if self.co.change_material_tool(&mt) {
            self.tool_change(&mt);
        }
        if self.co.change_material_form(form) {
            self.co.append_comment("Material form changed");
        }
        if !tp.name.is_empty() {
            self.co.append_comment(&tp.name);
        }
        if !tp.pre_code.is_empty() {
            self.co.append_line(&tp.pre_code);
        }
        Ok(mt)
    }

    /// Path epilogue: literal code.
    pub fn end_path(&mut self, tp: &ToolPath) {
        if !tp.post_code.is_empty() {
            self.co.append_line(&tp.post_code);
        }
    }

    /// Write one point and its move.
    ///
    /// Feed and speed words are emitted only when they change; rapids
    /// leave the modal feed alone.
    pub fn write_point(&mut self, mt: &MaterialTool, tp: &ToolPoint, words: &AxisWords) {
        if !tp.name.is_empty() {
            self.co.append_comment(&tp.name);
        }
        if !tp.pre_code.is_empty() {
            self.co.append_line(&tp.pre_code);
        }

        let speed = if tp.speed < 0.0 { mt.speed } else { tp.speed };
        self.spindle_speed(speed);

        let feed = if tp.feed < 0.0 { mt.feed_cut } else { tp.feed };
        let rapid = feed == 0.0;

        let mut line = String::from(if rapid { "G00" } else { "G01" });
        line.push_str(&format!(" X{} Y{}", format_coord(words.x), format_coord(words.y)));
        if let Some(z) = words.z {
            line.push_str(&format!(" Z{}", format_coord(z)));
        }
        if let Some((a, b)) = words.ab {
            line.push_str(&format!(" A{} B{}", format_angle(a), format_angle(b)));
        }
        if !rapid && (feed - self.co.state.feed).abs() > FEED_SPEED_TOLERANCE {
            line.push_str(&format!(" F{:.0}", feed));
            self.co.state.feed = feed;
        }
        self.co.append_line(&line);

        self.co.state.x = words.x;
        self.co.state.y = words.y;
        self.co.grow_range("X", words.x);
        self.co.grow_range("Y", words.y);
        if let Some(z) = words.z {
            self.co.state.z = z;
            self.co.grow_range("Z", z);
        }
        if let Some((a, b)) = words.ab {
            self.co.state.a = a;
            self.co.state.b = b;
            self.co.grow_range("A", a.to_degrees());
            self.co.grow_range("B", b.to_degrees());
        }
        self.co.state.dir = tp.dir;

        if !tp.post_code.is_empty() {
            self.co.append_line(&tp.post_code);
        }
        self.co.add_point_diagnostics(tp);
    }

    /// Write a whole path with precomputed axis words.
    pub fn write_path(&mut self, tp: &ToolPath, points: &[ToolPoint], words: &[AxisWords]) -> Result<()> {
        let mt = self.begin_path(tp)?;
        for (p, w) in points.iter().zip(words.iter()) {
            self.write_point(&mt, p, w);
        }
        self.end_path(tp);
        Ok(())
    }
}

/// Format a linear axis value: three decimals, never `-0.000`.
pub fn format_coord(value: f64) -> String {
    let v = if value.abs() < 0.0005 { 0.0 } else { value };
    format!("{:.3}", v)
}

/// Format an angle given in radians as degrees.
pub fn format_angle(radians: f64) -> String {
    format_coord(radians.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodeStyle;
    use crate::model::PlaneForm;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_format_coord() {
        assert_eq!(format_coord(0.0), "0.000");
        assert_eq!(format_coord(-0.0), "0.000");
        assert_eq!(format_coord(-0.0001), "0.000");
        assert_eq!(format_coord(1.5), "1.500");
        assert_eq!(format_coord(-12.3456), "-12.346");
    }

    #[test]
    fn test_format_angle() {
        assert_eq!(format_angle(FRAC_PI_2), "90.000");
    }

    #[test]
    fn test_feed_only_on_change() {
        let mut co = CodeInfo::new(CodeStyle::default());
        let tp = ToolPath {
            material_tool: Some(Arc::new(MaterialTool::default())),
            material_form: Some(Arc::new(PlaneForm::horizontal(0.0, 5.0))),
            ..ToolPath::new("")
        };
        let points = vec![
            ToolPoint::at(0.0, 0.0, 0.0),
            ToolPoint::at(1.0, 0.0, 0.0),
            ToolPoint::at(2.0, 0.0, 0.0).feed(0.0),
            ToolPoint::at(3.0, 0.0, 0.0).feed(40.0),
        ];
        let words: Vec<AxisWords> = points
            .iter()
            .map(|p| AxisWords::xyz(p.pt.x, p.pt.y, p.pt.z))
            .collect();
        GcodeWriter::new(&mut co, true)
            .write_path(&tp, &points, &words)
            .unwrap();

        let code = co.code();
        assert_eq!(code.matches("F100").count(), 1);
        assert_eq!(code.matches("M03 S1000").count(), 1);
        assert!(code.contains("G00 X2.000 Y0.000 Z0.000\r\n"));
        assert!(code.contains("G01 X3.000 Y0.000 Z0.000 F40"));
        assert_eq!(co.range("X"), Some((0.0, 3.0)));
    }
}
