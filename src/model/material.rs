//! Cutting parameters for a tool in a given material.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Shape of the cutting end of the tool.
///
/// Read from job files by name, case-insensitively; unknown names become
/// [`EndShape::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum EndShape {
    /// Ball nose.
    #[default]
    Ball,
    /// Flat end mill.
    Square,
    /// 90 degree V bit.
    V,
    /// Anything else; treated like a ball.
    Other,
    /// Unknown shape from a bad tool library entry.
    Error,
}

impl EndShape {
    /// Parse an end shape name as found in tool libraries.
    pub fn from_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ball" => EndShape::Ball,
            "square" | "flat" => EndShape::Square,
            "v" => EndShape::V,
            "other" => EndShape::Other,
            _ => EndShape::Error,
        }
    }
}

impl From<String> for EndShape {
    fn from(name: String) -> Self {
        EndShape::from_name(&name)
    }
}

/// Immutable cutting parameters for one tool in one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialTool {
    /// Material name.
    pub mat_name: String,
    /// Tool name.
    pub tool_name: String,
    /// Tool number in the machine's changer.
    pub tool_number: i32,
    /// Spindle speed.
    pub speed: f64,
    /// Feed rate while cutting.
    pub feed_cut: f64,
    /// Feed rate while plunging.
    pub feed_plunge: f64,
    /// Depth of material removed per roughing pass.
    pub cut_depth: f64,
    /// Material left for the finishing pass.
    pub finish_depth: f64,
    /// Tool diameter.
    pub tool_width: f64,
    /// Width of the cut made while entering the material.
    pub insert_width: f64,
    /// Tool length from holder to tip.
    pub tool_length: f64,
    /// Shape of the cutting end.
    pub shape: EndShape,
    /// Tolerance for curve discretisation.
    pub tolerance: f64,
    /// Smallest step between points.
    pub min_step: f64,
    /// Side load fraction.
    pub side_load: f64,
    /// Longest move allowed inside material between paths.
    pub path_jump: f64,
}

impl Default for MaterialTool {
    fn default() -> Self {
        Self {
            mat_name: "Material".to_string(),
            tool_name: "Tool".to_string(),
            tool_number: 1,
            speed: 1000.0,
            feed_cut: 100.0,
            feed_plunge: 50.0,
            cut_depth: 1.0,
            finish_depth: 0.0,
            tool_width: 3.0,
            insert_width: 3.0,
            tool_length: 0.0,
            shape: EndShape::Ball,
            tolerance: 0.01,
            min_step: 0.005,
            side_load: 0.7,
            path_jump: 2.0,
        }
    }
}

impl MaterialTool {
    /// Sentinel meaning no tool has been loaded yet.
    pub fn empty() -> Self {
        Self {
            mat_name: String::new(),
            tool_name: String::new(),
            tool_number: -1,
            speed: -1.0,
            feed_cut: -1.0,
            feed_plunge: -1.0,
            cut_depth: -1.0,
            finish_depth: -1.0,
            tool_width: -1.0,
            insert_width: -1.0,
            tool_length: -1.0,
            shape: EndShape::Error,
            tolerance: -1.0,
            min_step: -1.0,
            side_load: -1.0,
            path_jump: -1.0,
        }
    }

    /// Whether this is the [`empty`](Self::empty) sentinel.
    pub fn is_empty(&self) -> bool {
        self.tool_number == -1 && self.shape == EndShape::Error
    }

    /// Tool radius.
    pub fn radius(&self) -> f64 {
        self.tool_width / 2.0
    }

    /// Vector from the tool tip to where the tool touches a surface.
    ///
    /// `dir` is the tool direction and `normal` the outward surface normal.
    /// Placing the tip at `contact - cut_offset` puts the cutting surface on
    /// the contact point.
    pub fn cut_offset(&self, dir: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
        let r = self.radius();
        let normal = normal.normalize();
        // Component of the normal across the tool axis.
        let across = normal - dir * normal.dot(dir);
        let side = across.try_normalize(1e-12);

        match self.shape {
            EndShape::Ball | EndShape::Other | EndShape::Error => (dir - normal) * r,
            EndShape::Square => match side {
                Some(side) => -side * r,
                None => Vector3::zeros(),
            },
            // A 90 degree cone touches with its tip until the surface is
            // steeper than the cone, then with its rim.
            EndShape::V => match side {
                Some(side) if normal.dot(dir) < std::f64::consts::FRAC_1_SQRT_2 => {
                    dir * r - side * r
                }
                _ => Vector3::zeros(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn tool(shape: EndShape) -> MaterialTool {
        MaterialTool {
            tool_width: 2.0,
            shape,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(MaterialTool::empty().is_empty());
        assert!(!MaterialTool::default().is_empty());
    }

    #[test]
    fn test_end_shape_from_name() {
        assert_eq!(EndShape::from_name("Ball"), EndShape::Ball);
        assert_eq!(EndShape::from_name(" flat "), EndShape::Square);
        assert_eq!(EndShape::from_name("V"), EndShape::V);
        assert_eq!(EndShape::from_name("drill"), EndShape::Error);
    }

    #[test]
    fn test_tool_shape_read_by_name() {
        let mt: MaterialTool = serde_json::from_str(r#"{"tool_name": "6mm", "shape": "flat"}"#).unwrap();
        assert_eq!(mt.shape, EndShape::Square);
        let mt: MaterialTool = serde_json::from_str(r#"{"shape": "V"}"#).unwrap();
        assert_eq!(mt.shape, EndShape::V);
        let mt: MaterialTool = serde_json::from_str(r#"{"shape": "drill"}"#).unwrap();
        assert_eq!(mt.shape, EndShape::Error);
        let mt: MaterialTool = serde_json::from_str(r#"{"shape": "Ball"}"#).unwrap();
        assert_eq!(mt.shape, EndShape::Ball);
    }

    #[test]
    fn test_ball_offset_on_flat_floor_is_zero() {
        let off = tool(EndShape::Ball).cut_offset(&Vector3::z(), &Vector3::z());
        assert!(off.norm() < EPS);
    }

    #[test]
    fn test_ball_offset_on_wall() {
        // Wall facing +X: the ball touches at its side, one radius up.
        let off = tool(EndShape::Ball).cut_offset(&Vector3::z(), &Vector3::x());
        assert!((off - Vector3::new(-1.0, 0.0, 1.0)).norm() < EPS);
    }

    #[test]
    fn test_square_offset_on_slope() {
        let normal = Vector3::new(1.0, 0.0, 1.0).normalize();
        let off = tool(EndShape::Square).cut_offset(&Vector3::z(), &normal);
        assert!((off - Vector3::new(-1.0, 0.0, 0.0)).norm() < EPS);
    }

    #[test]
    fn test_v_offset_switches_at_cone_angle() {
        let shallow = Vector3::new(0.3, 0.0, 1.0).normalize();
        let off = tool(EndShape::V).cut_offset(&Vector3::z(), &shallow);
        assert!(off.norm() < EPS);

        let steep = Vector3::new(1.0, 0.0, 0.3).normalize();
        let off = tool(EndShape::V).cut_offset(&Vector3::z(), &steep);
        assert!((off - Vector3::new(-1.0, 0.0, 1.0)).norm() < EPS);
    }
}
