//! Reader for OMAX `.omx` files.

use nalgebra::{Point3, Vector3};

use crate::error::{CamError, Result};
use crate::model::ToolPoint;

/// Message attached to points whose direction field cannot be read.
pub const UNREADABLE_ORIENTATION: &str = "Unreadable tool orientation";

fn field(fields: &[&str], index: usize, line: usize) -> Result<f64> {
    let raw = fields.get(index).map(|s| s.trim()).unwrap_or("");
    raw.parse().map_err(|_| CamError::ParseError {
        line,
        message: format!("bad value '{}' in field {}", raw, index),
    })
}

/// Tool direction from the `|` separated jet field.
///
/// The first three values are the negated start jet, which is the tool
/// direction itself.
fn parse_direction(raw: &str) -> Option<Vector3<f64>> {
    let values: Vec<f64> = raw
        .split('|')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if values.len() != 6 {
        return None;
    }
    Vector3::new(values[0], values[1], values[2]).try_normalize(f64::EPSILON)
}

/// Read the move lines of an OMAX file as tool points.
///
/// Lines not starting with `[0],` (header, comments) are skipped. Quality
/// zero reads back as a rapid.
pub fn read_omx(code: &str) -> Result<Vec<ToolPoint>> {
    let mut points = Vec::new();
    for (i, line) in code.lines().enumerate() {
        let line_no = i + 1;
        let Some(body) = line.trim().strip_prefix("[0],") else {
            continue;
        };
        // Field 0 is the "[0]" marker itself.
        let mut fields = vec!["[0]"];
        fields.extend(body.split(','));

        let pt = Point3::new(
            field(&fields, 1, line_no)?,
            field(&fields, 2, line_no)?,
            field(&fields, 3, line_no)?,
        );
        let quality = field(&fields, 7, line_no)?;

        let mut tp = ToolPoint::new(pt);
        match fields.get(15).and_then(|raw| parse_direction(raw)) {
            Some(dir) => tp.dir = dir,
            None => tp.add_error(UNREADABLE_ORIENTATION),
        }
        if quality == 0.0 {
            tp.feed = 0.0;
        } else {
            tp.speed = quality;
        }
        points.push(tp);
    }
    Ok(points)
}
