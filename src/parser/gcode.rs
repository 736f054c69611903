//! G-code reader for files written by the three- and five-axis machines.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::CodeStyle;
use crate::error::{CamError, Result};

/// One move with the modal axis values in effect after it.
///
/// Angles are in degrees as written. `feed` is zero for rapids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcodeMove {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub feed: f64,
    pub speed: f64,
    /// 1-based source line.
    pub line: usize,
}

impl Default for GcodeMove {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            a: 0.0,
            b: 0.0,
            feed: -1.0,
            speed: -1.0,
            line: 0,
        }
    }
}

fn word_regex() -> &'static Regex {
    static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
    WORD_REGEX.get_or_init(|| {
        Regex::new(r"([A-Za-z])\s*([-+]?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern")
    })
}

/// Remove every comment delimited by the style's tokens.
pub fn strip_comments(line: &str, style: &CodeStyle) -> String {
    let mut out = String::new();
    let mut rest = line;
    while let Some(start) = rest.find(&style.comment_start) {
        out.push_str(&rest[..start]);
        let after = &rest[start + style.comment_start.len()..];
        match after.find(&style.comment_end) {
            Some(end) => rest = &after[end + style.comment_end.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Letter/value words of a line, comments removed, letters upper-cased.
pub fn parse_words(line: &str, style: &CodeStyle) -> Result<Vec<(char, f64)>> {
    let clean = strip_comments(line, style);
    word_regex()
        .captures_iter(&clean)
        .map(|cap| {
            let letter = cap[1].chars().next().unwrap_or(' ').to_ascii_uppercase();
            let value: f64 = cap[2].parse().map_err(|_| CamError::ParseError {
                line: 0,
                message: format!("bad number '{}'", &cap[2]),
            })?;
            Ok((letter, value))
        })
        .collect()
}

/// Read the moves of a G-code program.
///
/// Line numbers (`N` words) and comments are skipped. `G0`/`G00` selects
/// rapid moves, `G1`/`G01` feed moves at the modal `F`. A move is recorded
/// whenever a line changes any of X, Y, Z, A or B.
pub fn read_gcode(code: &str, style: &CodeStyle) -> Result<Vec<GcodeMove>> {
    let mut moves = Vec::new();
    let mut state = GcodeMove::default();
    let mut modal_feed = -1.0;
    let mut rapid = false;

    for (i, line) in code.lines().enumerate() {
        let words = parse_words(line, style).map_err(|e| match e {
            CamError::ParseError { message, .. } => CamError::ParseError { line: i + 1, message },
            other => other,
        })?;

        let mut moved = false;
        for (letter, value) in words {
            match letter {
                'G' if value == 0.0 => rapid = true,
                'G' if value == 1.0 => rapid = false,
                'F' => modal_feed = value,
                'S' => state.speed = value,
                'X' => moved |= set_axis(&mut state.x, value),
                'Y' => moved |= set_axis(&mut state.y, value),
                'Z' => moved |= set_axis(&mut state.z, value),
                'A' => moved |= set_axis(&mut state.a, value),
                'B' => moved |= set_axis(&mut state.b, value),
                _ => {}
            }
        }

        if moved {
            state.feed = if rapid { 0.0 } else { modal_feed };
            state.line = i + 1;
            moves.push(state);
        }
    }
    Ok(moves)
}

fn set_axis(axis: &mut f64, value: f64) -> bool {
    let changed = *axis != value;
    *axis = value;
    changed
}
