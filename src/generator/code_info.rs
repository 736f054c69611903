//! Accumulator for emitted code, machine state and diagnostics.

use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CodeStyle, LINE_END};
use crate::error::Result;
use crate::model::{MaterialForm, MaterialTool, ToolPoint};

/// Last values written for each machine axis and modal word.
///
/// Carried from one write call to the next; negative feed and speed mean
/// nothing has been emitted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Table tilt, radians.
    pub a: f64,
    /// Table rotation, radians.
    pub b: f64,
    pub feed: f64,
    pub speed: f64,
    /// Tool direction of the last written point.
    pub dir: Vector3<f64>,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            a: 0.0,
            b: 0.0,
            feed: -1.0,
            speed: -1.0,
            dir: Vector3::z(),
        }
    }
}

/// Outcome of [`CodeInfo::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The file was written.
    Saved,
    /// Unignored errors blocked the write; nothing was written.
    Blocked(Vec<String>),
}

/// Code being written for one instruction.
#[derive(Debug, Clone)]
pub struct CodeInfo {
    code: String,
    style: CodeStyle,
    /// State carried between write calls.
    pub state: MachineState,
    ranges: BTreeMap<String, (f64, f64)>,
    errors: BTreeMap<String, Vec<usize>>,
    warnings: BTreeMap<String, Vec<usize>>,
    material_tool: Arc<MaterialTool>,
    material_form: Option<Arc<dyn MaterialForm>>,
    next_number: u32,
    lines: usize,
}

impl CodeInfo {
    pub fn new(style: CodeStyle) -> Self {
        let next_number = style.line_step;
        Self {
            code: String::new(),
            style,
            state: MachineState::default(),
            ranges: BTreeMap::new(),
            errors: BTreeMap::new(),
            warnings: BTreeMap::new(),
            material_tool: Arc::new(MaterialTool::empty()),
            material_form: None,
            next_number,
            lines: 0,
        }
    }

    /// The code written so far.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn style(&self) -> &CodeStyle {
        &self.style
    }

    /// Number of physical lines written.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Append text verbatim, one line per input line.
    pub fn append_line_no_num(&mut self, text: &str) {
        for line in text.lines() {
            self.code.push_str(line);
            self.code.push_str(LINE_END);
            self.lines += 1;
        }
    }

    /// Append text with a line number prefix on every line.
    pub fn append_line(&mut self, text: &str) {
        for line in text.lines() {
            let numbered = format!("{}{}", self.style.line_number(self.next_number), line);
            self.append_line_no_num(&numbered);
            if self.style.numbered() {
                self.next_number += self.style.line_step;
            }
        }
    }

    /// Append a comment, one comment per input line.
    ///
    /// Comment tokens inside the text are replaced by brackets.
    pub fn append_comment(&mut self, text: &str) {
        for line in text.lines() {
            let clean = line
                .replace(&self.style.comment_start, "[")
                .replace(&self.style.comment_end, "]");
            let comment = format!("{}{}{}", self.style.comment_start, clean, self.style.comment_end);
            self.append_line_no_num(&comment);
        }
    }

    /// Record an error at the current line and write it as a comment.
    pub fn add_error(&mut self, message: &str) {
        let line = self.lines + 1;
        self.errors.entry(message.to_string()).or_default().push(line);
        self.append_comment(&format!("ERROR: {}", message));
    }

    /// Record a warning at the current line and write it as a comment.
    pub fn add_warning(&mut self, message: &str) {
        let line = self.lines + 1;
        self.warnings.entry(message.to_string()).or_default().push(line);
        self.append_comment(&format!("WARNING: {}", message));
    }

    /// Write the errors and warnings a point collected during processing.
    pub fn add_point_diagnostics(&mut self, tp: &ToolPoint) {
        for e in &tp.errors {
            self.add_error(e);
        }
        for w in &tp.warnings {
            self.add_warning(w);
        }
    }

    /// Widen the tracked range of an axis.
    pub fn grow_range(&mut self, key: &str, value: f64) {
        self.ranges
            .entry(key.to_string())
            .and_modify(|(lo, hi)| {
                *lo = lo.min(value);
                *hi = hi.max(value);
            })
            .or_insert((value, value));
    }

    /// Range of an axis, if any value was written.
    pub fn range(&self, key: &str) -> Option<(f64, f64)> {
        self.ranges.get(key).copied()
    }

    /// Errors by message, with the lines they were reported on.
    pub fn errors(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.errors
    }

    /// Warnings by message, with the lines they were reported on.
    pub fn warnings(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.warnings
    }

    fn is_ignored(message: &str, ignore: &[String]) -> bool {
        ignore.iter().any(|i| !i.is_empty() && message.contains(i.as_str()))
    }

    /// Errors not matched by any ignore substring.
    pub fn unignored_errors(&self, ignore: &[String]) -> Vec<&str> {
        self.errors
            .keys()
            .filter(|e| !Self::is_ignored(e, ignore))
            .map(String::as_str)
            .collect()
    }

    /// Whether any error is not ignored.
    pub fn has_errors(&self, ignore: &[String]) -> bool {
        !self.unignored_errors(ignore).is_empty()
    }

    fn report(entries: &BTreeMap<String, Vec<usize>>, keep: impl Fn(&str) -> bool) -> String {
        let mut out = String::new();
        for (message, lines) in entries.iter().filter(|(m, _)| keep(m)) {
            let list: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            out.push_str(&format!(
                "{} ({} times, lines {})\n",
                message,
                lines.len(),
                list.join(", ")
            ));
        }
        out
    }

    /// Report of unignored errors.
    pub fn errors_report(&self, ignore: &[String]) -> String {
        Self::report(&self.errors, |m| !Self::is_ignored(m, ignore))
    }

    /// Report of errors matched by the ignore list.
    pub fn ignored_report(&self, ignore: &[String]) -> String {
        Self::report(&self.errors, |m| Self::is_ignored(m, ignore))
    }

    pub fn warnings_report(&self) -> String {
        Self::report(&self.warnings, |_| true)
    }

    /// Min and max of every axis written.
    pub fn range_report(&self) -> String {
        let mut out = String::new();
        for (key, (lo, hi)) in &self.ranges {
            out.push_str(&format!("{}: {:.3} to {:.3}\n", key, lo, hi));
        }
        out
    }

    /// Tool currently loaded; the empty sentinel before the first change.
    pub fn material_tool(&self) -> &Arc<MaterialTool> {
        &self.material_tool
    }

    /// Switch tools, returning whether this is a change.
    pub fn change_material_tool(&mut self, mt: &Arc<MaterialTool>) -> bool {
        if Arc::ptr_eq(&self.material_tool, mt) || *self.material_tool == **mt {
            return false;
        }
        self.material_tool = mt.clone();
        true
    }

    /// Switch material forms, returning whether this is a change.
    pub fn change_material_form(&mut self, form: &Arc<dyn MaterialForm>) -> bool {
        if let Some(current) = &self.material_form {
            if Arc::ptr_eq(current, form) {
                return false;
            }
        }
        self.material_form = Some(form.clone());
        true
    }

    /// Write the code to a file unless unignored errors remain.
    pub fn save(&self, path: &Path, ignore: &[String]) -> Result<SaveOutcome> {
        let blocking: Vec<String> = self
            .unignored_errors(ignore)
            .into_iter()
            .map(String::from)
            .collect();
        if !blocking.is_empty() {
            return Ok(SaveOutcome::Blocked(blocking));
        }
        std::fs::write(path, &self.code)?;
        Ok(SaveOutcome::Saved)
    }
}

impl fmt::Display for CodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}
