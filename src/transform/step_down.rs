//! Roughing a path down to its final depth in cut-depth passes.

use tracing::debug;

use crate::config::{AUTO_DROP_MIDDLE_FACTOR, EPS};
use crate::error::Result;
use crate::machine::Machine;
use crate::model::{PathLabel, ToolPath, ToolPathAdditions, ToolPoint};

/// Number of passes needed to remove `depths` down to the finish allowance.
pub fn pass_count(depths: &[f64], cut_depth: f64, finish_depth: f64) -> usize {
    if cut_depth <= 0.0 {
        return 0;
    }
    let deepest = depths
        .iter()
        .map(|d| d - finish_depth)
        .fold(0.0_f64, f64::max);
    if deepest <= EPS {
        return 0;
    }
    (deepest / cut_depth - EPS).ceil().max(1.0) as usize
}

/// Height above the final path of a point `depth` deep at pass `level`.
pub fn pass_height(depth: f64, level: usize, cut_depth: f64, finish_depth: f64) -> f64 {
    (depth - (level + 1) as f64 * cut_depth).max(finish_depth)
}

/// Build the step-down passes of a path, one list of sub-paths per level.
///
/// Every produced path is labelled [`PathLabel::RoughCut`] and keeps only
/// its insert/retract requests. When an interior air gap is long enough to
/// split a pass, the part before the gap gets a retract and the part after
/// it an insert.
pub fn step_down(tp: &ToolPath, machine: &Machine) -> Result<Vec<Vec<ToolPath>>> {
    let mt = tp.require_tool()?;
    let form = tp.require_form()?;

    let depths: Vec<f64> = tp
        .points
        .iter()
        .map(|p| form.intersect(&p.pt, 0.0).through_distance)
        .collect();
    let passes = pass_count(&depths, mt.cut_depth, mt.finish_depth);
    debug!("Step-down of '{}': {} passes", tp.name, passes);

    let additions = &tp.additions;
    let drop_middle = if additions.sd_drop_middle < 0.0 {
        AUTO_DROP_MIDDLE_FACTOR * mt.tool_width
    } else {
        additions.sd_drop_middle
    };

    let mut levels = Vec::with_capacity(passes);
    for level in 0..passes {
        let cutting: Vec<bool> = depths
            .iter()
            .map(|d| d - mt.finish_depth > level as f64 * mt.cut_depth + EPS)
            .collect();
        let lifted: Vec<ToolPoint> = tp
            .points
            .iter()
            .zip(depths.iter())
            .map(|(p, d)| {
                let h = pass_height(*d, level, mt.cut_depth, mt.finish_depth);
                p.translated(&(machine.tool_dir(p) * h))
            })
            .collect();

        let runs = split_runs(&lifted, &cutting, additions, drop_middle);
        let count = runs.len();
        let paths = runs
            .into_iter()
            .enumerate()
            .map(|(i, points)| {
                let mut path = tp.derived(points, PathLabel::RoughCut);
                path.additions = ToolPathAdditions {
                    insert: if i == 0 { additions.insert } else { true },
                    retract: if i + 1 == count { additions.retract } else { true },
                    activate: additions.activate,
                    lead_curvature: additions.lead_curvature,
                    ..ToolPathAdditions::none()
                };
                path
            })
            .collect();
        levels.push(paths);
    }
    Ok(levels)
}

/// Cut one pass into runs following the drop policies.
fn split_runs(
    points: &[ToolPoint],
    cutting: &[bool],
    additions: &ToolPathAdditions,
    drop_middle: f64,
) -> Vec<Vec<ToolPoint>> {
    let first_cut = cutting.iter().position(|c| *c);
    let last_cut = cutting.iter().rposition(|c| *c);
    let (first_cut, last_cut) = match (first_cut, last_cut) {
        (Some(a), Some(b)) => (a, b),
        _ => return Vec::new(),
    };
    let start = if additions.sd_drop_start { first_cut } else { 0 };
    let end = if additions.sd_drop_end {
        last_cut
    } else {
        points.len() - 1
    };

    let mut runs = Vec::new();
    let mut current: Vec<ToolPoint> = Vec::new();
    let mut i = start;
    while i <= end {
        if cutting[i] || i < first_cut || i > last_cut {
            current.push(points[i].clone());
            i += 1;
            continue;
        }
        // Interior air gap between two cutting points.
        let gap_end = (i..=last_cut).find(|&k| cutting[k]).unwrap_or(last_cut);
        let from = i.saturating_sub(1);
        let gap_length: f64 = points[from..=gap_end]
            .windows(2)
            .map(|w| w[0].distance(&w[1]))
            .sum();
        if gap_length > drop_middle {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        } else {
            current.extend(points[i..gap_end].iter().cloned());
        }
        i = gap_end;
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
