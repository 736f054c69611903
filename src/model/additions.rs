//! Transformations requested for a toolpath before it can be written.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Which transformations should be applied to a [`ToolPath`](super::ToolPath).
///
/// Processing consumes these: every path leaving
/// [`ToolPath::process_additions`](super::ToolPath::process_additions) carries
/// [`ToolPathAdditions::none`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPathAdditions {
    /// Add an insert move before the path.
    pub insert: bool,
    /// Add a retract move after the path.
    pub retract: bool,
    /// Activation code for on/off cutters, 0 for none.
    pub activate: i32,
    /// Rough the path down in cut-depth passes.
    pub step_down: bool,
    /// Drop leading points that cut nothing on a pass.
    pub sd_drop_start: bool,
    /// Split passes at interior air runs longer than this; negative picks a default.
    pub sd_drop_middle: f64,
    /// Drop trailing points that cut nothing on a pass.
    pub sd_drop_end: bool,
    /// Heights of finishing skins above the final path.
    pub onion: Vec<f64>,
    /// Lift a 3-axis path so the tool's cutting surface, not its tip, follows it.
    pub three_axis_height_offset: bool,
    /// Leave holding tabs (not supported; reported and ignored).
    pub tabbing: bool,
    /// Curvature of lead-in/out arcs on closed paths, 0 for straight moves.
    pub lead_curvature: f64,
    /// Planar offset: length is the distance, direction the plane normal.
    pub offset: Vector3<f64>,
    /// Whether machine defaults may overwrite these additions.
    pub replaceable: bool,
}

impl Default for ToolPathAdditions {
    fn default() -> Self {
        Self::none()
    }
}

impl ToolPathAdditions {
    /// No transformations at all.
    pub fn none() -> Self {
        Self {
            insert: false,
            retract: false,
            activate: 0,
            step_down: false,
            sd_drop_start: false,
            sd_drop_middle: -1.0,
            sd_drop_end: false,
            onion: vec![0.0],
            three_axis_height_offset: false,
            tabbing: false,
            lead_curvature: 0.0,
            offset: Vector3::zeros(),
            replaceable: false,
        }
    }

    /// Insert, retract and step down with both ends dropped.
    pub fn basic() -> Self {
        Self {
            insert: true,
            retract: true,
            step_down: true,
            sd_drop_start: true,
            sd_drop_end: true,
            ..Self::none()
        }
    }

    /// Like [`basic`](Self::basic) but may be replaced by machine defaults.
    pub fn replaceable() -> Self {
        Self {
            replaceable: true,
            ..Self::basic()
        }
    }

    /// Whether any transformation is still requested.
    pub fn any(&self) -> bool {
        self.insert
            || self.retract
            || self.activate != 0
            || self.step_down
            || self.onion.iter().any(|h| *h != 0.0)
            || self.three_axis_height_offset
            || self.tabbing
            || self.offset.norm_squared() > 0.0
    }

    /// Onion heights sorted highest first; a single skin at 0 when none are given.
    pub fn sorted_onion(&self) -> Vec<f64> {
        if self.onion.is_empty() {
            return vec![0.0];
        }
        let mut heights = self.onion.clone();
        heights.sort_by(|a, b| b.total_cmp(a));
        heights
    }

    /// Whether a planar offset is requested.
    pub fn has_offset(&self) -> bool {
        self.offset.norm_squared() > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_requests_nothing() {
        assert!(!ToolPathAdditions::none().any());
    }

    #[test]
    fn test_each_flag_counts() {
        let base = ToolPathAdditions::none();
        let cases = [
            ToolPathAdditions {
                insert: true,
                ..base.clone()
            },
            ToolPathAdditions {
                retract: true,
                ..base.clone()
            },
            ToolPathAdditions {
                activate: 3,
                ..base.clone()
            },
            ToolPathAdditions {
                step_down: true,
                ..base.clone()
            },
            ToolPathAdditions {
                onion: vec![0.5, 0.0],
                ..base.clone()
            },
            ToolPathAdditions {
                three_axis_height_offset: true,
                ..base.clone()
            },
            ToolPathAdditions {
                tabbing: true,
                ..base.clone()
            },
            ToolPathAdditions {
                offset: Vector3::new(0.0, 0.0, 1.0),
                ..base.clone()
            },
        ];
        for case in cases {
            assert!(case.any(), "{:?} should request work", case);
        }
    }

    #[test]
    fn test_drop_policies_alone_are_not_work() {
        let additions = ToolPathAdditions {
            sd_drop_start: true,
            sd_drop_end: true,
            sd_drop_middle: 4.0,
            lead_curvature: 0.5,
            ..ToolPathAdditions::none()
        };
        assert!(!additions.any());
    }

    #[test]
    fn test_sorted_onion() {
        let additions = ToolPathAdditions {
            onion: vec![0.0, 1.0, 0.25],
            ..ToolPathAdditions::none()
        };
        assert_eq!(additions.sorted_onion(), vec![1.0, 0.25, 0.0]);

        let empty = ToolPathAdditions {
            onion: vec![],
            ..ToolPathAdditions::none()
        };
        assert_eq!(empty.sorted_onion(), vec![0.0]);
    }
}
