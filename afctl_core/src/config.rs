//! Runtime tuning parameters for the autofocus engine.
//!
//! These are the validated structs the engine reads every frame. They are
//! separate from the TOML-deserialized schema in `afctl_config`; conversion
//! substitutes compiled-in defaults (and warns) for anything missing, so a
//! partial tuning file never blocks operation.
//!
//! Defaults assume an IMX708-style module with the standard lens. All focus
//! values are dioptres (1/m); frame counts are relative to the update rate.

use crate::types::{AfRange, AfSpeed};

/// Focus bounds for one range variant.
#[derive(Debug, Clone, Copy)]
pub struct RangeParams {
    /// Closest-focus bound (dioptres).
    pub focus_min: f64,
    /// Farthest-focus bound (dioptres).
    pub focus_max: f64,
    /// Starting position for a fresh scan.
    pub focus_default: f64,
}

impl Default for RangeParams {
    fn default() -> Self {
        Self {
            focus_min: 0.0,
            focus_max: 12.0,
            focus_default: 1.0,
        }
    }
}

/// Scan and tracking dynamics for one speed preset.
#[derive(Debug, Clone, Copy)]
pub struct SpeedParams {
    /// Coarse scan step (dioptres).
    pub step_coarse: f64,
    /// Fine scan step (dioptres).
    pub step_fine: f64,
    /// Scan terminates once contrast falls below this fraction of the max.
    pub contrast_ratio: f64,
    /// PDAF closed-loop gain; sign matches the sensor's phase convention.
    pub pdaf_gain: f64,
    /// Corrections smaller than this are squelched to suppress hunting.
    pub pdaf_squelch: f64,
    /// Maximum lens movement per frame (dioptres).
    pub max_slew: f64,
    /// Frame budget for a triggered PDAF pass.
    pub pdaf_frames: u32,
    /// Consecutive low-confidence frames before falling back to a contrast
    /// scan. 0 disables PDAF entirely.
    pub dropout_frames: u32,
    /// Frames to wait between scan steps and at the end of a scan.
    pub step_frames: u32,
}

impl Default for SpeedParams {
    fn default() -> Self {
        Self {
            step_coarse: 1.0,
            step_fine: 0.25,
            contrast_ratio: 0.75,
            pdaf_gain: -0.02,
            pdaf_squelch: 0.125,
            max_slew: 2.0,
            pdaf_frames: 20,
            dropout_frames: 6,
            step_frames: 4,
        }
    }
}

/// Complete engine tuning: per-range bounds, per-speed dynamics, confidence
/// thresholds, and the dioptre → hardware map control points.
#[derive(Debug, Clone)]
pub struct TuningParams {
    /// Indexed by `AfRange`.
    pub ranges: [RangeParams; 3],
    /// Indexed by `AfSpeed`.
    pub speeds: [SpeedParams; 2],
    /// Confidence scale for PDAF damping and scan early termination.
    pub conf_epsilon: u32,
    /// Minimum per-cell confidence admitted into phase fusion.
    pub conf_thresh: u32,
    /// Per-cell confidence ceiling.
    pub conf_clip: u32,
    /// Frames to ignore after startup or a sensor mode change.
    pub skip_frames: u32,
    /// Dioptre → hardware control points; empty means "use the default map".
    pub map: Vec<(f64, f64)>,
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            ranges: [Default::default(); 3],
            speeds: [Default::default(); 2],
            conf_epsilon: 8,
            conf_thresh: 16,
            conf_clip: 512,
            skip_frames: 5,
            map: Vec::new(),
        }
    }
}

/// Default dioptre → hardware map, synthesized when the tuning file supplies
/// none.
pub const DEFAULT_MAP: [(f64, f64); 2] = [(0.0, 445.0), (15.0, 925.0)];

fn take<T: Copy>(dst: &mut T, src: Option<T>, name: &'static str) {
    match src {
        Some(v) => *dst = v,
        None => tracing::warn!(parameter = name, "missing tuning parameter, using default"),
    }
}

fn apply_range(dst: &mut RangeParams, src: &afctl_config::RangeToml) {
    if let Some(v) = src.min {
        dst.focus_min = v;
    }
    if let Some(v) = src.max {
        dst.focus_max = v;
    }
    if let Some(v) = src.default {
        dst.focus_default = v;
    }
}

fn apply_speed(dst: &mut SpeedParams, src: &afctl_config::SpeedToml) {
    if let Some(v) = src.step_coarse {
        dst.step_coarse = v;
    }
    if let Some(v) = src.step_fine {
        dst.step_fine = v;
    }
    if let Some(v) = src.contrast_ratio {
        dst.contrast_ratio = v;
    }
    if let Some(v) = src.pdaf_gain {
        dst.pdaf_gain = v;
    }
    if let Some(v) = src.pdaf_squelch {
        dst.pdaf_squelch = v;
    }
    if let Some(v) = src.max_slew {
        dst.max_slew = v;
    }
    if let Some(v) = src.pdaf_frames {
        dst.pdaf_frames = v;
    }
    if let Some(v) = src.dropout_frames {
        dst.dropout_frames = v;
    }
    if let Some(v) = src.step_frames {
        dst.step_frames = v;
    }
}

impl TuningParams {
    pub fn range(&self, r: AfRange) -> &RangeParams {
        &self.ranges[r as usize]
    }

    pub fn speed(&self, s: AfSpeed) -> &SpeedParams {
        &self.speeds[s as usize]
    }

    /// Build runtime tuning from a parsed tuning file, warning about and
    /// substituting defaults for anything missing.
    ///
    /// The Macro range inherits from Normal, and Full defaults to the union
    /// of Normal and Macro bounds with Normal's default position; both can be
    /// overridden per-field. The Fast speed preset likewise inherits from
    /// Normal.
    pub fn from_config(cfg: &afctl_config::Config) -> Self {
        let mut t = Self::default();

        match &cfg.ranges {
            None => tracing::warn!("no focus ranges defined, using defaults"),
            Some(rr) => {
                match &rr.normal {
                    Some(r) => apply_range(&mut t.ranges[AfRange::Normal as usize], r),
                    None => tracing::warn!("missing range \"normal\""),
                }
                t.ranges[AfRange::Macro as usize] = t.ranges[AfRange::Normal as usize];
                if let Some(r) = &rr.macro_ {
                    apply_range(&mut t.ranges[AfRange::Macro as usize], r);
                }
                let normal = t.ranges[AfRange::Normal as usize];
                let macro_ = t.ranges[AfRange::Macro as usize];
                t.ranges[AfRange::Full as usize] = RangeParams {
                    focus_min: normal.focus_min.min(macro_.focus_min),
                    focus_max: normal.focus_max.max(macro_.focus_max),
                    focus_default: normal.focus_default,
                };
                if let Some(r) = &rr.full {
                    apply_range(&mut t.ranges[AfRange::Full as usize], r);
                }
            }
        }

        match &cfg.speeds {
            None => tracing::warn!("no speeds defined, using defaults"),
            Some(ss) => {
                match &ss.normal {
                    Some(s) => apply_speed(&mut t.speeds[AfSpeed::Normal as usize], s),
                    None => tracing::warn!("missing speed \"normal\""),
                }
                t.speeds[AfSpeed::Fast as usize] = t.speeds[AfSpeed::Normal as usize];
                if let Some(s) = &ss.fast {
                    apply_speed(&mut t.speeds[AfSpeed::Fast as usize], s);
                }
            }
        }

        take(&mut t.conf_epsilon, cfg.conf_epsilon, "conf_epsilon");
        take(&mut t.conf_thresh, cfg.conf_thresh, "conf_thresh");
        take(&mut t.conf_clip, cfg.conf_clip, "conf_clip");
        take(&mut t.skip_frames, cfg.skip_frames, "skip_frames");

        match &cfg.map {
            Some(points) => t.map = points.clone(),
            None => tracing::warn!("no map defined, using default"),
        }

        t
    }
}

impl From<&afctl_config::Config> for TuningParams {
    fn from(cfg: &afctl_config::Config) -> Self {
        Self::from_config(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let t = TuningParams::from_config(&afctl_config::Config::default());
        assert_eq!(t.conf_epsilon, 8);
        assert_eq!(t.conf_thresh, 16);
        assert_eq!(t.conf_clip, 512);
        assert_eq!(t.skip_frames, 5);
        assert!(t.map.is_empty());
        assert_eq!(t.range(AfRange::Normal).focus_max, 12.0);
        assert_eq!(t.speed(AfSpeed::Fast).pdaf_frames, 20);
    }

    #[test]
    fn macro_inherits_normal_and_full_is_union() {
        let cfg = afctl_config::load_toml(
            r#"
            [ranges.normal]
            min = 0.0
            max = 10.0
            default = 1.0
            [ranges.macro]
            min = 3.0
            max = 15.0
            "#,
        )
        .unwrap();
        let t = TuningParams::from_config(&cfg);
        // Macro inherits normal's default
        assert_eq!(t.range(AfRange::Macro).focus_default, 1.0);
        assert_eq!(t.range(AfRange::Macro).focus_min, 3.0);
        // Full is the union of bounds
        assert_eq!(t.range(AfRange::Full).focus_min, 0.0);
        assert_eq!(t.range(AfRange::Full).focus_max, 15.0);
        assert_eq!(t.range(AfRange::Full).focus_default, 1.0);
    }

    #[test]
    fn fast_speed_inherits_then_overrides() {
        let cfg = afctl_config::load_toml(
            r#"
            [speeds.normal]
            step_coarse = 2.0
            pdaf_frames = 16
            [speeds.fast]
            step_coarse = 3.0
            "#,
        )
        .unwrap();
        let t = TuningParams::from_config(&cfg);
        assert_eq!(t.speed(AfSpeed::Fast).step_coarse, 3.0);
        assert_eq!(t.speed(AfSpeed::Fast).pdaf_frames, 16);
        assert_eq!(t.speed(AfSpeed::Normal).step_coarse, 2.0);
    }
}
