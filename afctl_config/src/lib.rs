#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Tuning-file schema for the autofocus controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section is optional: the engine substitutes compiled-in defaults
//!   for anything missing, so a partial tuning file is never fatal.
//! - All focus values are in dioptres (1/m); the `map` table converts them
//!   to hardware lens units.

use serde::Deserialize;

/// One focus range section. Fields left unset inherit from the range this
/// section is derived from (macro inherits normal, full inherits the union).
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct RangeToml {
    /// Closest-focus bound in dioptres.
    pub min: Option<f64>,
    /// Farthest-focus bound in dioptres.
    pub max: Option<f64>,
    /// Starting position for a fresh scan.
    pub default: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RangesToml {
    pub normal: Option<RangeToml>,
    #[serde(rename = "macro")]
    pub macro_: Option<RangeToml>,
    pub full: Option<RangeToml>,
}

/// One speed preset section. Unset fields inherit from the normal preset.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct SpeedToml {
    pub step_coarse: Option<f64>,
    pub step_fine: Option<f64>,
    /// Scan termination threshold as a fraction of the running max contrast.
    pub contrast_ratio: Option<f64>,
    /// PDAF loop gain; sign matches the sensor's phase convention.
    pub pdaf_gain: Option<f64>,
    /// Suppress PDAF corrections smaller than this (dioptres).
    pub pdaf_squelch: Option<f64>,
    /// Maximum lens movement per frame (dioptres).
    pub max_slew: Option<f64>,
    /// Frame budget for a triggered PDAF pass.
    pub pdaf_frames: Option<u32>,
    /// Consecutive low-confidence frames before falling back to a scan.
    /// 0 disables PDAF entirely.
    pub dropout_frames: Option<u32>,
    /// Frames to wait between scan steps and at the end of a scan.
    pub step_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SpeedsToml {
    pub normal: Option<SpeedToml>,
    pub fast: Option<SpeedToml>,
}

/// Root tuning-file schema.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ranges: Option<RangesToml>,
    pub speeds: Option<SpeedsToml>,
    /// Confidence scale for PDAF damping and scan early termination.
    pub conf_epsilon: Option<u32>,
    /// Minimum per-cell confidence admitted into phase fusion.
    pub conf_thresh: Option<u32>,
    /// Per-cell confidence ceiling.
    pub conf_clip: Option<u32>,
    /// Frames to ignore after startup or a sensor mode change.
    pub skip_frames: Option<u32>,
    /// Dioptre → hardware-unit control points, `[[dioptre, hwpos], ...]`.
    pub map: Option<Vec<(f64, f64)>>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_toml_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read tuning file {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse tuning file {:?}: {}", path, e))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if let Some(speeds) = &self.speeds {
            for (name, s) in [("normal", &speeds.normal), ("fast", &speeds.fast)] {
                let Some(s) = s else { continue };
                if let Some(r) = s.contrast_ratio
                    && !(r > 0.0 && r <= 1.0)
                {
                    eyre::bail!("speeds.{name}.contrast_ratio must be in (0.0, 1.0]");
                }
                if let Some(v) = s.max_slew
                    && v <= 0.0
                {
                    eyre::bail!("speeds.{name}.max_slew must be > 0");
                }
                if let Some(v) = s.pdaf_squelch
                    && v < 0.0
                {
                    eyre::bail!("speeds.{name}.pdaf_squelch must be >= 0");
                }
                if let Some(v) = s.step_coarse
                    && v <= 0.0
                {
                    eyre::bail!("speeds.{name}.step_coarse must be > 0");
                }
                if let Some(v) = s.step_fine
                    && v <= 0.0
                {
                    eyre::bail!("speeds.{name}.step_fine must be > 0");
                }
            }
        }

        if let Some(ranges) = &self.ranges {
            for (name, r) in [
                ("normal", &ranges.normal),
                ("macro", &ranges.macro_),
                ("full", &ranges.full),
            ] {
                let Some(r) = r else { continue };
                if let (Some(lo), Some(hi)) = (r.min, r.max)
                    && lo > hi
                {
                    eyre::bail!("ranges.{name}: min must be <= max");
                }
                if let (Some(lo), Some(d)) = (r.min, r.default)
                    && d < lo
                {
                    eyre::bail!("ranges.{name}: default must be >= min");
                }
                if let (Some(hi), Some(d)) = (r.max, r.default)
                    && d > hi
                {
                    eyre::bail!("ranges.{name}: default must be <= max");
                }
            }
        }

        if let (Some(thresh), Some(clip)) = (self.conf_thresh, self.conf_clip)
            && thresh > clip
        {
            eyre::bail!("conf_thresh must be <= conf_clip");
        }

        if let Some(map) = &self.map {
            if map.len() < 2 {
                eyre::bail!("map requires at least two control points, got {}", map.len());
            }
            // Strictly increasing dioptre axis, monotonic hardware axis.
            let mut dir: i8 = 0;
            for i in 1..map.len() {
                if map[i].0 <= map[i - 1].0 {
                    eyre::bail!(
                        "map dioptre values must be strictly increasing at index {}",
                        i
                    );
                }
                let dy = map[i].1 - map[i - 1].1;
                let step_dir = if dy > 0.0 {
                    1
                } else if dy < 0.0 {
                    -1
                } else {
                    0
                };
                if step_dir != 0 {
                    if dir == 0 {
                        dir = step_dir;
                    } else if dir != step_dir {
                        eyre::bail!("map hardware values must be monotonic");
                    }
                }
            }
        }

        Ok(())
    }
}
