//! Construction and validation of [`AfController`].

use crate::config::{DEFAULT_MAP, TuningParams};
use crate::engine::{AfController, ScanState};
use crate::error::{BuildError, Result};
use crate::pwl::Pwl;
use crate::status::FocusState;
use crate::types::{AfMode, AfRange, AfSpeed, CameraGeometry};
use crate::weights::Weights;

/// Builder for [`AfController`]. All tuning is validated on `build()`;
/// anything not supplied falls back to the compiled-in defaults.
#[derive(Debug, Default)]
pub struct AfBuilder {
    tuning: Option<TuningParams>,
    mode: AfMode,
    range: AfRange,
    speed: AfSpeed,
    geometry: Option<CameraGeometry>,
}

impl AfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuning(mut self, tuning: TuningParams) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Convert a parsed tuning file, warning about and defaulting any
    /// missing sections.
    pub fn with_config(mut self, cfg: &afctl_config::Config) -> Self {
        self.tuning = Some(TuningParams::from_config(cfg));
        self
    }

    pub fn with_mode(mut self, mode: AfMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_range(mut self, range: AfRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_speed(mut self, speed: AfSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_geometry(mut self, geometry: CameraGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Validate the tuning and build the controller around the given lens.
    pub fn build<L: afctl_traits::Lens>(self, lens: L) -> Result<AfController<L>> {
        let mut tuning = self.tuning.unwrap_or_default();

        for range in &tuning.ranges {
            if !(range.focus_min <= range.focus_default
                && range.focus_default <= range.focus_max)
            {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "range must satisfy min <= default <= max",
                )));
            }
        }
        for sp in &tuning.speeds {
            if sp.step_coarse <= 0.0 || sp.step_fine <= 0.0 {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "scan steps must be > 0",
                )));
            }
            if !(sp.contrast_ratio > 0.0 && sp.contrast_ratio <= 1.0) {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "contrast_ratio must be in (0.0, 1.0]",
                )));
            }
            if sp.max_slew <= 0.0 {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "max_slew must be > 0",
                )));
            }
            if sp.pdaf_squelch < 0.0 {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "pdaf_squelch must be >= 0",
                )));
            }
            if sp.step_frames == 0 {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "step_frames must be >= 1",
                )));
            }
        }
        if tuning.conf_thresh > tuning.conf_clip {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "conf_thresh must be <= conf_clip",
            )));
        }

        if tuning.map.is_empty() {
            tracing::warn!("no dioptre map configured, using default");
            tuning.map = DEFAULT_MAP.to_vec();
        }
        let map = Pwl::new(tuning.map.clone()).map_err(eyre::Report::new)?;

        let stats_region = self
            .geometry
            .map(|g| g.stats_region())
            .unwrap_or_default();
        let mut weights = Weights::default();
        weights.recompute(&[], false, stats_region);

        Ok(AfController {
            lens,
            tuning,
            map,
            mode: self.mode,
            range: self.range,
            speed: self.speed,
            pause_flag: false,
            stats_region,
            windows: Vec::new(),
            use_windows: false,
            weights,
            scan_state: ScanState::Idle,
            initted: false,
            ftarget: -1.0,
            fsmooth: -1.0,
            prev_contrast: 0.0,
            skip_count: 0,
            pdaf_budget: None,
            step_wait: 0,
            drop_count: 0,
            scan_max_contrast: 0.0,
            scan_min_contrast: 1.0e9,
            scan_max_index: 0,
            scan_data: Vec::with_capacity(24),
            report_state: FocusState::Idle,
            last_hwpos: None,
        })
    }
}

impl<L: afctl_traits::Lens> AfController<L> {
    /// Start building a controller.
    pub fn builder() -> AfBuilder {
        AfBuilder::new()
    }
}
