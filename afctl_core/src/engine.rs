//! The autofocus decision engine.
//!
//! Contains the scan/tracking state machine that drives each frame: PDAF
//! closed-loop control, programmed coarse/fine contrast scans with quadratic
//! peak interpolation, early termination by phase extrapolation, and the
//! slew-rate-limited lens position controller.
//!
//! The host pipeline drives the engine with exactly two calls per frame:
//! [`AfController::frame_start`] early (with the previous frame's PDAF grid,
//! when available), then [`AfController::stats_ready`] once the frame's
//! contrast statistics arrive. Contrast therefore reaches the decision logic
//! one frame late; scans pace their steps to absorb that lag. The control
//! surface may be called between frames only; the engine is not internally
//! synchronized.

use eyre::WrapErr;

use crate::config::{SpeedParams, TuningParams};
use crate::error::AfError;
use crate::fusion;
use crate::pwl::Pwl;
use crate::status::{AfStatus, FocusState, PauseState};
use crate::types::{
    AfMode, AfPause, AfRange, AfSpeed, CameraGeometry, FocusStats, MAX_WINDOWS, PdafGrid, Rect,
};
use crate::weights::Weights;

/// Internal scan state. Use the predicate methods rather than comparing
/// variants positionally; the enum order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    /// Armed; the next frame dispatches into scan-start logic.
    Trigger,
    /// PDAF closed-loop tracking.
    Pdaf,
    /// Programmed contrast scan, large steps across the full range.
    Coarse,
    /// Programmed contrast scan, small steps around the detected peak.
    Fine,
    /// Waiting for the lens to arrive before judging scan success.
    Settle,
}

impl ScanState {
    /// An active contrast sweep that a geometry change must restart.
    pub fn in_contrast_scan(self) -> bool {
        matches!(self, ScanState::Coarse | ScanState::Fine)
    }

    /// Any part of a programmed scan sequence, including settling.
    pub fn in_scan_sequence(self) -> bool {
        matches!(self, ScanState::Coarse | ScanState::Fine | ScanState::Settle)
    }

    /// States in which the target must be clamped to the range bounds.
    pub fn needs_clamping(self) -> bool {
        !matches!(self, ScanState::Idle | ScanState::Trigger)
    }

    /// Before any contrast scan has started (idle, armed, or tracking).
    pub fn pre_scan(self) -> bool {
        matches!(self, ScanState::Idle | ScanState::Trigger | ScanState::Pdaf)
    }
}

/// One recorded scan step.
#[derive(Debug, Clone, Copy)]
pub struct ScanRecord {
    pub focus: f64,
    pub contrast: f64,
    pub phase: f64,
    pub conf: f64,
}

/// Quadratic (Gaussian-shaped) peak interpolation around sample `i`.
///
/// Compares the contrast drop towards each neighbour and nudges the focus
/// value towards the shallower side. The fixed coefficients approximate a
/// Gaussian peak fit; they are part of the tuning contract and must not be
/// "improved" independently of the tuning files.
pub(crate) fn find_peak(data: &[ScanRecord], i: usize) -> f64 {
    let mut f = data[i].focus;

    if i > 0 && i + 1 < data.len() {
        let drop_lo = data[i].contrast - data[i - 1].contrast;
        let drop_hi = data[i].contrast - data[i + 1].contrast;
        if 0.0 <= drop_lo && drop_lo < drop_hi {
            let r = drop_lo / drop_hi;
            f += 0.3125 * (1.0 - r) * (1.6 - r) * (data[i - 1].focus - f);
        } else if 0.0 <= drop_hi && drop_hi < drop_lo {
            let r = drop_hi / drop_lo;
            f += 0.3125 * (1.0 - r) * (1.6 - r) * (data[i + 1].focus - f);
        }
    }

    tracing::debug!(peak = f, "find_peak");
    f
}

/// The autofocus controller, generic over the lens actuator seam.
pub struct AfController<L: afctl_traits::Lens> {
    pub(crate) lens: L,
    pub(crate) tuning: TuningParams,
    pub(crate) map: Pwl,

    pub(crate) mode: AfMode,
    pub(crate) range: AfRange,
    pub(crate) speed: AfSpeed,
    pub(crate) pause_flag: bool,

    pub(crate) stats_region: Rect,
    pub(crate) windows: Vec<Rect>,
    pub(crate) use_windows: bool,
    pub(crate) weights: Weights,

    pub(crate) scan_state: ScanState,
    /// Whether a real lens starting position is known yet.
    pub(crate) initted: bool,
    /// Desired lens position (dioptres).
    pub(crate) ftarget: f64,
    /// Slew-limited actual position (dioptres).
    pub(crate) fsmooth: f64,
    /// Carry-over between the two per-frame entry points: written by
    /// `stats_ready` (late call, frame N), read by `frame_start` (early
    /// call, frame N+1). Nothing else touches it.
    pub(crate) prev_contrast: f64,

    /// Frames still to ignore after startup or a sensor mode change.
    pub(crate) skip_count: u32,
    /// Remaining frames in a triggered PDAF pass; `None` means unbounded
    /// Continuous tracking.
    pub(crate) pdaf_budget: Option<u32>,
    /// Settle countdown between scan steps and at the end of a scan.
    pub(crate) step_wait: u32,
    /// Consecutive low-confidence frames while tracking.
    pub(crate) drop_count: u32,

    pub(crate) scan_max_contrast: f64,
    pub(crate) scan_min_contrast: f64,
    pub(crate) scan_max_index: usize,
    pub(crate) scan_data: Vec<ScanRecord>,

    pub(crate) report_state: FocusState,
    pub(crate) last_hwpos: Option<i32>,
}

impl<L: afctl_traits::Lens> core::fmt::Debug for AfController<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AfController")
            .field("mode", &self.mode)
            .field("scan_state", &self.scan_state)
            .field("ftarget", &self.ftarget)
            .field("fsmooth", &self.fsmooth)
            .finish()
    }
}

impl<L: afctl_traits::Lens> AfController<L> {
    fn speed_params(&self) -> &SpeedParams {
        self.tuning.speed(self.speed)
    }

    // ── Per-frame entry points ───────────────────────────────────────────

    /// Early per-frame call, before capture, carrying the previous frame's
    /// PDAF grid when the sensor provided one. Runs the decision logic,
    /// updates the smoothed lens position, commands the lens, and returns
    /// the status record to publish. Must be called before `stats_ready`
    /// within a frame.
    pub fn frame_start(&mut self, pdaf: Option<&PdafGrid>) -> crate::error::Result<AfStatus> {
        if self.scan_state == ScanState::Trigger {
            self.start_af();
        }

        if self.initted {
            let (phase, conf) = pdaf
                .and_then(|d| {
                    fusion::phase_from_grid(
                        d,
                        &self.weights,
                        self.tuning.conf_thresh,
                        self.tuning.conf_clip,
                    )
                })
                .map_or((0.0, 0.0), |s| (s.phase, s.conf));
            let old_state = self.scan_state;
            self.do_af(self.prev_contrast, phase, conf);
            self.update_lens_position();
            tracing::trace!(
                ?old_state,
                new_state = ?self.scan_state,
                ftarget = self.ftarget,
                fsmooth = self.fsmooth,
                contrast = self.prev_contrast,
                phase,
                conf,
                "frame"
            );
        }

        let status = self.status();
        if let Some(hwpos) = status.lens_setting
            && self.last_hwpos != Some(hwpos)
        {
            self.lens
                .set_position(hwpos)
                .map_err(|e| eyre::Report::new(AfError::Lens(e.to_string())))
                .wrap_err("lens set_position")?;
            self.last_hwpos = Some(hwpos);
        }
        Ok(status)
    }

    /// Late per-frame call with the frame's contrast statistics. The fused
    /// contrast is consumed by the next `frame_start`.
    pub fn stats_ready(&mut self, stats: &FocusStats) {
        self.prev_contrast = fusion::contrast_from_stats(stats, &self.weights);
    }

    /// Handle a sensor mode / crop geometry change: re-derive the stats
    /// region, rebuild the weight grids, restart any contrast scan in
    /// flight (its statistics are no longer comparable), and impose the
    /// pipeline-latency skip.
    pub fn switch_mode(&mut self, geometry: CameraGeometry) {
        self.stats_region = geometry.stats_region();
        tracing::debug!(region = ?self.stats_region, "switch_mode");
        self.weights
            .recompute(&self.windows, self.use_windows, self.stats_region);

        if self.scan_state.in_contrast_scan() {
            self.start_programmed_scan();
        }
        self.skip_count = self.tuning.skip_frames;
    }

    fn status(&self) -> AfStatus {
        let pause_state = if self.pause_flag {
            if self.scan_state == ScanState::Idle {
                PauseState::Paused
            } else {
                PauseState::Pausing
            }
        } else {
            PauseState::Running
        };

        // In Auto mode the latched result only becomes visible once the
        // whole sequence (including settling) has finished.
        let focus_state = if self.mode == AfMode::Auto && self.scan_state != ScanState::Idle {
            FocusState::Scanning
        } else {
            self.report_state
        };

        AfStatus {
            pause_state,
            focus_state,
            lens_setting: self.initted.then(|| self.map.eval_hw(self.fsmooth)),
        }
    }

    // ── Decision logic ───────────────────────────────────────────────────

    fn do_af(&mut self, contrast: f64, phase: f64, conf: f64) {
        if self.skip_count > 0 {
            tracing::trace!("skip");
            self.skip_count -= 1;
            return;
        }

        if self.scan_state == ScanState::Pdaf {
            // Closed-loop tracking whenever PDAF confidence holds up. The
            // threshold rises once frames start dropping out, so recovery
            // needs a genuinely confident frame, and a programmed scan only
            // starts after a sustained dropout.
            let threshold = if self.drop_count > 0 { 1.0 } else { 0.25 };
            if conf > threshold * self.tuning.conf_epsilon as f64 {
                self.do_pdaf(phase, conf);
                match self.pdaf_budget {
                    None => {}
                    Some(0) => {
                        if self.mode != AfMode::Continuous {
                            self.scan_state = ScanState::Idle;
                        }
                    }
                    Some(n) => self.pdaf_budget = Some(n - 1),
                }
                self.drop_count = 0;
            } else {
                self.drop_count = self.drop_count.saturating_add(1);
                if self.drop_count == self.speed_params().dropout_frames {
                    self.start_programmed_scan();
                }
            }
        } else if self.scan_state.in_scan_sequence() && self.fsmooth == self.ftarget {
            // Programmed scan. Steps are paced so CDAF statistics for the
            // previous position have arrived before the next decision.
            if self.step_wait > 0 {
                self.step_wait -= 1;
            } else if self.scan_state == ScanState::Settle {
                self.finish_scan();
            } else if conf >= self.tuning.conf_epsilon as f64
                && self.early_termination_by_phase(phase)
            {
                self.scan_state = ScanState::Settle;
                self.step_wait = if self.mode == AfMode::Continuous {
                    0
                } else {
                    self.speed_params().step_frames
                };
            } else {
                self.do_scan(contrast, phase, conf);
            }
        }
    }

    /// One PDAF closed-loop iteration: gain, damping/squelch, slew clamp.
    fn do_pdaf(&mut self, mut phase: f64, conf: f64) {
        let sp = *self.speed_params();
        phase *= sp.pdaf_gain;

        if self.mode == AfMode::Continuous {
            // Damp small or low-confidence corrections to suppress wobble.
            phase *= conf / (conf + self.tuning.conf_epsilon as f64);
            if phase.abs() < sp.pdaf_squelch {
                let a = phase / sp.pdaf_squelch;
                phase *= a * a;
            }
        } else if let Some(budget) = self.pdaf_budget {
            // Triggered pass: allow an early finish once the correction is
            // small, and ramp movements down towards the end of the pass so
            // the image is stable when the sequence completes.
            if budget >= sp.step_frames {
                if phase.abs() < sp.pdaf_squelch {
                    self.pdaf_budget = Some(sp.step_frames);
                }
            } else {
                phase *= budget as f64 / sp.step_frames as f64;
            }
        }

        let range = self.tuning.range(self.range);
        if phase < -sp.max_slew {
            phase = -sp.max_slew;
            self.report_state = if self.ftarget <= range.focus_min {
                FocusState::Failed
            } else {
                FocusState::Scanning
            };
        } else if phase > sp.max_slew {
            phase = sp.max_slew;
            self.report_state = if self.ftarget >= range.focus_max {
                FocusState::Failed
            } else {
                FocusState::Scanning
            };
        } else {
            self.report_state = FocusState::Focused;
        }

        self.ftarget = self.fsmooth + phase;
    }

    /// Extrapolate the zero-phase lens position from the last scan sample
    /// and the current phase. Accepting requires a confident previous
    /// sample, a consistent gradient sign, and a well-conditioned
    /// interpolation parameter.
    fn early_termination_by_phase(&mut self, phase: f64) -> bool {
        if let Some(last) = self.scan_data.last().copied()
            && last.conf >= self.tuning.conf_epsilon as f64
        {
            let old_focus = last.focus;
            let old_phase = last.phase;
            if (self.ftarget - old_focus) * (phase - old_phase) > 0.0 {
                let param = phase / (phase - old_phase);
                if (-3.0..=3.5).contains(&param) {
                    self.ftarget += param * (old_focus - self.ftarget);
                    tracing::debug!(param, ftarget = self.ftarget, "early termination by phase");
                    return true;
                }
            }
        }
        false
    }

    /// One programmed scan step: record the sample, then either advance the
    /// target or terminate the current phase of the scan.
    fn do_scan(&mut self, contrast: f64, phase: f64, conf: f64) {
        if self.scan_data.is_empty() || contrast > self.scan_max_contrast {
            self.scan_max_contrast = contrast;
            self.scan_max_index = self.scan_data.len();
        }
        if contrast < self.scan_min_contrast {
            self.scan_min_contrast = contrast;
        }
        self.scan_data.push(ScanRecord {
            focus: self.ftarget,
            contrast,
            phase,
            conf,
        });

        let sp = *self.speed_params();
        let range = *self.tuning.range(self.range);
        if self.scan_state == ScanState::Coarse {
            if self.ftarget >= range.focus_max
                || contrast < sp.contrast_ratio * self.scan_max_contrast
            {
                // Coarse sweep done; jump to just past the best sample and
                // sweep back down in fine steps.
                self.ftarget = self
                    .ftarget
                    .min(find_peak(&self.scan_data, self.scan_max_index) + 2.0 * sp.step_fine);
                self.scan_state = ScanState::Fine;
                self.scan_data.clear();
            } else {
                self.ftarget += sp.step_coarse;
            }
        } else {
            // ScanState::Fine
            if self.ftarget <= range.focus_min
                || self.scan_data.len() >= 5
                || contrast < sp.contrast_ratio * self.scan_max_contrast
            {
                self.ftarget = find_peak(&self.scan_data, self.scan_max_index);
                self.scan_state = ScanState::Settle;
            } else {
                self.ftarget -= sp.step_fine;
            }
        }

        // No settle delay needed when the lens is already at the target.
        self.step_wait = if self.ftarget == self.fsmooth {
            0
        } else {
            sp.step_frames
        };
    }

    /// End of the settle period: judge the scan and either resume tracking
    /// (Continuous) or go idle.
    fn finish_scan(&mut self) {
        let sp = *self.speed_params();
        let threshold = sp.contrast_ratio * self.scan_max_contrast;
        self.report_state =
            if self.prev_contrast >= threshold && self.scan_min_contrast <= threshold {
                FocusState::Focused
            } else {
                FocusState::Failed
            };
        tracing::debug!(result = ?self.report_state, "scan finished");

        if self.mode == AfMode::Continuous && !self.pause_flag && sp.dropout_frames > 0 {
            self.scan_state = ScanState::Pdaf;
            self.pdaf_budget = None;
        } else {
            self.scan_state = ScanState::Idle;
        }
        self.scan_data.clear();
    }

    // ── Lens position controller ─────────────────────────────────────────

    /// Clamp the target into the active range when scanning or tracking,
    /// then move the smoothed position towards it under the slew limit.
    fn update_lens_position(&mut self) {
        if self.scan_state.needs_clamping() {
            let range = self.tuning.range(self.range);
            self.ftarget = self.ftarget.clamp(range.focus_min, range.focus_max);
        }

        if self.initted {
            let slew = self.speed_params().max_slew;
            self.fsmooth = self.ftarget.clamp(self.fsmooth - slew, self.fsmooth + slew);
        } else {
            // From an unknown position: snap to the target, then allow the
            // sensor/ISP pipeline latency before trusting new statistics.
            self.fsmooth = self.ftarget;
            self.initted = true;
            self.skip_count = self.tuning.skip_frames;
        }
    }

    // ── Scan lifecycle ───────────────────────────────────────────────────

    fn start_af(&mut self) {
        let sp = *self.speed_params();
        // PDAF when the tuning allows it; else straight to a contrast scan.
        if sp.dropout_frames > 0 && (self.mode == AfMode::Continuous || sp.pdaf_frames > 0) {
            if !self.initted {
                self.ftarget = self.tuning.range(self.range).focus_default;
                self.update_lens_position();
            }
            self.pdaf_budget = if self.mode == AfMode::Continuous {
                None
            } else {
                Some(sp.pdaf_frames)
            };
            self.scan_state = ScanState::Pdaf;
            self.scan_data.clear();
            self.drop_count = 0;
            self.report_state = FocusState::Scanning;
        } else {
            self.start_programmed_scan();
        }
    }

    fn start_programmed_scan(&mut self) {
        self.ftarget = self.tuning.range(self.range).focus_min;
        self.update_lens_position();
        self.scan_state = ScanState::Coarse;
        self.scan_max_contrast = 0.0;
        self.scan_min_contrast = 1.0e9;
        self.scan_max_index = 0;
        self.scan_data.clear();
        self.step_wait = self.speed_params().step_frames;
        self.report_state = FocusState::Scanning;
    }

    fn go_idle(&mut self) {
        self.scan_state = ScanState::Idle;
        self.report_state = FocusState::Idle;
        self.scan_data.clear();
    }

    // ── Control surface (host/application thread, between frames) ────────

    pub fn set_mode(&mut self, mode: AfMode) {
        if self.mode != mode {
            tracing::debug!(?mode, "set_mode");
            self.mode = mode;
            self.pause_flag = false;
            if mode == AfMode::Continuous {
                self.scan_state = ScanState::Trigger;
            } else if mode != AfMode::Auto || self.scan_state.pre_scan() {
                self.go_idle();
            }
        }
    }

    pub fn get_mode(&self) -> AfMode {
        self.mode
    }

    /// Arm a single scan. Only effective in Auto mode while idle.
    pub fn trigger_scan(&mut self) {
        tracing::debug!("trigger_scan");
        if self.mode == AfMode::Auto && self.scan_state == ScanState::Idle {
            self.scan_state = ScanState::Trigger;
        }
    }

    /// Abandon any scan in progress. Only effective in Auto mode.
    pub fn cancel_scan(&mut self) {
        tracing::debug!("cancel_scan");
        if self.mode == AfMode::Auto {
            self.go_idle();
        }
    }

    /// Pause or resume Continuous tracking. `Pause` lets a scan in progress
    /// finish; `Immediate` abandons it.
    pub fn pause(&mut self, pause: AfPause) {
        tracing::debug!(?pause, "pause");
        if self.mode != AfMode::Continuous {
            return;
        }
        if pause == AfPause::Resume && self.pause_flag {
            self.pause_flag = false;
            if self.scan_state.pre_scan() {
                self.scan_state = ScanState::Trigger;
            }
        } else if pause != AfPause::Resume && !self.pause_flag {
            self.pause_flag = true;
            if pause == AfPause::Immediate || self.scan_state.pre_scan() {
                self.go_idle();
            }
        }
    }

    pub fn set_range(&mut self, range: AfRange) {
        tracing::debug!(?range, "set_range");
        self.range = range;
    }

    /// Change the speed preset. A change while PDAF tracking extends the
    /// in-flight budget by the increase in the new preset's frame budget,
    /// so the pass is not truncated mid-sequence.
    pub fn set_speed(&mut self, speed: AfSpeed) {
        tracing::debug!(?speed, "set_speed");
        if self.scan_state == ScanState::Pdaf
            && let Some(n) = self.pdaf_budget
        {
            let old = self.speed_params().pdaf_frames;
            let new = self.tuning.speed(speed).pdaf_frames;
            if new > old {
                self.pdaf_budget = Some(n + (new - old));
            }
        }
        self.speed = speed;
    }

    /// Toggle window-based metering; recomputes the weight grids.
    pub fn set_metering(&mut self, use_windows: bool) {
        if self.use_windows != use_windows {
            self.use_windows = use_windows;
            self.weights
                .recompute(&self.windows, self.use_windows, self.stats_region);
        }
    }

    /// Replace the metering windows (at most [`MAX_WINDOWS`] are kept) and
    /// recompute the weight grids.
    pub fn set_windows(&mut self, windows: &[Rect]) {
        self.windows.clear();
        for w in windows.iter().take(MAX_WINDOWS) {
            tracing::debug!(window = ?w, "set_windows");
            self.windows.push(*w);
        }
        self.weights
            .recompute(&self.windows, self.use_windows, self.stats_region);
    }

    /// Manual positioning: set the target in dioptres (clipped to the map
    /// domain). Returns whether the target changed, plus the mapped
    /// hardware position for the smoothed lens position. Only effective in
    /// Manual mode.
    pub fn set_lens_position(&mut self, dioptres: f64) -> (bool, i32) {
        let mut changed = false;

        if self.mode == AfMode::Manual {
            tracing::debug!(dioptres, "set_lens_position");
            self.ftarget = self.map.domain().clip(dioptres);
            changed = !(self.initted && self.fsmooth == self.ftarget);
            self.update_lens_position();
        }

        (changed, self.map.eval_hw(self.fsmooth))
    }

    /// Best-known current lens position in dioptres, once known.
    pub fn get_lens_position(&self) -> Option<f64> {
        self.initted.then_some(self.fsmooth)
    }

    // ── Telemetry ────────────────────────────────────────────────────────

    pub fn scan_state(&self) -> ScanState {
        self.scan_state
    }

    /// Access the lens actuator, e.g. for shutdown or inspection in tests.
    pub fn lens(&self) -> &L {
        &self.lens
    }

    /// Current desired lens position in dioptres.
    pub fn target_position(&self) -> f64 {
        self.ftarget
    }
}
