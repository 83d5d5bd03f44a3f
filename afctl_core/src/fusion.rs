//! Signal fusion: reduce the raw statistics grids to a single phase and
//! confidence pair (PDAF) and a single contrast scalar (CDAF), using the
//! metering weight grids.

use crate::types::{CONTRAST_REGIONS, FocusStats, PDAF_COLS, PDAF_ROWS, PdafGrid};
use crate::weights::Weights;

/// Contrast figures are reported left-shifted by this many bits.
const CONTRAST_SHIFT: u32 = 10;

/// Fused PDAF measurement for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSample {
    /// Weighted mean phase difference (sensor units; sign encodes direction).
    pub phase: f64,
    /// Mean admitted confidence, normalized by the total metering weight.
    pub conf: f64,
}

/// Fuse the raw phase/confidence grid into one phase and confidence value.
///
/// Cells below `conf_thresh` are rejected; admitted confidences are clipped
/// to `conf_clip` and biased down by a quarter of the threshold, once for
/// the confidence sum and once more for the phase-weighted sum, so that
/// barely-admitted cells contribute less phase than confidence. Returns
/// `None` when the admitted confidence mass does not reach the total
/// metering weight; the engine treats that as "no usable PDAF this frame".
pub fn phase_from_grid(
    data: &PdafGrid,
    weights: &Weights,
    conf_thresh: u32,
    conf_clip: u32,
) -> Option<PhaseSample> {
    let mut sum_wc: u32 = 0;
    let mut sum_wcp: i64 = 0;

    for i in 0..PDAF_ROWS {
        for j in 0..PDAF_COLS {
            let w = weights.phase()[i][j];
            if w == 0 {
                continue;
            }
            let mut c = data.conf[i][j] as u32;
            if c >= conf_thresh {
                c = c.min(conf_clip);
                c -= conf_thresh >> 2;
                sum_wc += w * c;
                c -= conf_thresh >> 2;
                sum_wcp += (w as i64) * (data.phase[i][j] as i64) * (c as i64);
            }
        }
    }

    let sum_weights = weights.sum();
    if 0 < sum_weights && sum_weights <= sum_wc {
        Some(PhaseSample {
            phase: sum_wcp as f64 / sum_wc as f64,
            conf: sum_wc as f64 / sum_weights as f64,
        })
    } else {
        None
    }
}

/// Weighted-average contrast over the coarse grid, sampling the central
/// figure of each region. Returns 0 when the weights are empty.
pub fn contrast_from_stats(stats: &FocusStats, weights: &Weights) -> f64 {
    let mut sum_wc: u64 = 0;

    for i in 0..CONTRAST_REGIONS {
        let w = weights.contrast()[i] as u64;
        sum_wc += w * (stats[i].contrast_val[1][1] >> CONTRAST_SHIFT) as u64;
    }

    if weights.sum() == 0 {
        0.0
    } else {
        sum_wc as f64 / weights.sum() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FocusRegion, Rect};

    fn default_weights() -> Weights {
        let mut w = Weights::default();
        w.recompute(&[], false, Rect::new(0, 0, 1600, 1200));
        w
    }

    fn uniform_grid(phase: i16, conf: u16) -> PdafGrid {
        PdafGrid {
            phase: [[phase; PDAF_COLS]; PDAF_ROWS],
            conf: [[conf; PDAF_COLS]; PDAF_ROWS],
        }
    }

    fn uniform_stats(contrast: u32) -> FocusStats {
        [FocusRegion {
            contrast_val: [[0, 0], [0, contrast << CONTRAST_SHIFT]],
        }; CONTRAST_REGIONS]
    }

    #[test]
    fn uniform_grid_fuses_to_biased_confidence() {
        let w = default_weights();
        // conf_thresh = 16: admitted conf is biased down by 4 for the sum.
        let s = phase_from_grid(&uniform_grid(100, 100), &w, 16, 512).unwrap();
        assert_eq!(s.conf, 96.0);
        // Phase term carries the second bias: 100 * 92 / 96.
        assert!((s.phase - 100.0 * 92.0 / 96.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_clipped_at_ceiling() {
        let w = default_weights();
        let s = phase_from_grid(&uniform_grid(10, 5000), &w, 16, 512).unwrap();
        assert_eq!(s.conf, 508.0);
    }

    #[test]
    fn below_threshold_cells_are_rejected() {
        let w = default_weights();
        assert!(phase_from_grid(&uniform_grid(100, 15), &w, 16, 512).is_none());
    }

    #[test]
    fn barely_admitted_mass_is_invalid() {
        let w = default_weights();
        // conf 16 -> biased to 12 < sum_weights normalizer per cell fails
        // only when total mass < total weight; conf 16 gives mass 12x weight,
        // which is valid. Zero confidence is not.
        assert!(phase_from_grid(&uniform_grid(100, 0), &w, 16, 512).is_none());
        assert!(phase_from_grid(&uniform_grid(100, 16), &w, 16, 512).is_some());
    }

    #[test]
    fn contrast_weighted_average() {
        let w = default_weights();
        assert_eq!(contrast_from_stats(&uniform_stats(300), &w), 300.0);
    }

    #[test]
    fn contrast_zero_without_weights() {
        let w = Weights::default();
        assert_eq!(contrast_from_stats(&uniform_stats(300), &w), 0.0);
    }

    #[test]
    fn negative_phase_preserved() {
        let w = default_weights();
        let s = phase_from_grid(&uniform_grid(-200, 64), &w, 16, 512).unwrap();
        assert!(s.phase < 0.0);
    }
}
