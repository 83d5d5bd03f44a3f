//! Property-based invariants for the engine: slew limiting, range
//! clamping, scan termination, and manual request clipping.

use afctl_core::mocks::MockLens;
use afctl_core::{
    AfBuilder, AfMode, FocusRegion, FocusStats, PdafGrid, ScanState, TuningParams,
};
use proptest::prelude::*;

const PDAF_ROWS: usize = 12;
const PDAF_COLS: usize = 16;
const CONTRAST_REGIONS: usize = 12;

fn uniform_grid(phase: i16, conf: u16) -> PdafGrid {
    PdafGrid {
        phase: [[phase; PDAF_COLS]; PDAF_ROWS],
        conf: [[conf; PDAF_COLS]; PDAF_ROWS],
    }
}

fn stats_for(contrast: u32) -> FocusStats {
    [FocusRegion {
        contrast_val: [[0, 0], [0, contrast << 10]],
    }; CONTRAST_REGIONS]
}

fn quick_tuning() -> TuningParams {
    let mut t = TuningParams::default();
    t.skip_frames = 0;
    for sp in &mut t.speeds {
        sp.step_frames = 1;
    }
    t
}

proptest! {
    /// However wild the statistics, the lens never moves more than
    /// max_slew per frame and never leaves the focus range while active.
    #[test]
    fn lens_motion_is_slew_limited_and_in_range(
        frames in prop::collection::vec(
            (any::<i16>(), any::<u16>(), 0u32..4000),
            1..60,
        )
    ) {
        let tuning = quick_tuning();
        let max_slew = tuning.speeds[0].max_slew;
        let (lo, hi) = (tuning.ranges[0].focus_min, tuning.ranges[0].focus_max);

        let mut af = AfBuilder::new()
            .with_tuning(tuning)
            .build(MockLens::default())
            .unwrap();
        af.set_mode(AfMode::Continuous);

        let mut prev = None;
        for (phase, conf, contrast) in frames {
            af.frame_start(Some(&uniform_grid(phase, conf))).unwrap();
            af.stats_ready(&stats_for(contrast));

            let pos = af.get_lens_position().unwrap();
            if let Some(prev) = prev {
                let step: f64 = pos - prev;
                prop_assert!(step.abs() <= max_slew + 1e-9, "step {step}");
            }
            if af.scan_state().needs_clamping() {
                prop_assert!((lo..=hi).contains(&pos), "pos {pos}");
            }
            prev = Some(pos);
        }
    }

    /// A triggered contrast scan always terminates, whatever the scene
    /// looks like, and any reported peak lies within the focus range.
    #[test]
    fn triggered_scan_terminates(
        peak_at in 0.0f64..12.0,
        sigma in 1.0f64..5.0,
    ) {
        let mut tuning = quick_tuning();
        for sp in &mut tuning.speeds {
            sp.dropout_frames = 0;
        }
        let mut af = AfBuilder::new()
            .with_tuning(tuning)
            .with_mode(AfMode::Auto)
            .build(MockLens::default())
            .unwrap();
        af.trigger_scan();

        let mut done = false;
        for _ in 0..100 {
            af.frame_start(None).unwrap();
            let pos = af.get_lens_position().unwrap_or(0.0);
            let d = (pos - peak_at) / sigma;
            af.stats_ready(&stats_for((1000.0 * (-d * d).exp()) as u32));
            if af.scan_state() == ScanState::Idle {
                done = true;
                break;
            }
        }
        prop_assert!(done, "scan still in {:?}", af.scan_state());
        prop_assert!((0.0..=12.0).contains(&af.target_position()));
    }

    /// Manual requests are clipped to the map domain and always produce a
    /// hardware position between the map endpoints.
    #[test]
    fn manual_requests_clip_to_map(dioptres in -100.0f64..100.0) {
        let mut af = AfBuilder::new().build(MockLens::default()).unwrap();
        let (_, hwpos) = af.set_lens_position(dioptres);
        prop_assert!((445..=925).contains(&hwpos), "hwpos {hwpos}");
        let pos = af.get_lens_position().unwrap();
        prop_assert!((0.0..=15.0).contains(&pos));
    }
}
