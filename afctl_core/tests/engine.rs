//! Control-surface and frame-protocol behaviour of the autofocus engine.

use afctl_core::mocks::{FailingLens, MockLens};
use afctl_core::{
    AfBuilder, AfMode, AfPause, AfSpeed, CameraGeometry, FocusState, PauseState, PdafGrid,
    ScanState, TuningParams,
};
use rstest::rstest;

const PDAF_ROWS: usize = 12;
const PDAF_COLS: usize = 16;

fn uniform_grid(phase: i16, conf: u16) -> PdafGrid {
    PdafGrid {
        phase: [[phase; PDAF_COLS]; PDAF_ROWS],
        conf: [[conf; PDAF_COLS]; PDAF_ROWS],
    }
}

/// Tuning with no startup skip and single-frame scan pacing, so tests see
/// one state transition per frame.
fn quick_tuning() -> TuningParams {
    let mut t = TuningParams::default();
    t.skip_frames = 0;
    for sp in &mut t.speeds {
        sp.step_frames = 1;
    }
    t
}

#[test]
fn manual_position_maps_to_hardware_units() {
    let mut af = AfBuilder::new().build(MockLens::default()).unwrap();
    assert_eq!(af.get_mode(), AfMode::Manual);
    assert!(af.get_lens_position().is_none());

    // Map (0, 445) .. (15, 925): 5.0 dioptres lands at 605.
    let (changed, hwpos) = af.set_lens_position(5.0);
    assert!(changed);
    assert_eq!(hwpos, 605);
    assert_eq!(af.get_lens_position(), Some(5.0));

    // Setting the same position again is reported as unchanged.
    let (changed, hwpos) = af.set_lens_position(5.0);
    assert!(!changed);
    assert_eq!(hwpos, 605);

    // Out-of-domain requests are clipped to the map endpoints.
    let (_, hwpos) = af.set_lens_position(100.0);
    assert_eq!(hwpos, 925);
    assert_eq!(af.get_lens_position(), Some(15.0));
}

#[test]
fn frame_start_commands_lens_once_per_position() {
    let mut af = AfBuilder::new().build(MockLens::default()).unwrap();
    af.set_lens_position(5.0);

    let status = af.frame_start(None).unwrap();
    assert_eq!(status.lens_setting, Some(605));
    assert_eq!(status.focus_state, FocusState::Idle);

    // Unchanged position: no second actuator command.
    af.frame_start(None).unwrap();
    assert_eq!(af.lens().positions, vec![605]);
}

#[test]
fn lens_fault_propagates_from_frame_start() {
    let mut af = AfBuilder::new().build(FailingLens).unwrap();
    af.set_lens_position(5.0);
    let err = af.frame_start(None).unwrap_err();
    assert!(format!("{err:#}").contains("lens"));
}

#[test]
fn manual_mode_ignores_triggers() {
    let mut af = AfBuilder::new().build(MockLens::default()).unwrap();
    af.trigger_scan();
    assert_eq!(af.scan_state(), ScanState::Idle);
}

#[test]
fn auto_mode_arms_and_cancels_scans() {
    let mut af = AfBuilder::new().build(MockLens::default()).unwrap();
    af.set_mode(AfMode::Auto);
    af.trigger_scan();
    assert_eq!(af.scan_state(), ScanState::Trigger);
    af.cancel_scan();
    assert_eq!(af.scan_state(), ScanState::Idle);

    // Re-triggering while armed or scanning is a no-op, not a restart.
    af.trigger_scan();
    af.trigger_scan();
    assert_eq!(af.scan_state(), ScanState::Trigger);
}

#[test]
fn continuous_mode_starts_tracking_immediately() {
    let mut af = AfBuilder::new()
        .with_tuning(quick_tuning())
        .build(MockLens::default())
        .unwrap();
    af.set_mode(AfMode::Continuous);
    assert_eq!(af.scan_state(), ScanState::Trigger);

    let status = af.frame_start(Some(&uniform_grid(0, 100))).unwrap();
    assert_eq!(af.scan_state(), ScanState::Pdaf);
    assert_eq!(status.pause_state, PauseState::Running);
}

#[rstest]
#[case(AfPause::Pause)]
#[case(AfPause::Immediate)]
fn pause_before_scanning_goes_idle(#[case] kind: AfPause) {
    let mut af = AfBuilder::new()
        .with_tuning(quick_tuning())
        .build(MockLens::default())
        .unwrap();
    af.set_mode(AfMode::Continuous);
    af.frame_start(Some(&uniform_grid(0, 100))).unwrap();
    assert_eq!(af.scan_state(), ScanState::Pdaf);

    // Tracking counts as pre-scan: both pause kinds stop at once.
    af.pause(kind);
    assert_eq!(af.scan_state(), ScanState::Idle);
    let status = af.frame_start(None).unwrap();
    assert_eq!(status.pause_state, PauseState::Paused);

    // Resume re-arms tracking.
    af.pause(AfPause::Resume);
    assert_eq!(af.scan_state(), ScanState::Trigger);
    let status = af.frame_start(Some(&uniform_grid(0, 100))).unwrap();
    assert_eq!(status.pause_state, PauseState::Running);
    assert_eq!(af.scan_state(), ScanState::Pdaf);
}

#[test]
fn pause_is_continuous_mode_only() {
    let mut af = AfBuilder::new().build(MockLens::default()).unwrap();
    af.set_mode(AfMode::Auto);
    af.trigger_scan();
    af.pause(AfPause::Immediate);
    assert_eq!(af.scan_state(), ScanState::Trigger);
}

/// Drive a Continuous controller into a programmed scan by starving PDAF.
fn drive_to_coarse(af: &mut afctl_core::AfController<MockLens>) {
    af.set_mode(AfMode::Continuous);
    let starved = uniform_grid(0, 0);
    for _ in 0..40 {
        af.frame_start(Some(&starved)).unwrap();
        if af.scan_state() == ScanState::Coarse {
            return;
        }
    }
    panic!("never reached a contrast scan, state {:?}", af.scan_state());
}

#[test]
fn immediate_pause_abandons_scan_in_progress() {
    let mut af = AfBuilder::new()
        .with_tuning(quick_tuning())
        .build(MockLens::default())
        .unwrap();
    drive_to_coarse(&mut af);

    af.pause(AfPause::Immediate);
    assert_eq!(af.scan_state(), ScanState::Idle);
}

#[test]
fn soft_pause_lets_scan_finish() {
    let mut af = AfBuilder::new()
        .with_tuning(quick_tuning())
        .build(MockLens::default())
        .unwrap();
    drive_to_coarse(&mut af);

    af.pause(AfPause::Pause);
    assert!(af.scan_state().in_scan_sequence());
    let status = af.frame_start(Some(&uniform_grid(0, 0))).unwrap();
    assert_eq!(status.pause_state, PauseState::Pausing);
}

#[test]
fn geometry_change_restarts_contrast_scan() {
    let mut af = AfBuilder::new()
        .with_tuning(quick_tuning())
        .build(MockLens::default())
        .unwrap();
    drive_to_coarse(&mut af);

    // Walk the target a few steps into the range.
    for _ in 0..8 {
        af.frame_start(None).unwrap();
    }
    assert!(af.target_position() > 0.0);

    af.switch_mode(CameraGeometry {
        crop_x: 0,
        crop_y: 0,
        width: 2304,
        height: 1296,
        scale_x: 1.0,
        scale_y: 1.0,
    });
    assert_eq!(af.scan_state(), ScanState::Coarse);
    assert_eq!(af.target_position(), 0.0);
}

#[test]
fn speed_change_extends_pdaf_budget_in_flight() {
    // Normal gets a 10 frame budget, Fast 20. A persistent large phase
    // error keeps the loop from finishing early, so the pass runs its
    // budget down and the frame counts expose the extension.
    let mut tuning = TuningParams::default();
    tuning.skip_frames = 0;
    tuning.speeds[AfSpeed::Normal as usize].pdaf_frames = 10;
    tuning.speeds[AfSpeed::Fast as usize].pdaf_frames = 20;

    let frames_to_idle = |extend: bool| {
        let mut af = AfBuilder::new()
            .with_tuning(tuning.clone())
            .with_mode(AfMode::Auto)
            .build(MockLens::default())
            .unwrap();
        af.trigger_scan();
        let grid = uniform_grid(1000, 100);
        for frame in 1..=40 {
            af.frame_start(Some(&grid)).unwrap();
            if af.scan_state() == ScanState::Idle {
                return frame;
            }
            if extend && frame == 1 {
                af.set_speed(AfSpeed::Fast);
            }
        }
        panic!("triggered pass never completed");
    };

    let normal = frames_to_idle(false);
    let extended = frames_to_idle(true);
    assert_eq!(extended - normal, 10, "normal={normal} extended={extended}");
}
