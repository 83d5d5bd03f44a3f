#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Camera autofocus decision engine (hardware-agnostic).
//!
//! Fuses per-frame phase-detection (PDAF) and contrast-detection (CDAF)
//! statistics into lens actuator commands under an explicit state machine.
//! All hardware interaction goes through `afctl_traits::Lens`; statistics
//! arrive as plain grids from the host pipeline.
//!
//! ## Architecture
//!
//! - **Configuration**: validated runtime tuning (`config` module) plus the
//!   dioptre → hardware position map (`pwl` module)
//! - **Weighting**: metering windows → fine/coarse weight grids (`weights`)
//! - **Fusion**: weight grids × raw statistics → one phase/confidence pair
//!   and one contrast scalar (`fusion`)
//! - **Engine**: scan/tracking state machine and lens position smoothing
//!   (`engine`), built via `builder`
//! - **Status**: per-frame record published to the host (`status`)
//!
//! ## Frame protocol
//!
//! Two calls per frame, in order: `frame_start` (early; PDAF data, decision,
//! lens command, status) then `stats_ready` (late; contrast statistics,
//! consumed by the next frame). The control surface must be serialized with
//! frame processing by the host.

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod mocks;
pub mod pwl;
pub mod status;
pub mod types;
pub mod weights;

pub use builder::AfBuilder;
pub use config::{RangeParams, SpeedParams, TuningParams};
pub use engine::{AfController, ScanRecord, ScanState};
pub use error::{AfError, BuildError, Result};
pub use fusion::PhaseSample;
pub use pwl::{Interval, Pwl};
pub use status::{AfStatus, FocusState, PauseState};
pub use types::{
    AfMode, AfPause, AfRange, AfSpeed, CameraGeometry, FocusRegion, FocusStats, PdafGrid, Rect,
};
pub use weights::Weights;
