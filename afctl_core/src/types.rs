//! Shared geometry and statistics types for the autofocus engine.
//!
//! Grid dimensions are fixed by the ISP: a fine 16x12 PDAF grid and a coarse
//! 4x3 contrast (focus figure-of-merit) grid. The fine grid must block-sum
//! exactly onto the coarse grid, which the asserts below pin down.

/// Rows in the fine PDAF statistics grid.
pub const PDAF_ROWS: usize = 12;
/// Columns in the fine PDAF statistics grid.
pub const PDAF_COLS: usize = 16;
/// Rows in the coarse contrast statistics grid.
pub const CONTRAST_ROWS: usize = 3;
/// Columns in the coarse contrast statistics grid.
pub const CONTRAST_COLS: usize = 4;
/// Total coarse contrast regions.
pub const CONTRAST_REGIONS: usize = CONTRAST_ROWS * CONTRAST_COLS;
/// Maximum number of user metering windows merged into the weight grids.
pub const MAX_WINDOWS: usize = 10;

const _: () = assert!(PDAF_ROWS % CONTRAST_ROWS == 0);
const _: () = assert!(PDAF_COLS % CONTRAST_COLS == 0);

/// Axis-aligned rectangle in sensor pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Per-frame PDAF statistics: a phase difference and a confidence value for
/// every fine-grid cell.
#[derive(Debug, Clone)]
pub struct PdafGrid {
    pub phase: [[i16; PDAF_COLS]; PDAF_ROWS],
    pub conf: [[u16; PDAF_COLS]; PDAF_ROWS],
}

impl Default for PdafGrid {
    fn default() -> Self {
        Self {
            phase: [[0; PDAF_COLS]; PDAF_ROWS],
            conf: [[0; PDAF_COLS]; PDAF_ROWS],
        }
    }
}

/// One coarse-grid contrast region. The ISP reports a 2x2 block of contrast
/// figures per region; fusion samples the central `[1][1]` entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusRegion {
    pub contrast_val: [[u32; 2]; 2],
}

/// Per-frame contrast statistics, one region per coarse-grid cell in
/// row-major order.
pub type FocusStats = [FocusRegion; CONTRAST_REGIONS];

/// Active capture geometry, delivered by the host on sensor mode switches.
/// The statistics grids are assumed to cover the visible crop.
#[derive(Debug, Clone, Copy)]
pub struct CameraGeometry {
    pub crop_x: i32,
    pub crop_y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl CameraGeometry {
    /// Region of the sensor covered by the statistics grids.
    pub fn stats_region(&self) -> Rect {
        Rect {
            x: self.crop_x,
            y: self.crop_y,
            width: (self.width as f64 * self.scale_x) as u32,
            height: (self.height as f64 * self.scale_y) as u32,
        }
    }
}

/// Focus control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfMode {
    /// Lens driven only by `set_lens_position`.
    #[default]
    Manual,
    /// Single scans on `trigger_scan`.
    Auto,
    /// Continuous tracking with automatic rescans.
    Continuous,
}

/// Focus range selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfRange {
    #[default]
    Normal = 0,
    Macro = 1,
    /// Union of Normal and Macro bounds.
    Full = 2,
}

/// Scan/tracking speed preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfSpeed {
    #[default]
    Normal = 0,
    Fast = 1,
}

/// Pause request for Continuous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfPause {
    /// Clear the pause latch; re-arm tracking if not mid-scan.
    Resume,
    /// Latch the pause, letting any scan in progress finish first.
    Pause,
    /// Latch the pause and abandon any scan in progress.
    Immediate,
}
