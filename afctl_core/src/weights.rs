//! Metering-window weighting.
//!
//! Converts the user's metering windows (or a default center-weighted region)
//! into two weight grids: a fine grid aligned with the PDAF statistics and a
//! coarse grid aligned with the contrast statistics. The grids only change
//! when the windows, the metering mode, or the capture geometry change; the
//! per-frame fusion treats them as read-only.

use crate::types::{
    CONTRAST_COLS, CONTRAST_REGIONS, CONTRAST_ROWS, MAX_WINDOWS, PDAF_COLS, PDAF_ROWS, Rect,
};

/// Per-window weight ceiling for one fine-grid cell. Summing all windows at
/// full overlap keeps the total cell weight within 240.
pub const MAX_CELL_WEIGHT: u32 = 240 / MAX_WINDOWS as u32;

/// The fine/coarse weight grids plus their common normalizer.
#[derive(Debug, Clone)]
pub struct Weights {
    phase: [[u32; PDAF_COLS]; PDAF_ROWS],
    contrast: [u32; CONTRAST_REGIONS],
    sum: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            phase: [[0; PDAF_COLS]; PDAF_ROWS],
            contrast: [0; CONTRAST_REGIONS],
            sum: 0,
        }
    }
}

impl Weights {
    pub fn phase(&self) -> &[[u32; PDAF_COLS]; PDAF_ROWS] {
        &self.phase
    }

    pub fn contrast(&self) -> &[u32; CONTRAST_REGIONS] {
        &self.contrast
    }

    /// Total fine-grid weight; the fusion normalizer. Guaranteed nonzero
    /// after `recompute` by the default-region fallback.
    pub fn sum(&self) -> u32 {
        self.sum
    }

    /// Rebuild both grids from the given windows and statistics region.
    ///
    /// Windows are merged by overlap area: each window contributes up to
    /// `MAX_CELL_WEIGHT` per cell, proportional to how much of the cell it
    /// covers, and overlapping windows add without clamping. When windows
    /// are disabled or the region is smaller than the fine grid, a default
    /// center-weighted region is used instead (middle 1/2 width of the
    /// middle 1/3 height, which maps cleanly onto both grids).
    pub fn recompute(&mut self, windows: &[Rect], use_windows: bool, stats_region: Rect) {
        self.sum = 0;
        self.phase = [[0; PDAF_COLS]; PDAF_ROWS];

        if use_windows
            && stats_region.width >= PDAF_COLS as u32
            && stats_region.height >= PDAF_ROWS as u32
        {
            // Signed cell arithmetic: window x/y may be negative relative to
            // the crop origin.
            let cell_h = (stats_region.height / PDAF_ROWS as u32) as i32;
            let cell_w = (stats_region.width / PDAF_COLS as u32) as i32;
            let cell_a = cell_h * cell_w;

            for w in windows.iter().take(MAX_WINDOWS) {
                for i in 0..PDAF_ROWS {
                    let y0 = (stats_region.y + cell_h * i as i32).max(w.y);
                    let y1 = (stats_region.y + cell_h * (i as i32 + 1)).min(w.y + w.height as i32);
                    if y0 >= y1 {
                        continue;
                    }
                    let dy = y1 - y0;
                    for j in 0..PDAF_COLS {
                        let x0 = (stats_region.x + cell_w * j as i32).max(w.x);
                        let x1 =
                            (stats_region.x + cell_w * (j as i32 + 1)).min(w.x + w.width as i32);
                        if x0 >= x1 {
                            continue;
                        }
                        let a = dy * (x1 - x0);
                        // Ceiling division so any nonzero overlap contributes.
                        let a = (MAX_CELL_WEIGHT as i32 * a + cell_a - 1) / cell_a;
                        self.phase[i][j] += a as u32;
                        self.sum += a as u32;
                    }
                }
            }
        }

        if self.sum == 0 {
            for row in self.phase.iter_mut().take(2 * PDAF_ROWS / 3).skip(PDAF_ROWS / 3) {
                for cell in row.iter_mut().take(3 * PDAF_COLS / 4).skip(PDAF_COLS / 4) {
                    *cell = MAX_CELL_WEIGHT;
                    self.sum += MAX_CELL_WEIGHT;
                }
            }
        }

        // Block-sum the fine grid onto the coarse contrast grid.
        const Y_FACTOR: usize = PDAF_ROWS / CONTRAST_ROWS;
        const X_FACTOR: usize = PDAF_COLS / CONTRAST_COLS;
        for i in 0..CONTRAST_ROWS {
            for j in 0..CONTRAST_COLS {
                let mut w = 0u32;
                for y in 0..Y_FACTOR {
                    for x in 0..X_FACTOR {
                        w += self.phase[Y_FACTOR * i + y][X_FACTOR * j + x];
                    }
                }
                self.contrast[CONTRAST_COLS * i + j] = w;
            }
        }
        tracing::debug!(sum = self.sum, "recomputed metering weights");
    }
}
