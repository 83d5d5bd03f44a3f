//! Piecewise-linear mapping from dioptres to hardware lens units.

use crate::error::BuildError;

/// Closed interval on the dioptre axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Clamp `x` into the interval.
    pub fn clip(&self, x: f64) -> f64 {
        x.clamp(self.start, self.end)
    }

    pub fn contains(&self, x: f64) -> bool {
        (self.start..=self.end).contains(&x)
    }
}

/// Sorted, monotonic piecewise-linear curve. Construction enforces at least
/// two points, strictly increasing x, and a y axis that never changes
/// direction; `eval` assumes a valid curve.
#[derive(Debug, Clone)]
pub struct Pwl {
    points: Vec<(f64, f64)>,
}

impl Pwl {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, BuildError> {
        if points.len() < 2 {
            return Err(BuildError::MapTooShort);
        }
        // Descending y is fine (some actuators count the other way); a
        // direction change is not.
        let mut dir: i8 = 0;
        for i in 1..points.len() {
            if points[i].0 <= points[i - 1].0 {
                return Err(BuildError::MapNotMonotonic);
            }
            let dy = points[i].1 - points[i - 1].1;
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
                    return Err(BuildError::MapDirectionChanges);
                }
            }
        }
        Ok(Self { points })
    }

    /// Defined domain on the dioptre axis.
    pub fn domain(&self) -> Interval {
        Interval {
            start: self.points[0].0,
            end: self.points[self.points.len() - 1].0,
        }
    }

    /// Interpolate at `x`; inputs beyond the domain extrapolate along the
    /// end segments.
    pub fn eval(&self, x: f64) -> f64 {
        // Index of the segment whose start is the last point with x0 <= x,
        // clamped so out-of-domain inputs use the end segments.
        let mut i = self
            .points
            .partition_point(|p| p.0 <= x)
            .saturating_sub(1);
        if i + 1 >= self.points.len() {
            i = self.points.len() - 2;
        }
        let (x0, y0) = self.points[i];
        let (x1, y1) = self.points[i + 1];
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }

    /// Evaluate and round to the nearest hardware unit.
    pub fn eval_hw(&self, x: f64) -> i32 {
        self.eval(x).round() as i32
    }
}
