//! Spatial Calibration Engine
//!
//! Turns the nine orientation samples of the calibration grid into a
//! piecewise-linear mapping from gun angles to absolute pointer coordinates.
//!
//! The grid is walked column by column, snaking vertically:
//!
//! ```text
//!   0 ----- 5 ----- 6      up      = mean pitch of {0, 5, 6}
//!   |       |       |
//!   1       4       7      middle  = mean pitch of {1, 4, 7}
//!   |       |       |
//!   2 ----- 3       8      down    = mean pitch of {2, 3, 8}
//!
//!  left   middle  right    (mean yaw of {0,1,2}, {3,4,5}, {6,7,8})
//! ```

use crate::domain::models::{Orientation, PointerPosition, ScreenSize};
use std::fmt;
use thiserror::Error;

/// Number of calibration targets
pub const GRID_POINTS: usize = 9;

/// Distance between the screen edge and the outer calibration targets
pub const SCREEN_MARGIN_PX: u32 = 30;

/// Upper bound of both absolute pointer axes
pub const AXIS_MAX: i32 = u16::MAX as i32;

const LEFT: [usize; 3] = [0, 1, 2];
const MIDDLE_X: [usize; 3] = [3, 4, 5];
const RIGHT: [usize; 3] = [6, 7, 8];
const UP: [usize; 3] = [0, 5, 6];
const MIDDLE_Y: [usize; 3] = [1, 4, 7];
const DOWN: [usize; 3] = [2, 3, 8];

/// One side of a calibrated axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Down,
    Up,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Down => "down",
            Side::Up => "up",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("calibration needs 9 samples, got {0}")]
    Incomplete(usize),
    #[error("degenerate {side} span: midpoint {midpoint:.3} vs edge {edge:.3}")]
    DegenerateSpan { side: Side, midpoint: f64, edge: f64 },
}

/// Samples collected while walking the calibration grid.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSampleSet {
    samples: [Orientation; GRID_POINTS],
    len: usize,
}

impl CalibrationSampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample at the next free index and return that index, or
    /// `None` if the grid is already full.
    pub fn push(&mut self, sample: Orientation) -> Option<usize> {
        if self.is_complete() {
            return None;
        }
        let index = self.len;
        self.samples[index] = sample;
        self.len += 1;
        Some(index)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_complete(&self) -> bool {
        self.len == GRID_POINTS
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn mean<F>(&self, indices: [usize; 3], axis: F) -> f64
    where
        F: Fn(&Orientation) -> f64,
    {
        indices.iter().map(|&i| axis(&self.samples[i])).sum::<f64>() / 3.0
    }
}

/// Angle-to-pixel mapping derived from a full calibration grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    pub left: f64,
    pub middle_x: f64,
    pub right: f64,
    pub up: f64,
    pub middle_y: f64,
    pub down: f64,
    /// Pixels per degree left of `middle_x`
    pub sx1: f64,
    /// Pixels per degree right of `middle_x`
    pub sx2: f64,
    /// Pixels per degree below `middle_y`
    pub sy1: f64,
    /// Pixels per degree above `middle_y`
    pub sy2: f64,
    pub screen: ScreenSize,
}

impl CalibrationModel {
    pub fn compute(
        samples: &CalibrationSampleSet,
        screen: ScreenSize,
    ) -> Result<Self, CalibrationError> {
        if !samples.is_complete() {
            return Err(CalibrationError::Incomplete(samples.len()));
        }

        let yaw = |o: &Orientation| o.yaw;
        let pitch = |o: &Orientation| o.pitch;

        let left = samples.mean(LEFT, yaw);
        let middle_x = samples.mean(MIDDLE_X, yaw);
        let right = samples.mean(RIGHT, yaw);
        let up = samples.mean(UP, pitch);
        let middle_y = samples.mean(MIDDLE_Y, pitch);
        let down = samples.mean(DOWN, pitch);

        let reach_x = screen.half_width() - f64::from(SCREEN_MARGIN_PX);
        let reach_y = screen.half_height() - f64::from(SCREEN_MARGIN_PX);

        Ok(Self {
            left,
            middle_x,
            right,
            up,
            middle_y,
            down,
            sx1: slope(Side::Left, reach_x, middle_x, left, middle_x - left)?,
            sx2: slope(Side::Right, reach_x, middle_x, right, right - middle_x)?,
            sy1: slope(Side::Down, reach_y, middle_y, down, middle_y - down)?,
            sy2: slope(Side::Up, reach_y, middle_y, up, up - middle_y)?,
            screen,
        })
    }

    /// Project an orientation onto the absolute pointer axes, clamped to
    /// `[0, AXIS_MAX]`.
    pub fn angle_to_screen(&self, yaw: f64, pitch: f64) -> PointerPosition {
        let pixel_x = if yaw < self.middle_x {
            self.screen.half_width() - (self.middle_x - yaw) * self.sx1
        } else {
            self.screen.half_width() + (yaw - self.middle_x) * self.sx2
        };

        // Screen y grows downwards while pitch grows upwards
        let pixel_y = if pitch < self.middle_y {
            self.screen.half_height() + (self.middle_y - pitch) * self.sy1
        } else {
            self.screen.half_height() - (pitch - self.middle_y) * self.sy2
        };

        PointerPosition::new(
            to_axis(pixel_x, self.screen.width),
            to_axis(pixel_y, self.screen.height),
        )
    }
}

fn slope(
    side: Side,
    reach: f64,
    midpoint: f64,
    edge: f64,
    span: f64,
) -> Result<f64, CalibrationError> {
    let value = reach / span;
    if span.abs() < f64::EPSILON || !value.is_finite() {
        return Err(CalibrationError::DegenerateSpan {
            side,
            midpoint,
            edge,
        });
    }
    Ok(value)
}

fn to_axis(pixel: f64, extent: u32) -> i32 {
    let scaled = pixel / f64::from(extent.max(1)) * f64::from(AXIS_MAX);
    // NaN saturates to 0 in the cast
    scaled.clamp(0.0, f64::from(AXIS_MAX)) as i32
}

/// Pixel position of calibration target `index`, in grid walk order.
pub fn target_position(index: usize, screen: ScreenSize) -> (u32, u32) {
    let margin = SCREEN_MARGIN_PX;
    let left = margin;
    let center_x = screen.width / 2;
    let right = screen.width.saturating_sub(margin);
    let top = margin;
    let center_y = screen.height / 2;
    let bottom = screen.height.saturating_sub(margin);

    match index {
        0 => (left, top),
        1 => (left, center_y),
        2 => (left, bottom),
        3 => (center_x, bottom),
        4 => (center_x, center_y),
        5 => (center_x, top),
        6 => (right, top),
        7 => (right, center_y),
        _ => (right, bottom),
    }
}
