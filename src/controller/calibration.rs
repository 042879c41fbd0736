//! # Calibration Module
//!
//! Applies calibration offsets to raw samples and decides which samples are
//! worth turning into commands.
//!
//! ## Offset
//!
//! Calibrating captures the current reading as the neutral position. The
//! stored offset is the negated baseline, so adding it to later samples
//! makes the neutral reading zero.
//!
//! ## Send Gate
//!
//! A filtered sample is sent only if both gates pass:
//!
//! - **Position**: at least one axis is further than `position` (0.1) from zero.
//!   Idle noise around center never produces traffic.
//! - **Movement**: at least one axis moved more than `movement` (0.01) since
//!   the previous tick. A stick held steady off-center does not flood output.
//!
//! ## Usage
//!
//! ```
//! use lisu_bridge::controller::calibration::{apply, calibrate, should_send, Thresholds};
//! use lisu_bridge::controller::sampler::AxisSample;
//!
//! let baseline = AxisSample::new(0.02, -0.03);
//! let offset = calibrate(baseline);
//!
//! let filtered = apply(AxisSample::new(0.52, -0.03), offset);
//! assert!((filtered.x - 0.5).abs() < 1e-6);
//! assert!(should_send(filtered, AxisSample::zero(), &Thresholds::default()));
//! ```

use serde::{Deserialize, Serialize};

use super::sampler::{AxisSample, FilteredSample, RawSample};

/// Minimum magnitude on some axis before a sample is sent.
pub const POSITION_THRESHOLD: f32 = 0.1;

/// Minimum change on some axis since the previous tick before a sample is sent.
pub const MOVEMENT_DELTA: f32 = 0.01;

/// Per-axis offset added to raw samples.
///
/// Zero until the device is calibrated; discarded on disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOffset {
    /// Offset added to the physical X axis.
    pub x: f32,
    /// Offset added to the physical Y axis.
    pub y: f32,
}

impl CalibrationOffset {
    /// No correction.
    #[must_use]
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Whether this offset is the zero offset.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl From<CalibrationOffset> for AxisSample {
    fn from(offset: CalibrationOffset) -> Self {
        AxisSample::new(offset.x, offset.y)
    }
}

/// Thresholds for the send gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Absolute-position gate.
    pub position: f32,
    /// Movement gate.
    pub movement: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            position: POSITION_THRESHOLD,
            movement: MOVEMENT_DELTA,
        }
    }
}

impl Thresholds {
    /// Creates thresholds, clamping negative values to zero.
    #[must_use]
    pub fn new(position: f32, movement: f32) -> Self {
        Self {
            position: position.max(0.0),
            movement: movement.max(0.0),
        }
    }
}

/// Adds the stored offset to each raw axis value.
///
/// # Examples
///
/// ```
/// use lisu_bridge::controller::calibration::{apply, CalibrationOffset};
/// use lisu_bridge::controller::sampler::AxisSample;
///
/// let offset = CalibrationOffset { x: -0.1, y: 0.2 };
/// let filtered = apply(AxisSample::new(0.3, -0.2), offset);
/// assert!((filtered.x - 0.2).abs() < 1e-6);
/// assert!(filtered.y.abs() < 1e-6);
/// ```
#[must_use]
pub fn apply(raw: RawSample, offset: CalibrationOffset) -> FilteredSample {
    raw + AxisSample::from(offset)
}

/// Captures `current` as the neutral position.
///
/// Idempotent: calibrating twice on the same reading gives the same offset.
#[must_use]
pub fn calibrate(current: RawSample) -> CalibrationOffset {
    let negated = -current;
    CalibrationOffset {
        x: negated.x,
        y: negated.y,
    }
}

/// Decides whether `filtered` represents significant movement.
///
/// Both the position and the movement gate must pass.
#[must_use]
pub fn should_send(filtered: FilteredSample, previous: FilteredSample, thresholds: &Thresholds) -> bool {
    let beyond_threshold = filtered
        .axes()
        .iter()
        .any(|value| value.abs() > thresholds.position);

    let delta = filtered - previous;
    let moved = delta.axes().iter().any(|d| d.abs() > thresholds.movement);

    beyond_threshold && moved
}

/// Converts a raw absolute axis value to the -1.0..1.0 range.
///
/// `min` maps to -1.0 and `max` to 1.0. A degenerate range reads as center.
///
/// # Examples
///
/// ```
/// use lisu_bridge::controller::calibration::normalize_axis;
///
/// assert!((normalize_axis(0, 0, 255) - (-1.0)).abs() < 0.01);
/// assert!(normalize_axis(128, 0, 256).abs() < 0.01);
/// assert!((normalize_axis(32767, -32768, 32767) - 1.0).abs() < 0.01);
/// ```
#[must_use]
pub fn normalize_axis(raw: i32, min: i32, max: i32) -> f32 {
    if max <= min {
        return 0.0;
    }
    let span = (max as f32) - (min as f32);
    let scaled = ((raw as f32) - (min as f32)) / span * 2.0 - 1.0;
    scaled.clamp(-1.0, 1.0)
}

/// Converts a relative motion count to the -1.0..1.0 range.
#[must_use]
pub fn normalize_relative(counts: f32, counts_per_unit: f32) -> f32 {
    if counts_per_unit <= 0.0 {
        return 0.0;
    }
    (counts / counts_per_unit).clamp(-1.0, 1.0)
}
