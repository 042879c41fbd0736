//! # Input Sampler
//!
//! Thin seam between the session and whatever polls the hardware.
//!
//! A sampler returns the most recent two-axis reading of a device, already
//! normalized to roughly -1.0..1.0. It must never block longer than one tick
//! and reports [`BridgeError::DeviceReadFailure`](crate::error::BridgeError::DeviceReadFailure)
//! once the underlying handle is gone.

use std::ops::{Add, Neg, Sub};

use super::device::DeviceDescriptor;
use crate::error::Result;

/// Polling interval of the reading loop (~60 Hz).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

/// A reading of the two physical analog axes of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisSample {
    /// Physical X axis (stick left/right, mouse horizontal).
    pub x: f32,
    /// Physical Y axis (stick up/down, mouse vertical). Pushing forward is negative.
    pub y: f32,
}

/// Sample as returned by the hardware.
pub type RawSample = AxisSample;

/// Sample after the calibration offset has been applied.
pub type FilteredSample = AxisSample;

impl AxisSample {
    /// Creates a sample from both axis values.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Both axes at zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Axis values in physical order.
    #[must_use]
    pub fn axes(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl Add for AxisSample {
    type Output = AxisSample;

    fn add(self, rhs: AxisSample) -> AxisSample {
        AxisSample::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for AxisSample {
    type Output = AxisSample;

    fn sub(self, rhs: AxisSample) -> AxisSample {
        AxisSample::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for AxisSample {
    type Output = AxisSample;

    fn neg(self) -> AxisSample {
        AxisSample::new(-self.x, -self.y)
    }
}

/// Polls a connected device.
#[cfg_attr(test, mockall::automock)]
pub trait InputSource: Send {
    /// Returns the most recent hardware state.
    ///
    /// # Errors
    ///
    /// Returns `DeviceReadFailure` if the device handle became invalid.
    fn poll(&mut self) -> Result<RawSample>;
}

/// Device enumeration and acquisition.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceProvider: Send {
    /// Lists the devices currently available.
    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    /// Acquires a device for polling.
    ///
    /// # Errors
    ///
    /// Returns `ConnectFailure` when the device cannot be opened.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn InputSource>>;
}
