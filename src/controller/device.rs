//! # Device Descriptors
//!
//! Identifies connected input sources and the class of hardware they belong to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of input hardware.
///
/// The class decides which command templates and which calibration reset
/// token apply to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Pointer device with relative X/Y motion.
    #[serde(rename = "mouse")]
    Mouse,
    /// Six degree of freedom controller (3Dconnexion SpaceMouse and friends).
    #[serde(rename = "spatial-6dof", alias = "3dconnexion")]
    SpatialSixDof,
    /// Gamepad or joystick with absolute analog sticks.
    #[serde(rename = "gamepad")]
    Gamepad,
}

impl DeviceClass {
    /// All supported classes, in display order.
    pub const ALL: [DeviceClass; 3] = [
        DeviceClass::Mouse,
        DeviceClass::SpatialSixDof,
        DeviceClass::Gamepad,
    ];

    /// Configuration / wire name of the class.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mouse => "mouse",
            DeviceClass::SpatialSixDof => "spatial-6dof",
            DeviceClass::Gamepad => "gamepad",
        }
    }

    /// Out-of-band token sent to the visualisation when the device is calibrated.
    ///
    /// # Examples
    ///
    /// ```
    /// use lisu_bridge::controller::device::DeviceClass;
    ///
    /// assert_eq!(DeviceClass::Gamepad.reset_token(), "reset");
    /// assert_eq!(DeviceClass::SpatialSixDof.reset_token(), "resetOrientation");
    /// assert_eq!(DeviceClass::Mouse.reset_token(), "resetPosition");
    /// ```
    #[must_use]
    pub fn reset_token(&self) -> &'static str {
        match self {
            DeviceClass::Gamepad => "reset",
            DeviceClass::SpatialSixDof => "resetOrientation",
            DeviceClass::Mouse => "resetPosition",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A connected input source as reported by device enumeration.
///
/// Immutable once enumeration completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable, human readable name used to select the device.
    pub name: String,
    /// Hardware category.
    pub class: DeviceClass,
    /// Number of axes the device declares.
    pub axis_count: usize,
    /// Number of buttons the device declares.
    pub button_count: usize,
    /// Device node (e.g. `/dev/input/event5`), empty for virtual devices.
    pub path: String,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
}

impl DeviceDescriptor {
    /// Creates a descriptor without bus information.
    #[must_use]
    pub fn new(name: impl Into<String>, class: DeviceClass, axis_count: usize, button_count: usize) -> Self {
        Self {
            name: name.into(),
            class,
            axis_count,
            button_count,
            path: String::new(),
            vendor_id: 0,
            product_id: 0,
        }
    }
}
