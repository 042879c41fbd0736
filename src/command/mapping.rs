//! # Axis Mapping Mode
//!
//! Selects which spatial degree of freedom the two physical axes drive.
//!
//! | Mode | spatial X | spatial Y | spatial Z |
//! |------|-----------|-----------|-----------|
//! | None | x | -y | 0 |
//! | X | x | 0 | 0 |
//! | Y | 0 | -y | 0 |
//! | Z | 0 | 0 | -y |
//! | Yaw | 0 | x | 0 |
//! | Pitch | -y | 0 | 0 |
//! | Roll | 0 | 0 | x |
//!
//! The sign flips follow the "push forward decreases" convention of the
//! receiver and are a fixed table, not a formula.

use std::fmt;
use std::str::FromStr;

use crate::controller::sampler::FilteredSample;
use crate::error::BridgeError;

/// The spatial axis currently steered by the device, or the default mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AxisMappingMode {
    /// Physical X to spatial X and inverted physical Y to spatial Y.
    #[default]
    None,
    X,
    Y,
    Z,
    Yaw,
    Pitch,
    Roll,
}

impl AxisMappingMode {
    /// All modes in display order.
    pub const ALL: [AxisMappingMode; 7] = [
        AxisMappingMode::None,
        AxisMappingMode::X,
        AxisMappingMode::Y,
        AxisMappingMode::Z,
        AxisMappingMode::Yaw,
        AxisMappingMode::Pitch,
        AxisMappingMode::Roll,
    ];

    /// Assembles the spatial `[x, y, z]` triple for a filtered sample.
    ///
    /// # Examples
    ///
    /// ```
    /// use lisu_bridge::command::mapping::AxisMappingMode;
    /// use lisu_bridge::controller::sampler::AxisSample;
    ///
    /// let sample = AxisSample::new(0.05, -0.95);
    /// assert_eq!(AxisMappingMode::Y.spatial(sample), [0.0, 0.95, 0.0]);
    /// assert_eq!(AxisMappingMode::None.spatial(sample), [0.05, 0.95, 0.0]);
    /// ```
    #[must_use]
    pub fn spatial(&self, sample: FilteredSample) -> [f32; 3] {
        let x = sample.x;
        let y = sample.y;
        match self {
            AxisMappingMode::None => [x, -y, 0.0],
            AxisMappingMode::X => [x, 0.0, 0.0],
            AxisMappingMode::Y => [0.0, -y, 0.0],
            AxisMappingMode::Z => [0.0, 0.0, -y],
            AxisMappingMode::Yaw => [0.0, x, 0.0],
            AxisMappingMode::Pitch => [-y, 0.0, 0.0],
            AxisMappingMode::Roll => [0.0, 0.0, x],
        }
    }

    /// Unit vector along the selected axis, `None` for the default mapping.
    ///
    /// Yaw turns about Y, pitch about X and roll about Z.
    #[must_use]
    pub fn unit(&self) -> Option<[f32; 3]> {
        match self {
            AxisMappingMode::None => None,
            AxisMappingMode::X | AxisMappingMode::Pitch => Some([1.0, 0.0, 0.0]),
            AxisMappingMode::Y | AxisMappingMode::Yaw => Some([0.0, 1.0, 0.0]),
            AxisMappingMode::Z | AxisMappingMode::Roll => Some([0.0, 0.0, 1.0]),
        }
    }

    /// Lower case name used on the command line and in status messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisMappingMode::None => "none",
            AxisMappingMode::X => "x",
            AxisMappingMode::Y => "y",
            AxisMappingMode::Z => "z",
            AxisMappingMode::Yaw => "yaw",
            AxisMappingMode::Pitch => "pitch",
            AxisMappingMode::Roll => "roll",
        }
    }
}

impl fmt::Display for AxisMappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisMappingMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AxisMappingMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| BridgeError::InvalidParameter(format!("unknown mapping mode '{}'", s)))
    }
}
