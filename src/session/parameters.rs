//! Live numeric parameters edited by the user.
//!
//! Text setters keep the last accepted value when the input does not parse.

use crate::config::ParameterConfig;
use crate::error::{BridgeError, Result};

/// Rotation angle, movement step, per-axis duration and the active verb
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    rotation_angle: f32,
    movement_step: f32,
    duration: f32,
    command: String,
}

impl Default for Parameters {
    fn default() -> Self {
        Self::from_config(&ParameterConfig::default())
    }
}

fn parse_finite(name: &str, text: &str) -> Result<f32> {
    let value: f32 = text
        .trim()
        .parse()
        .map_err(|_| BridgeError::InvalidParameter(format!("{} '{}' is not a number", name, text)))?;
    if !value.is_finite() {
        return Err(BridgeError::InvalidParameter(format!(
            "{} must be finite, got '{}'",
            name, text
        )));
    }
    Ok(value)
}

impl Parameters {
    #[must_use]
    pub fn from_config(config: &ParameterConfig) -> Self {
        Self {
            rotation_angle: config.rotation_angle,
            movement_step: config.movement_step,
            duration: config.duration,
            command: config.command.clone(),
        }
    }

    /// Scale passed as the fourth argument of rotation verbs
    #[must_use]
    pub fn rotation_angle(&self) -> f32 {
        self.rotation_angle
    }

    #[must_use]
    pub fn movement_step(&self) -> f32 {
        self.movement_step
    }

    /// Trailing token of per-axis templates
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Verb used for sampled input
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Parses and stores a rotation angle
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` and keeps the previous angle if `text` is
    /// not a finite number.
    ///
    /// # Examples
    ///
    /// ```
    /// use lisu_bridge::session::parameters::Parameters;
    ///
    /// let mut params = Parameters::default();
    /// assert_eq!(params.set_rotation_angle(" 25.5 ")?, 25.5);
    /// assert!(params.set_rotation_angle("fast").is_err());
    /// assert_eq!(params.rotation_angle(), 25.5);
    /// # Ok::<(), lisu_bridge::error::BridgeError>(())
    /// ```
    pub fn set_rotation_angle(&mut self, text: &str) -> Result<f32> {
        self.rotation_angle = parse_finite("rotation angle", text)?;
        Ok(self.rotation_angle)
    }

    /// Parses and stores a movement step
    ///
    /// # Errors
    ///
    /// Same policy as [`Parameters::set_rotation_angle`].
    pub fn set_movement_step(&mut self, text: &str) -> Result<f32> {
        self.movement_step = parse_finite("movement step", text)?;
        Ok(self.movement_step)
    }

    /// Adds `delta` to the rotation angle and returns the new value
    pub fn adjust_rotation(&mut self, delta: f32) -> f32 {
        if delta.is_finite() {
            self.rotation_angle += delta;
        }
        self.rotation_angle
    }

    /// Adds `delta` to the movement step and returns the new value
    pub fn adjust_step(&mut self, delta: f32) -> f32 {
        if delta.is_finite() {
            self.movement_step += delta;
        }
        self.movement_step
    }

    /// Replaces the active verb; the caller checks it exists
    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }
}
