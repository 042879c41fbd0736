//! # Error Types
//!
//! Custom error types for LISU Bridge using `thiserror`.
//!
//! Everything except [`BridgeError::DeviceReadFailure`] is recoverable: the
//! session reports it as a status message and keeps running.

use thiserror::Error;

use crate::controller::device::DeviceClass;

/// Main error type for LISU Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No template registered for the device class / command name pair
    #[error("Unknown command template '{name}' for {class} devices")]
    UnknownTemplate { class: DeviceClass, name: String },

    /// Argument count does not fit the template
    #[error("Template expects {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Device handle became invalid while reading
    #[error("Device read failure: {0}")]
    DeviceReadFailure(String),

    /// Device could not be acquired
    #[error("Failed to connect device: {0}")]
    ConnectFailure(String),

    /// Datagram could not be sent
    #[error("Transmit failure: {0}")]
    TransmitFailure(String),

    /// User supplied value could not be used
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not permitted in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Template string could not be parsed
    #[error("Invalid template '{template}': {reason}")]
    TemplateParse { template: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be written
    #[error("Configuration write error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the session must drop the device after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::DeviceReadFailure(_))
    }
}

/// Result type alias for LISU Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_read_failure_is_fatal() {
        assert!(BridgeError::DeviceReadFailure("gone".into()).is_fatal());
        assert!(!BridgeError::TransmitFailure("unreachable".into()).is_fatal());
        assert!(!BridgeError::ArityMismatch { expected: 3, actual: 2 }.is_fatal());
        assert!(!BridgeError::ConnectFailure("busy".into()).is_fatal());
    }

    #[test]
    fn test_unknown_template_message() {
        let err = BridgeError::UnknownTemplate {
            class: DeviceClass::Gamepad,
            name: "spin".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown command template 'spin' for gamepad devices"
        );
    }
}
