//! # Controller Module
//!
//! Input device handling.
//!
//! This module handles:
//! - Device classes and descriptors
//! - The polling seam between the session and the hardware
//! - Linux evdev detection and reading
//! - Calibration offsets and the send gate

pub mod calibration;
pub mod device;
pub mod evdev_source;
pub mod sampler;
