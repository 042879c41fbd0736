//! # LISU Bridge Library
//!
//! Turn gamepad, mouse and 3D controller input into text commands for a
//! remote 3D visualisation over UDP.
//!
//! This library provides the translation core: device sampling, calibration
//! and the send gate, command templates, formatting, and rate-limited
//! best-effort delivery, tied together by a device session.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod transport;
