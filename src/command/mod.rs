//! # Command Module
//!
//! Everything between a filtered axis sample and the text that goes on the
//! wire: template parsing, the template registry, the axis mapping table and
//! the formatter.

pub mod formatter;
pub mod mapping;
pub mod registry;
pub mod template;
