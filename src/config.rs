//! # Configuration Module
//!
//! Handles loading, validating and writing the TOML configuration document.
//!
//! The document is read once at startup. When it does not exist the built-in
//! defaults are used and written out so the user has something to edit.

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::command::registry::TemplateRegistry;
use crate::controller::device::DeviceClass;
use crate::error::{BridgeError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub parameters: ParameterConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default = "default_devices")]
    pub devices: Vec<KnownDevice>,
}

/// Datagram target configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UdpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

/// Polling and rate limiting configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplingConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,

    #[serde(default = "default_mouse_counts_per_unit")]
    pub mouse_counts_per_unit: f32,

    #[serde(default = "default_spatial_counts_per_unit")]
    pub spatial_counts_per_unit: f32,
}

/// Send gate configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    #[serde(default = "default_position_threshold")]
    pub position_threshold: f32,

    #[serde(default = "default_movement_delta")]
    pub movement_delta: f32,
}

/// Default numeric parameters and the active command verb
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ParameterConfig {
    #[serde(default = "default_rotation_angle")]
    pub rotation_angle: f32,

    #[serde(default = "default_movement_step")]
    pub movement_step: f32,

    #[serde(default = "default_duration")]
    pub duration: f32,

    #[serde(default = "default_command")]
    pub command: String,
}

/// Command templates keyed by device class, plus class independent verbs
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TemplateConfig {
    #[serde(default = "default_mouse_templates")]
    pub mouse: BTreeMap<String, String>,

    #[serde(rename = "spatial-6dof", default = "default_spatial_templates")]
    pub spatial_six_dof: BTreeMap<String, String>,

    #[serde(default = "default_gamepad_templates")]
    pub gamepad: BTreeMap<String, String>,

    #[serde(default = "default_verb_templates")]
    pub verbs: BTreeMap<String, String>,
}

impl TemplateConfig {
    /// Templates specific to one device class.
    #[must_use]
    pub fn for_class(&self, class: DeviceClass) -> &BTreeMap<String, String> {
        match class {
            DeviceClass::Mouse => &self.mouse,
            DeviceClass::SpatialSixDof => &self.spatial_six_dof,
            DeviceClass::Gamepad => &self.gamepad,
        }
    }
}

/// A device recognised by vendor and product id
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KnownDevice {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub class: DeviceClass,
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 7755 }
fn default_send_timeout_ms() -> u64 { 100 }

fn default_tick_interval_ms() -> u64 { 16 }
fn default_min_send_interval_ms() -> u64 { 100 }
fn default_mouse_counts_per_unit() -> f32 { 50.0 }
fn default_spatial_counts_per_unit() -> f32 { 350.0 }

fn default_position_threshold() -> f32 { 0.1 }
fn default_movement_delta() -> f32 { 0.01 }

fn default_rotation_angle() -> f32 { 40.0 }
fn default_movement_step() -> f32 { 1.0 }
fn default_duration() -> f32 { 1.0 }
fn default_command() -> String { "addrotation".to_string() }

fn axis_templates(names: &[&str]) -> BTreeMap<String, String> {
    const ROTATIONS: [&str; 3] = [
        "addrotation %.3f 0.0 0.0 %s",
        "addrotation 0.0 %.3f 0.0 %s",
        "addrotation 0.0 0.0 %.3f %s",
    ];
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), ROTATIONS[i % ROTATIONS.len()].to_string()))
        .collect()
}

fn default_mouse_templates() -> BTreeMap<String, String> {
    axis_templates(&["x_axis", "y_axis", "z_axis"])
}

fn default_spatial_templates() -> BTreeMap<String, String> {
    axis_templates(&["x_axis", "y_axis", "z_axis", "rx_axis", "ry_axis", "rz_axis"])
}

fn default_gamepad_templates() -> BTreeMap<String, String> {
    axis_templates(&["axis_0", "axis_1", "axis_2"])
}

fn default_verb_templates() -> BTreeMap<String, String> {
    [
        ("addrotation", "addrotation %.3f %.3f %.3f %.3f"),
        ("rotate", "rotate %.3f %.3f %.3f %.3f"),
        ("move", "move %.3f %.3f %.3f"),
        ("translate", "translate %.3f %.3f %.3f"),
    ]
    .into_iter()
    .map(|(name, template)| (name.to_string(), template.to_string()))
    .collect()
}

fn default_devices() -> Vec<KnownDevice> {
    vec![
        KnownDevice {
            name: "Bluetooth_mouse".to_string(),
            vendor_id: 0x046d,
            product_id: 0xb03a,
            class: DeviceClass::Mouse,
        },
        KnownDevice {
            name: "SpaceMouse".to_string(),
            vendor_id: 0x256f,
            product_id: 0xc635,
            class: DeviceClass::SpatialSixDof,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            udp: UdpConfig::default(),
            sampling: SamplingConfig::default(),
            filter: FilterConfig::default(),
            parameters: ParameterConfig::default(),
            templates: TemplateConfig::default(),
            devices: default_devices(),
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            min_send_interval_ms: default_min_send_interval_ms(),
            mouse_counts_per_unit: default_mouse_counts_per_unit(),
            spatial_counts_per_unit: default_spatial_counts_per_unit(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            position_threshold: default_position_threshold(),
            movement_delta: default_movement_delta(),
        }
    }
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            rotation_angle: default_rotation_angle(),
            movement_step: default_movement_step(),
            duration: default_duration(),
            command: default_command(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            mouse: default_mouse_templates(),
            spatial_six_dof: default_spatial_templates(),
            gamepad: default_gamepad_templates(),
            verbs: default_verb_templates(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lisu_bridge::config::Config;
    ///
    /// let config = Config::load("data/config.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, writing the defaults first if the file is missing
    ///
    /// A missing document is not an error.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let config = Config::default();
        config.save(path)?;
        info!("No configuration at {}, wrote defaults", path.display());
        Ok(config)
    }

    /// Write configuration as TOML, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range or a template does not parse
    pub fn validate(&self) -> Result<()> {
        if self.udp.host.trim().is_empty() {
            return Err(invalid("udp host cannot be empty"));
        }

        if self.udp.port == 0 {
            return Err(invalid("udp port must be between 1 and 65535"));
        }

        if self.udp.send_timeout_ms == 0 || self.udp.send_timeout_ms > 10000 {
            return Err(invalid("send_timeout_ms must be between 1 and 10000"));
        }

        if self.sampling.tick_interval_ms == 0 || self.sampling.tick_interval_ms > 1000 {
            return Err(invalid("tick_interval_ms must be between 1 and 1000"));
        }

        if self.sampling.min_send_interval_ms > 60000 {
            return Err(invalid("min_send_interval_ms must be at most 60000"));
        }

        for (name, value) in [
            ("mouse_counts_per_unit", self.sampling.mouse_counts_per_unit),
            ("spatial_counts_per_unit", self.sampling.spatial_counts_per_unit),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        for (name, value) in [
            ("position_threshold", self.filter.position_threshold),
            ("movement_delta", self.filter.movement_delta),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} must be between 0.0 and 1.0", name)));
            }
        }

        for (name, value) in [
            ("rotation_angle", self.parameters.rotation_angle),
            ("movement_step", self.parameters.movement_step),
            ("duration", self.parameters.duration),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{} must be a finite number", name)));
            }
        }

        if self.parameters.command.trim().is_empty() {
            return Err(invalid("command cannot be empty"));
        }

        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(invalid("device name cannot be empty"));
            }
        }

        TemplateRegistry::from_config(&self.templates)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_host(), "127.0.0.1");
        assert_eq!(default_port(), 7755);
        assert_eq!(default_send_timeout_ms(), 100);
        assert_eq!(default_tick_interval_ms(), 16);
        assert_eq!(default_min_send_interval_ms(), 100);
        assert_eq!(default_position_threshold(), 0.1);
        assert_eq!(default_movement_delta(), 0.01);
        assert_eq!(default_rotation_angle(), 40.0);
        assert_eq!(default_movement_step(), 1.0);
        assert_eq!(default_duration(), 1.0);
        assert_eq!(default_command(), "addrotation");
    }

    #[test]
    fn test_default_templates_cover_every_class() {
        let templates = TemplateConfig::default();
        assert_eq!(templates.mouse.len(), 3);
        assert_eq!(templates.spatial_six_dof.len(), 6);
        assert_eq!(templates.gamepad.len(), 3);
        assert_eq!(
            templates.gamepad.get("axis_1").map(String::as_str),
            Some("addrotation 0.0 %.3f 0.0 %s")
        );
        assert_eq!(
            templates.spatial_six_dof.get("rz_axis").map(String::as_str),
            Some("addrotation 0.0 0.0 %.3f %s")
        );
        for verb in ["addrotation", "rotate", "move", "translate"] {
            assert!(templates.verbs.contains_key(verb), "missing verb {}", verb);
        }
    }

    #[test]
    fn test_load_minimal_file_uses_defaults() {
        let toml_content = r#"
[udp]
host = "10.0.0.5"
port = 9000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.udp.host, "10.0.0.5");
        assert_eq!(config.udp.port, 9000);
        assert_eq!(config.udp.send_timeout_ms, 100);
        assert_eq!(config.sampling, SamplingConfig::default());
        assert_eq!(config.templates, TemplateConfig::default());
        assert_eq!(config.devices.len(), 2);
    }

    #[test]
    fn test_load_custom_templates() {
        let toml_content = r#"
[templates.gamepad]
axis_0 = "spin %.3f %s"

[templates.verbs]
move = "move %.3f %.3f %.3f"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.templates.gamepad.len(), 1);
        assert_eq!(config.templates.verbs.len(), 1);
        // Sections not mentioned keep their defaults
        assert_eq!(config.templates.mouse.len(), 3);
    }

    #[test]
    fn test_load_rejects_bad_template() {
        let toml_content = r#"
[templates.verbs]
move = "move %d %d %d"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(BridgeError::TemplateParse { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("config.toml");

        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // Second load reads the written document back
        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.udp.host = "192.168.1.20".to_string();
        config.parameters.command = "rotate".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_written_document_uses_class_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("spatial-6dof"));
        assert!(text.contains("[[devices]]"));
    }

    #[test]
    fn test_empty_host() {
        let mut config = Config::default();
        config.udp.host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_zero() {
        let mut config = Config::default();
        config.udp.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_send_timeout_out_of_range() {
        let mut config = Config::default();
        config.udp.send_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.udp.send_timeout_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_interval_out_of_range() {
        let mut config = Config::default();
        config.sampling.tick_interval_ms = 0;
        assert!(config.validate().is_err());
        config.sampling.tick_interval_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_send_interval_zero_allowed() {
        let mut config = Config::default();
        config.sampling.min_send_interval_ms = 0;
        assert!(config.validate().is_ok());
        config.sampling.min_send_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_counts_per_unit_must_be_positive() {
        let mut config = Config::default();
        config.sampling.mouse_counts_per_unit = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sampling.spatial_counts_per_unit = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thresholds_out_of_range() {
        let mut config = Config::default();
        config.filter.position_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filter.movement_delta = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_parameter() {
        let mut config = Config::default();
        config.parameters.rotation_angle = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_command() {
        let mut config = Config::default();
        config.parameters.command = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_device_name() {
        let mut config = Config::default();
        config.devices[0].name = String::new();
        assert!(config.validate().is_err());
    }
}
