//! # Device Session
//!
//! Ties one input device to the dispatcher.
//!
//! ## States
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected(Idle)
//!      ^                        |                  |  ^
//!      |                     failure    start_reading  stop_reading
//!      |                        v                  v  |
//!      +------------------ Disconnected      Connected(Reading)
//!      ^                                           |
//!      +------- disconnect / device read failure --+
//! ```
//!
//! ## Tick
//!
//! Only `Connected(Reading)` ticks do work:
//!
//! 1. poll the source
//! 2. add the calibration offset
//! 3. run the send gate against the previous tick's sample
//! 4. map the axes, resolve the active verb, format it
//! 5. hand it to the rate-limited dispatcher
//!
//! A read failure drops the device; every other error leaves the state as it
//! was and is reported through [`TickOutcome`].

pub mod handle;
pub mod parameters;

use std::fmt;

use tracing::{debug, info, warn};

use crate::command::formatter::{axis_command, format, verb_args, SUPPORTED_VERB_ARITIES};
use crate::command::mapping::AxisMappingMode;
use crate::command::registry::TemplateRegistry;
use crate::command::template::CommandTemplate;
use crate::config::Config;
use crate::controller::calibration::{apply, calibrate, should_send, CalibrationOffset, Thresholds};
use crate::controller::device::{DeviceClass, DeviceDescriptor};
use crate::controller::sampler::{DeviceProvider, InputSource};
use crate::error::{BridgeError, Result};
use crate::transport::datagram::Connector;
use crate::transport::{DispatchSettings, Dispatcher, Target};
use parameters::Parameters;

/// What a connected session is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Reading,
}

/// Connection lifecycle of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected(Activity),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Connected(Activity::Idle) => f.write_str("connected"),
            SessionState::Connected(Activity::Reading) => f.write_str("reading"),
        }
    }
}

/// Result of one timer tick
#[derive(Debug)]
pub enum TickOutcome {
    /// Not reading; nothing was polled
    Inactive,
    /// Sample did not pass the send gate
    Quiet,
    /// Command dropped by the rate limit
    Throttled,
    /// Command handed to the socket
    Sent(String),
    /// Recoverable error; the session keeps reading
    Failed(BridgeError),
    /// Device read failed; the session is now disconnected
    Disconnected(BridgeError),
}

impl TickOutcome {
    /// Message for the UI layer, `None` for outcomes that are not reported
    #[must_use]
    pub fn status_message(&self) -> Option<String> {
        match self {
            TickOutcome::Inactive | TickOutcome::Quiet | TickOutcome::Throttled => None,
            TickOutcome::Sent(command) => Some(format!("Sent: {}", command)),
            TickOutcome::Failed(e) => Some(e.to_string()),
            TickOutcome::Disconnected(e) => Some(format!("Device disconnected: {}", e)),
        }
    }
}

/// Snapshot of the session for display
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub device: Option<String>,
    pub class: Option<DeviceClass>,
    pub mode: AxisMappingMode,
    pub offset: CalibrationOffset,
    pub target: Target,
    pub command: String,
    pub rotation_angle: f32,
    pub movement_step: f32,
    pub sent: u64,
    pub dropped: u64,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.device, self.class) {
            (Some(device), Some(class)) => write!(f, "{} [{}] {}", device, class, self.state)?,
            _ => write!(f, "{}", self.state)?,
        }
        write!(
            f,
            ", mode {}, offset ({:.3}, {:.3}), {} -> {}, angle {}, step {}, sent {}, dropped {}",
            self.mode,
            self.offset.x,
            self.offset.y,
            self.command,
            self.target,
            self.rotation_angle,
            self.movement_step,
            self.sent,
            self.dropped
        )
    }
}

/// Device held while connected
struct Connection {
    descriptor: DeviceDescriptor,
    source: Box<dyn InputSource>,
    offset: CalibrationOffset,
}

/// Device session: state machine, calibration, mapping mode and dispatcher
pub struct Session {
    state: SessionState,
    connection: Option<Connection>,
    mode: AxisMappingMode,
    registry: TemplateRegistry,
    thresholds: Thresholds,
    parameters: Parameters,
    dispatcher: Dispatcher,
    provider: Box<dyn DeviceProvider>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("device", &self.connection.as_ref().map(|c| &c.descriptor.name))
            .field("mode", &self.mode)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

fn not_connected() -> BridgeError {
    BridgeError::InvalidState("no device connected".to_string())
}

impl Session {
    /// Create a disconnected session
    ///
    /// # Errors
    ///
    /// - `TemplateParse` if a configured template does not parse
    /// - `InvalidParameter` if the configured command is not a usable verb
    pub fn new(config: &Config, provider: Box<dyn DeviceProvider>, connector: Box<dyn Connector>) -> Result<Self> {
        let registry = TemplateRegistry::from_config(&config.templates)?;
        let parameters = Parameters::from_config(&config.parameters);
        check_verb(&registry, parameters.command())?;

        let dispatcher = Dispatcher::new(
            Target::new(config.udp.host.clone(), config.udp.port),
            DispatchSettings::from_config(config),
            connector,
        );

        Ok(Self {
            state: SessionState::Disconnected,
            connection: None,
            mode: AxisMappingMode::default(),
            registry,
            thresholds: Thresholds::new(config.filter.position_threshold, config.filter.movement_delta),
            parameters,
            dispatcher,
            provider,
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.state == SessionState::Connected(Activity::Reading)
    }

    #[must_use]
    pub fn mode(&self) -> AxisMappingMode {
        self.mode
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Current calibration offset; zero while disconnected
    #[must_use]
    pub fn offset(&self) -> CalibrationOffset {
        self.connection
            .as_ref()
            .map_or_else(CalibrationOffset::zero, |c| c.offset)
    }

    /// Descriptor of the connected device
    #[must_use]
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.connection.as_ref().map(|c| &c.descriptor)
    }

    /// Devices currently offered by the provider
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.provider.list_devices()
    }

    /// Command names usable with the connected device, or the verbs if none
    pub fn command_names(&self) -> Vec<String> {
        match self.device() {
            Some(device) => self
                .registry
                .command_names(device.class)
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => self.registry.verb_names().map(str::to_string).collect(),
        }
    }

    /// Acquire the device named `name`
    ///
    /// # Errors
    ///
    /// - `InvalidState` if a device is already connected
    /// - `ConnectFailure` if the device is unknown or cannot be opened
    pub fn connect(&mut self, name: &str) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(BridgeError::InvalidState(format!(
                "already {} to {}",
                self.state,
                self.device().map_or("a device", |d| d.name.as_str())
            )));
        }

        self.state = SessionState::Connecting;
        debug!("Connecting to {}", name);

        let descriptor = match self.provider.list_devices().into_iter().find(|d| d.name == name) {
            Some(descriptor) => descriptor,
            None => {
                self.state = SessionState::Disconnected;
                return Err(BridgeError::ConnectFailure(format!("device '{}' not found", name)));
            }
        };

        let source = match self.provider.open(&descriptor) {
            Ok(source) => source,
            Err(e) => {
                self.state = SessionState::Disconnected;
                warn!("Failed to connect {}: {}", name, e);
                return Err(match e {
                    BridgeError::ConnectFailure(_) => e,
                    other => BridgeError::ConnectFailure(other.to_string()),
                });
            }
        };

        info!(
            "Connected to {} ({}, {} axes, {} buttons)",
            descriptor.name, descriptor.class, descriptor.axis_count, descriptor.button_count
        );
        self.connection = Some(Connection {
            descriptor,
            source,
            offset: CalibrationOffset::zero(),
        });
        self.dispatcher.reset_samples();
        self.state = SessionState::Connected(Activity::Idle);
        Ok(())
    }

    /// Begin turning samples into commands on each tick
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when no device is connected.
    pub fn start_reading(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connected(_) => {
                if !self.is_reading() {
                    info!("Started reading");
                }
                self.state = SessionState::Connected(Activity::Reading);
                Ok(())
            }
            _ => Err(not_connected()),
        }
    }

    /// Stop sampling; the device stays connected
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when no device is connected.
    pub fn stop_reading(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connected(_) => {
                if self.is_reading() {
                    info!("Stopped reading");
                }
                self.state = SessionState::Connected(Activity::Idle);
                Ok(())
            }
            _ => Err(not_connected()),
        }
    }

    /// Capture the current reading as neutral and send the class reset token
    ///
    /// Reading is suspended for the duration of the call and then restored.
    ///
    /// # Returns
    ///
    /// * `Result<CalibrationOffset>` - The stored offset
    ///
    /// # Errors
    ///
    /// - `InvalidState` when no device is connected
    /// - `DeviceReadFailure` if the baseline cannot be read; the device is dropped
    /// - `TransmitFailure` if the reset token could not be sent; the new
    ///   offset is kept
    pub async fn calibrate(&mut self) -> Result<CalibrationOffset> {
        let activity = match self.state {
            SessionState::Connected(activity) => activity,
            _ => return Err(not_connected()),
        };
        let connection = self.connection.as_mut().ok_or_else(not_connected)?;

        self.state = SessionState::Connected(Activity::Idle);
        let baseline = match connection.source.poll() {
            Ok(sample) => sample,
            Err(e) => {
                if e.is_fatal() {
                    self.drop_device();
                } else {
                    self.state = SessionState::Connected(activity);
                }
                return Err(e);
            }
        };

        connection.offset = calibrate(baseline);
        let offset = connection.offset;
        let token = connection.descriptor.class.reset_token();
        info!(
            "Calibrated {}: offset ({:.3}, {:.3})",
            connection.descriptor.name, offset.x, offset.y
        );

        let sent = self.dispatcher.send_out_of_band(token).await;
        self.state = SessionState::Connected(activity);
        sent?;
        Ok(offset)
    }

    /// Select which spatial axis the device drives
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when no device is connected.
    pub fn set_mapping_mode(&mut self, mode: AxisMappingMode) -> Result<()> {
        if !matches!(self.state, SessionState::Connected(_)) {
            return Err(not_connected());
        }
        if self.mode != mode {
            info!("Mapping mode {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        Ok(())
    }

    /// Release the device; the socket and mapping mode are kept
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when no device is connected.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.connection.is_none() {
            return Err(not_connected());
        }
        self.drop_device();
        Ok(())
    }

    fn drop_device(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!("Disconnected from {}", connection.descriptor.name);
        }
        self.dispatcher.reset_samples();
        self.state = SessionState::Disconnected;
    }

    /// Run one sampling step
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.is_reading() {
            return TickOutcome::Inactive;
        }
        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => return TickOutcome::Inactive,
        };

        let raw = match connection.source.poll() {
            Ok(sample) => sample,
            Err(e) if e.is_fatal() => {
                warn!("Lost device {}: {}", connection.descriptor.name, e);
                self.drop_device();
                return TickOutcome::Disconnected(e);
            }
            // Only DeviceReadFailure means the handle is gone
            Err(e) => return TickOutcome::Failed(e),
        };

        let filtered = apply(raw, connection.offset);
        let class = connection.descriptor.class;
        let previous = self.dispatcher.previous_sample();
        self.dispatcher.record_sample(filtered);

        if !should_send(filtered, previous, &self.thresholds) {
            return TickOutcome::Quiet;
        }

        let command = match self.render_verb(class, self.mode.spatial(filtered)) {
            Ok(command) => command,
            Err(e) => {
                warn!("Cannot build {} command: {}", self.parameters.command(), e);
                return TickOutcome::Failed(e);
            }
        };

        match self.dispatcher.try_send(&command).await {
            Ok(true) => TickOutcome::Sent(command),
            Ok(false) => TickOutcome::Throttled,
            Err(e) => TickOutcome::Failed(e),
        }
    }

    fn render_verb(&self, class: DeviceClass, spatial: [f32; 3]) -> Result<String> {
        let template = self.registry.resolve(class, self.parameters.command())?;
        let args = verb_args(spatial, self.parameters.rotation_angle(), template.arity());
        format(template, &args)
    }

    /// Template for a user command: class-specific when connected, verbs otherwise
    fn user_template(&self, name: &str) -> Result<&CommandTemplate> {
        match self.device() {
            Some(device) => self.registry.resolve(device.class, name),
            None => self
                .registry
                .verb(name)
                .ok_or_else(|| BridgeError::InvalidParameter(format!("unknown command verb '{}'", name))),
        }
    }

    async fn send_verb(&mut self, name: &str, spatial: [f32; 3], scale: f32) -> Result<String> {
        let template = self.user_template(name)?;
        let args = verb_args(spatial, scale, template.arity());
        let command = format(template, &args)?;
        self.dispatcher.send_out_of_band(&command).await?;
        Ok(command)
    }

    /// Redirect output to `host:port`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an empty host or port 0.
    pub fn set_target(&mut self, host: &str, port: u16) -> Result<()> {
        let host = host.trim();
        if host.is_empty() {
            return Err(BridgeError::InvalidParameter("target host cannot be empty".to_string()));
        }
        if port == 0 {
            return Err(BridgeError::InvalidParameter("target port must be between 1 and 65535".to_string()));
        }
        self.dispatcher.set_target(host, port);
        Ok(())
    }

    /// Select the verb used for sampled input
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `name` is not a 3 or 4 slot verb.
    pub fn set_command(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        check_verb(&self.registry, name)?;
        info!("Command set to {}", name);
        self.parameters.set_command(name);
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidParameter` if `text` is not a number; the previous angle stays.
    pub fn set_rotation_angle(&mut self, text: &str) -> Result<f32> {
        self.parameters.set_rotation_angle(text)
    }

    /// # Errors
    ///
    /// `InvalidParameter` if `text` is not a number; the previous step stays.
    pub fn set_movement_step(&mut self, text: &str) -> Result<f32> {
        self.parameters.set_movement_step(text)
    }

    pub fn adjust_rotation(&mut self, delta: f32) -> f32 {
        self.parameters.adjust_rotation(delta)
    }

    pub fn adjust_step(&mut self, delta: f32) -> f32 {
        self.parameters.adjust_step(delta)
    }

    /// Switch to `mode` and nudge the model once along that axis
    ///
    /// Sends the active verb with the mode's unit vector and the rotation
    /// angle. [`AxisMappingMode::None`] only switches the mode.
    ///
    /// # Returns
    ///
    /// * `Result<Option<String>>` - The command sent, if any
    ///
    /// # Errors
    ///
    /// - `InvalidState` when no device is connected; the mode is unchanged
    /// - template, format and transmit errors; the mode is already switched
    pub async fn select_axis(&mut self, mode: AxisMappingMode) -> Result<Option<String>> {
        self.set_mapping_mode(mode)?;
        let unit = match mode.unit() {
            Some(unit) => unit,
            None => return Ok(None),
        };
        let verb = self.parameters.command().to_string();
        let angle = self.parameters.rotation_angle();
        self.send_verb(&verb, unit, angle).await.map(Some)
    }

    /// Send `move 0 0 <step>` immediately
    ///
    /// # Errors
    ///
    /// Template, format and transmit errors.
    pub async fn move_forward(&mut self) -> Result<String> {
        let step = self.parameters.movement_step();
        self.send_verb("move", [0.0, 0.0, step], step).await
    }

    /// Send `translate 0 0 0` followed by `rotate 0 0 1 0`
    ///
    /// # Errors
    ///
    /// Stops at the first failing command.
    pub async fn reset_position(&mut self) -> Result<Vec<String>> {
        let translate = self.send_verb("translate", [0.0, 0.0, 0.0], 0.0).await?;
        let rotate = self.send_verb("rotate", [0.0, 0.0, 1.0], 0.0).await?;
        Ok(vec![translate, rotate])
    }

    /// Send one per-axis template of the connected device with `value`
    ///
    /// # Errors
    ///
    /// - `InvalidState` when no device is connected
    /// - `UnknownTemplate` if the device class has no such axis
    /// - format and transmit errors
    pub async fn send_axis_command(&mut self, axis: &str, value: f32) -> Result<String> {
        let class = self.device().map(|d| d.class).ok_or_else(not_connected)?;
        let template = self.registry.resolve(class, axis)?;
        let command = axis_command(template, value, self.parameters.duration())?;
        self.dispatcher.send_out_of_band(&command).await?;
        Ok(command)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            device: self.device().map(|d| d.name.clone()),
            class: self.device().map(|d| d.class),
            mode: self.mode,
            offset: self.offset(),
            target: self.dispatcher.target().clone(),
            command: self.parameters.command().to_string(),
            rotation_angle: self.parameters.rotation_angle(),
            movement_step: self.parameters.movement_step(),
            sent: self.dispatcher.sent_count(),
            dropped: self.dispatcher.dropped_count(),
        }
    }

    /// Drop the device and release the socket
    pub fn shutdown(&mut self) {
        if self.connection.is_some() {
            self.drop_device();
        }
        self.dispatcher.shutdown();
    }
}

fn check_verb(registry: &TemplateRegistry, name: &str) -> Result<()> {
    match registry.verb(name) {
        Some(template)
            if template.is_numeric_only() && SUPPORTED_VERB_ARITIES.contains(&template.arity()) =>
        {
            Ok(())
        }
        Some(template) => Err(BridgeError::InvalidParameter(format!(
            "'{}' takes {} arguments, verbs need 3 or 4",
            name,
            template.arity()
        ))),
        None => Err(BridgeError::InvalidParameter(format!("unknown command verb '{}'", name))),
    }
}
