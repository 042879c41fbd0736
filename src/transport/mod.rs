//! # Transport Module
//!
//! Best-effort delivery of command strings to the visualisation.
//!
//! This module handles:
//! - Lazily opening the datagram socket on the first send attempt
//! - Dropping commands issued less than `min_interval` after the last send
//! - Bounding every send with a timeout
//! - Remembering the previous tick's sample for the movement gate
//!
//! Delivery is fire-and-forget: one UTF-8 line per datagram, no framing,
//! no acknowledgement, no retry.

pub mod datagram;

use std::fmt;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::sampler::{AxisSample, FilteredSample};
use crate::error::{BridgeError, Result};
use datagram::{Connector, DatagramIO};

/// Destination of outgoing datagrams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Timing policy of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Minimum time between two rate-limited sends
    pub min_interval: Duration,
    /// Upper bound for a single datagram send
    pub send_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            send_timeout: Duration::from_millis(100),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: Duration::from_millis(config.sampling.min_send_interval_ms),
            send_timeout: Duration::from_millis(config.udp.send_timeout_ms),
        }
    }
}

/// Rate limit and movement gate memory
#[derive(Debug, Clone, Copy, Default)]
struct DispatchState {
    last_sent: Option<Instant>,
    previous: FilteredSample,
}

/// Rate-limited datagram dispatcher
pub struct Dispatcher {
    target: Target,
    settings: DispatchSettings,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn DatagramIO>>,
    state: DispatchState,
    sent: u64,
    dropped: u64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &self.target)
            .field("settings", &self.settings)
            .field("open", &self.transport.is_some())
            .field("sent", &self.sent)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher; no socket is opened until the first send
    pub fn new(target: Target, settings: DispatchSettings, connector: Box<dyn Connector>) -> Self {
        Self {
            target,
            settings,
            connector,
            transport: None,
            state: DispatchState::default(),
            sent: 0,
            dropped: 0,
        }
    }

    /// Send `command` unless the previous send was too recent
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - datagram handed to the socket
    /// * `Ok(false)` - dropped by the rate limit
    ///
    /// # Errors
    ///
    /// Returns `TransmitFailure` if the socket cannot be opened or the send
    /// fails or times out. The rate limit timestamp is left untouched.
    pub async fn try_send(&mut self, command: &str) -> Result<bool> {
        if let Some(last) = self.state.last_sent {
            if last.elapsed() < self.settings.min_interval {
                self.dropped += 1;
                debug!("Rate limited: {}", command);
                return Ok(false);
            }
        }

        self.transmit(command).await?;
        self.state.last_sent = Some(Instant::now());
        Ok(true)
    }

    /// Send `command` immediately, ignoring and not updating the rate limit
    ///
    /// # Errors
    ///
    /// Returns `TransmitFailure` like [`Dispatcher::try_send`].
    pub async fn send_out_of_band(&mut self, command: &str) -> Result<()> {
        self.transmit(command).await
    }

    async fn transmit(&mut self, command: &str) -> Result<()> {
        let target = &self.target;
        let opened = match self.transport.take() {
            Some(transport) => transport,
            None => {
                let opened = self
                    .connector
                    .connect()
                    .await
                    .map_err(|e| BridgeError::TransmitFailure(format!("Failed to open socket: {}", e)))?;
                info!("Opened datagram socket for {}", target);
                opened
            }
        };
        let transport = self.transport.insert(opened);

        let send = transport.send_to(command.as_bytes(), &target.host, target.port);
        match timeout(self.settings.send_timeout, send).await {
            Ok(Ok(_)) => {
                self.sent += 1;
                debug!("Sent '{}' to {}", command, target);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Failed to send '{}' to {}: {}", command, target, e);
                Err(BridgeError::TransmitFailure(format!("{}: {}", target, e)))
            }
            Err(_) => {
                warn!("Send to {} timed out after {:?}", target, self.settings.send_timeout);
                Err(BridgeError::TransmitFailure(format!(
                    "{}: timed out after {:?}",
                    target, self.settings.send_timeout
                )))
            }
        }
    }

    /// Redirect subsequent sends; the socket is kept
    pub fn set_target(&mut self, host: impl Into<String>, port: u16) {
        self.target = Target::new(host, port);
        info!("Target set to {}", self.target);
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Filtered sample seen on the previous tick
    pub fn previous_sample(&self) -> FilteredSample {
        self.state.previous
    }

    pub fn record_sample(&mut self, sample: FilteredSample) {
        self.state.previous = sample;
    }

    /// Forget the movement history (on connect and disconnect)
    pub fn reset_samples(&mut self) {
        self.state.previous = AxisSample::zero();
    }

    /// Release the socket; a later send opens a new one
    pub fn shutdown(&mut self) {
        if self.transport.take().is_some() {
            info!("Closed datagram socket");
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Datagrams handed to the socket
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Commands dropped by the rate limit
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}
