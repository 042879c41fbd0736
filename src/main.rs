//! # LISU Bridge
//!
//! Forward gamepad, mouse and 3D controller input to a remote visualisation.
//!
//! This application connects one input device, samples it at ~60 Hz and
//! sends the resulting text commands over UDP until Ctrl+C.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{debug, info};

use lisu_bridge::command::mapping::AxisMappingMode;
use lisu_bridge::config::Config;
use lisu_bridge::controller::evdev_source::EvdevProvider;
use lisu_bridge::controller::sampler::DeviceProvider;
use lisu_bridge::session::handle::{SessionCommand, SessionHandle};
use lisu_bridge::session::{Session, SessionState};
use lisu_bridge::transport::datagram::UdpConnector;

/// Default location of the configuration document
const DEFAULT_CONFIG_PATH: &str = "data/config.toml";

#[derive(Parser, Debug)]
#[command(name = "lisu-bridge")]
#[command(about = "Forward HID input as text commands to a 3D visualisation over UDP")]
#[command(version)]
struct Cli {
    /// Configuration file, created with defaults if missing
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// List detected input devices and exit
    #[arg(short, long)]
    list: bool,

    /// Device to connect (default: first detected)
    #[arg(short, long)]
    device: Option<String>,

    /// Target host (overrides [udp] host)
    #[arg(long)]
    host: Option<String>,

    /// Target port (overrides [udp] port)
    #[arg(long)]
    port: Option<u16>,

    /// Axis mapping mode: none, x, y, z, yaw, pitch or roll
    #[arg(short, long, default_value = "none")]
    mode: AxisMappingMode,

    /// Command verb for sampled input (overrides [parameters] command)
    #[arg(long)]
    command: Option<String>,

    /// Calibrate the rest position before reading
    #[arg(long)]
    calibrate: bool,
}

/// Applies command line overrides on top of the loaded configuration
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(host) = &cli.host {
        config.udp.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.udp.port = port;
    }
    if let Some(command) = &cli.command {
        config.parameters.command = command.clone();
    }
}

/// Whether a state published after startup means the device is gone
fn device_lost(state: SessionState) -> bool {
    state == SessionState::Disconnected
}

/// Main entry point for LISU Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load (or create) the configuration and apply overrides
///    - Pick the device and spawn the session task
///
/// 2. **Main Loop**
///    - Log every status message published by the session
///    - Stop when the device is lost
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the session task, release the device and socket
///    - Log command counters
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be read, written or validated
/// - No input device is available or it cannot be connected
/// - The device is lost while reading
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("LISU Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_create(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    apply_overrides(&cli, &mut config);
    config.validate().context("Invalid configuration")?;

    let provider = EvdevProvider::new(&config);
    let devices = provider.list_devices();

    if cli.list {
        if devices.is_empty() {
            println!("No input devices found");
        }
        for device in &devices {
            println!(
                "{:<32} {:<13} {} axes, {} buttons  {} ({:04x}:{:04x})",
                device.name,
                device.class,
                device.axis_count,
                device.button_count,
                device.path,
                device.vendor_id,
                device.product_id
            );
        }
        return Ok(());
    }

    let name = match cli.device.clone().or_else(|| devices.first().map(|d| d.name.clone())) {
        Some(name) => name,
        None => bail!("No input device found (check permissions on /dev/input/event*)"),
    };

    let session = Session::new(&config, Box::new(provider), Box::new(UdpConnector::default()))?;
    let handle = SessionHandle::spawn(
        session,
        Duration::from_millis(config.sampling.tick_interval_ms),
    );
    let mut status = handle.subscribe();

    handle.send(SessionCommand::Connect(name.clone())).await?;
    let snapshot = handle.status().await?;
    if snapshot.state == SessionState::Disconnected {
        let message = status.borrow().clone();
        handle.shutdown().await?;
        bail!("Could not connect to {}: {}", name, message);
    }

    // Subscribed while connected, so a loss during calibration still shows
    let mut state = handle.subscribe_state();

    handle.send(SessionCommand::SetMappingMode(cli.mode)).await?;
    if cli.calibrate {
        handle.send(SessionCommand::Calibrate).await?;
    }
    handle.send(SessionCommand::StartReading).await?;

    info!("Sending to {}:{}", config.udp.host, config.udp.port);
    info!("Press Ctrl+C to exit");

    let mut lost = None;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let message = status.borrow_and_update().clone();
                if message.starts_with("Sent: ") {
                    debug!("{}", message);
                } else {
                    info!("{}", message);
                }
            }

            // Device gone: stop instead of idling until Ctrl+C
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                if device_lost(*state.borrow_and_update()) {
                    lost = Some(status.borrow().clone());
                    break;
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let session = handle.shutdown().await?;
    let summary = session.status();
    info!(
        "Total commands sent: {} ({} dropped by rate limit)",
        summary.sent, summary.dropped
    );

    if let Some(reason) = lost {
        bail!("{}", reason);
    }

    Ok(())
}
