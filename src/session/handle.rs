//! # Session Actor
//!
//! Runs a [`Session`] on its own tokio task.
//!
//! User actions arrive as [`SessionCommand`]s on an mpsc channel; ticks come
//! from an interval that only exists while the session is reading. Both are
//! handled in one `select!` loop, so an action and a tick never interleave.
//! Status strings are published on a `watch` channel for the UI layer, and
//! the session state on a second one so callers can react to device loss.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{Session, SessionState, SessionStatus};
use crate::command::mapping::AxisMappingMode;
use crate::controller::device::DeviceDescriptor;
use crate::error::{BridgeError, Result};

/// Capacity of the command channel
const COMMAND_BUFFER: usize = 32;

/// Actions a UI layer can request
#[derive(Debug)]
pub enum SessionCommand {
    Connect(String),
    StartReading,
    StopReading,
    Calibrate,
    SetMappingMode(AxisMappingMode),
    Disconnect,
    SetTarget { host: String, port: u16 },
    SetCommand(String),
    SetRotationAngle(String),
    SetMovementStep(String),
    AdjustRotation(f32),
    AdjustStep(f32),
    SelectAxis(AxisMappingMode),
    MoveForward,
    ResetPosition,
    SendAxisCommand { axis: String, value: f32 },
    ListDevices(oneshot::Sender<Vec<DeviceDescriptor>>),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

/// Handle to a running session task
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<String>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<Session>,
}

fn stopped() -> BridgeError {
    BridgeError::InvalidState("session task has stopped".to_string())
}

impl SessionHandle {
    /// Move `session` onto a new task ticking every `tick_interval` while reading
    pub fn spawn(session: Session, tick_interval: Duration) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, status) = watch::channel(session.status().to_string());
        let (states, state) = watch::channel(session.state());

        info!("Starting session task ({:?} tick)", tick_interval);
        let task = tokio::spawn(run(session, receiver, publisher, states, tick_interval));

        Self {
            commands,
            status,
            state,
            task,
        }
    }

    /// Queue an action
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the task has ended.
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }

    /// Receiver for status strings
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.status.clone()
    }

    /// Receiver for session state changes
    ///
    /// A change to [`SessionState::Disconnected`] while reading means the
    /// device was lost.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Snapshot taken after every previously queued action has run
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the task has ended.
    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Status(reply)).await?;
        response.await.map_err(|_| stopped())
    }

    /// Devices offered by the provider
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the task has ended.
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::ListDevices(reply)).await?;
        response.await.map_err(|_| stopped())
    }

    /// Stop the task and take the session back
    ///
    /// The device is released and the socket closed before the session is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the task panicked.
    pub async fn shutdown(self) -> Result<Session> {
        // Already stopped tasks still hand the session back through the join
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        self.task
            .await
            .map_err(|e| BridgeError::InvalidState(format!("session task failed: {}", e)))
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Waits for the next tick, or forever when there is no ticker
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn report<T>(result: Result<T>, success: impl FnOnce(T) -> String) -> String {
    match result {
        Ok(value) => success(value),
        Err(e) => {
            warn!("{}", e);
            e.to_string()
        }
    }
}

/// Runs one action; `None` for queries that publish nothing
async fn execute(session: &mut Session, command: SessionCommand) -> Option<String> {
    let message = match command {
        SessionCommand::Connect(name) => report(session.connect(&name), |_| format!("Connected to {}", name)),
        SessionCommand::StartReading => report(session.start_reading(), |_| "Reading input".to_string()),
        SessionCommand::StopReading => report(session.stop_reading(), |_| "Stopped reading".to_string()),
        SessionCommand::Calibrate => report(session.calibrate().await, |offset| {
            format!("Calibrated: offset ({:.3}, {:.3})", offset.x, offset.y)
        }),
        SessionCommand::SetMappingMode(mode) => {
            report(session.set_mapping_mode(mode), |_| format!("Mapping mode: {}", mode))
        }
        SessionCommand::Disconnect => report(session.disconnect(), |_| "Disconnected".to_string()),
        SessionCommand::SetTarget { host, port } => {
            report(session.set_target(&host, port), |_| format!("Target: {}:{}", host.trim(), port))
        }
        SessionCommand::SetCommand(name) => {
            report(session.set_command(&name), |_| format!("Command: {}", name.trim()))
        }
        SessionCommand::SetRotationAngle(text) => {
            report(session.set_rotation_angle(&text), |angle| format!("Rotation angle: {}", angle))
        }
        SessionCommand::SetMovementStep(text) => {
            report(session.set_movement_step(&text), |step| format!("Movement step: {}", step))
        }
        SessionCommand::AdjustRotation(delta) => {
            format!("Rotation angle: {}", session.adjust_rotation(delta))
        }
        SessionCommand::AdjustStep(delta) => format!("Movement step: {}", session.adjust_step(delta)),
        SessionCommand::SelectAxis(mode) => report(session.select_axis(mode).await, |sent| match sent {
            Some(command) => format!("Sent: {}", command),
            None => format!("Mapping mode: {}", mode),
        }),
        SessionCommand::MoveForward => report(session.move_forward().await, |command| format!("Sent: {}", command)),
        SessionCommand::ResetPosition => report(session.reset_position().await, |commands| {
            format!("Sent: {}", commands.join(", "))
        }),
        SessionCommand::SendAxisCommand { axis, value } => {
            report(session.send_axis_command(&axis, value).await, |command| {
                format!("Sent: {}", command)
            })
        }
        SessionCommand::ListDevices(reply) => {
            let _ = reply.send(session.list_devices());
            return None;
        }
        SessionCommand::Status(reply) => {
            let _ = reply.send(session.status());
            return None;
        }
        // Handled by the loop
        SessionCommand::Shutdown => return None,
    };
    Some(message)
}

async fn run(
    mut session: Session,
    mut commands: mpsc::Receiver<SessionCommand>,
    status: watch::Sender<String>,
    states: watch::Sender<SessionState>,
    period: Duration,
) -> Session {
    let mut ticks: Option<Interval> = None;

    loop {
        // Arm the ticker only while reading; dropping it cancels pending ticks
        match (session.is_reading(), ticks.is_some()) {
            (true, false) => ticks = Some(ticker(period)),
            (false, true) => ticks = None,
            _ => {}
        }

        let mut calibrated = false;
        tokio::select! {
            biased;

            command = commands.recv() => {
                let command = match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => command,
                };
                calibrated = matches!(command, SessionCommand::Calibrate);
                if let Some(message) = execute(&mut session, command).await {
                    status.send_replace(message);
                }
            }

            _ = next_tick(&mut ticks) => {
                let outcome = session.tick().await;
                if let Some(message) = outcome.status_message() {
                    debug!("{}", message);
                    status.send_replace(message);
                }
            }
        }

        if calibrated {
            // Resume a full period after the baseline read
            if let Some(ticker) = ticks.as_mut() {
                ticker.reset();
            }
        }

        let current = session.state();
        states.send_if_modified(|published| {
            let changed = *published != current;
            *published = current;
            changed
        });
    }

    session.shutdown();
    states.send_replace(session.state());
    status.send_replace("Session stopped".to_string());
    info!("Session task stopped");
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::controller::device::DeviceClass;
    use crate::controller::sampler::{AxisSample, InputSource, MockDeviceProvider, MockInputSource};
    use crate::session::{Activity, SessionState};
    use crate::transport::datagram::mocks::MockNetwork;

    const PERIOD: Duration = Duration::from_millis(16);

    /// Source whose X axis sweeps so every tick passes the movement gate
    fn sweeping_source() -> MockInputSource {
        let mut x = 0.2f32;
        let mut source = MockInputSource::new();
        source.expect_poll().returning(move || {
            x = if x > 0.9 { 0.2 } else { x + 0.05 };
            Ok(AxisSample::new(x, 0.0))
        });
        source
    }

    /// Source that sweeps for `healthy` polls, then reports the device gone
    fn unplugging_source(healthy: usize) -> MockInputSource {
        let mut polls = 0usize;
        let mut source = MockInputSource::new();
        source.expect_poll().returning(move || {
            polls += 1;
            if polls > healthy {
                return Err(BridgeError::DeviceReadFailure("No such device".into()));
            }
            Ok(AxisSample::new(0.1 * polls as f32, 0.0))
        });
        source
    }

    fn spawn() -> (SessionHandle, MockNetwork) {
        spawn_with(sweeping_source)
    }

    fn spawn_with(open: fn() -> MockInputSource) -> (SessionHandle, MockNetwork) {
        let mut provider = MockDeviceProvider::new();
        provider
            .expect_list_devices()
            .returning(|| vec![DeviceDescriptor::new("Pad", DeviceClass::Gamepad, 4, 13)]);
        provider
            .expect_open()
            .returning(move |_| Ok(Box::new(open()) as Box<dyn InputSource>));

        let network = MockNetwork::new();
        let session =
            Session::new(&Config::default(), Box::new(provider), Box::new(network.clone())).unwrap();
        (SessionHandle::spawn(session, PERIOD), network)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reading_loop_sends_rate_limited() {
        let (handle, network) = spawn();
        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        handle.send(SessionCommand::StartReading).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let status = handle.status().await.unwrap();
        assert!(status.state == SessionState::Connected(Activity::Reading));

        // ~62 ticks in one second, at most one send per 100 ms
        let sent = network.sent_commands().len();
        assert!((8..=11).contains(&sent), "sent {} commands", sent);
        assert!(status.dropped > 0);
        assert!(network.sent_commands()[0].starts_with("addrotation "));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_disconnect() {
        let (handle, network) = spawn();
        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        handle.send(SessionCommand::StartReading).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        handle.send(SessionCommand::Disconnect).await.unwrap();
        let before = handle.status().await.unwrap();
        assert_eq!(before.state, SessionState::Disconnected);
        assert!(before.sent > 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(network.sent_commands().len() as u64, before.sent);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_does_not_send() {
        let (handle, network) = spawn();
        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.status().await.unwrap();
        assert!(network.get_sent().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_messages_published() {
        let (handle, _) = spawn();
        let mut status = handle.subscribe();

        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), "Connected to Pad");

        handle.send(SessionCommand::SetRotationAngle("abc".into())).await.unwrap();
        status.changed().await.unwrap();
        assert!(status.borrow().starts_with("Invalid parameter"));

        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        status.changed().await.unwrap();
        assert!(status.borrow().starts_with("Invalid session state"));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_commands_through_handle() {
        let (handle, network) = spawn();
        handle
            .send(SessionCommand::SetTarget {
                host: "10.0.0.5".into(),
                port: 9000,
            })
            .await
            .unwrap();
        handle.send(SessionCommand::MoveForward).await.unwrap();
        handle.send(SessionCommand::ResetPosition).await.unwrap();
        handle.status().await.unwrap();

        let sent = network.get_sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|d| d.host == "10.0.0.5" && d.port == 9000));
        assert_eq!(sent[0].text(), "move 0.000 0.000 1.000");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_devices_query() {
        let (handle, _) = spawn();
        let devices = handle.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Pad");
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_released_session() {
        let (handle, network) = spawn();
        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        handle.send(SessionCommand::Calibrate).await.unwrap();

        let session = handle.shutdown().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(network.sent_commands(), vec!["reset"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_watch_reports_device_loss() {
        let (handle, network) = spawn_with(|| unplugging_source(3));
        let mut state = handle.subscribe_state();
        let mut status = handle.subscribe();
        assert_eq!(*state.borrow_and_update(), SessionState::Disconnected);

        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        handle.send(SessionCommand::StartReading).await.unwrap();

        let mut seen = Vec::new();
        while seen.last() != Some(&SessionState::Disconnected) {
            state.changed().await.unwrap();
            seen.push(*state.borrow_and_update());
        }
        assert!(status.borrow_and_update().starts_with("Device disconnected"));
        assert!(!network.sent_commands().is_empty());

        // No further state changes or sends once the device is gone
        let sent = network.sent_commands().len();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!state.has_changed().unwrap());
        assert_eq!(network.sent_commands().len(), sent);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_axis_and_adjust_step_through_handle() {
        let (handle, network) = spawn();
        let mut status = handle.subscribe();
        handle.send(SessionCommand::Connect("Pad".into())).await.unwrap();
        handle.send(SessionCommand::SelectAxis(AxisMappingMode::Roll)).await.unwrap();
        handle.send(SessionCommand::AdjustStep(1.5)).await.unwrap();

        let snapshot = handle.status().await.unwrap();
        assert_eq!(snapshot.mode, AxisMappingMode::Roll);
        assert_eq!(snapshot.movement_step, 2.5);
        assert_eq!(*status.borrow_and_update(), "Movement step: 2.5");
        assert_eq!(network.sent_commands(), vec!["addrotation 0.000 0.000 1.000 40.000"]);

        handle.shutdown().await.unwrap();
    }
}
