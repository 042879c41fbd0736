//! # evdev Input Devices
//!
//! Linux implementation of [`DeviceProvider`] and [`InputSource`] on top of
//! the evdev interface.
//!
//! ## Device Detection
//!
//! `/dev/input/event*` nodes are scanned in sorted order. A node is offered
//! as a device when it matches:
//!
//! 1. an entry of the configured `[[devices]]` table (vendor and product id)
//! 2. the 3Dconnexion vendor id (0x256f), as a 6-DoF controller
//! 3. gamepad buttons (BTN_SOUTH or BTN_TRIGGER) plus ABS_X/ABS_Y, as a gamepad
//! 4. REL_X/REL_Y plus BTN_LEFT, as a mouse
//!
//! ## Reading
//!
//! | Axes | Reader | Sample |
//! |------|--------|--------|
//! | ABS_X / ABS_Y | ioctl snapshot on each poll | `[min, max]` scaled to -1..1 |
//! | REL_X / REL_Y (mouse) | background task, summed between polls | counts / `mouse_counts_per_unit` |
//! | REL_X / REL_Y (6-DoF) | background task, last value kept | counts / `spatial_counts_per_unit` |

use evdev::{AbsoluteAxisType, Device, InputEvent, InputEventKind, Key, RelativeAxisType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::calibration::{normalize_axis, normalize_relative};
use super::device::{DeviceClass, DeviceDescriptor};
use super::sampler::{AxisSample, DeviceProvider, InputSource, RawSample};
use crate::config::{Config, KnownDevice};
use crate::error::{BridgeError, Result};

/// Directory holding the event nodes
pub const INPUT_DIR: &str = "/dev/input";

/// 3Dconnexion vendor ID
const THREEDCONNEXION_VENDOR_ID: u16 = 0x256f;

/// What a device node can report, reduced to what classification needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub abs_xy: bool,
    pub rel_xy: bool,
    pub gamepad_buttons: bool,
    pub left_button: bool,
    pub axis_count: usize,
    pub button_count: usize,
}

impl Capabilities {
    fn of(device: &Device) -> Self {
        let keys = device.supported_keys();
        let abs = device.supported_absolute_axes();
        let rel = device.supported_relative_axes();

        let has_key = |key: Key| keys.map_or(false, |k| k.contains(key));
        let abs_axis_count = abs.map_or(0, |a| a.iter().count());
        let rel_axis_count = rel.map_or(0, |r| r.iter().count());

        Self {
            abs_xy: abs.map_or(false, |a| {
                a.contains(AbsoluteAxisType::ABS_X) && a.contains(AbsoluteAxisType::ABS_Y)
            }),
            rel_xy: rel.map_or(false, |r| {
                r.contains(RelativeAxisType::REL_X) && r.contains(RelativeAxisType::REL_Y)
            }),
            gamepad_buttons: has_key(Key::BTN_SOUTH) || has_key(Key::BTN_TRIGGER),
            left_button: has_key(Key::BTN_LEFT),
            axis_count: abs_axis_count + rel_axis_count,
            button_count: keys.map_or(0, |k| k.iter().count()),
        }
    }
}

/// Looks up a vendor/product pair in the configured device table
#[must_use]
pub fn known_device(vendor: u16, product: u16, known: &[KnownDevice]) -> Option<&KnownDevice> {
    known
        .iter()
        .find(|d| d.vendor_id == vendor && d.product_id == product)
}

/// Decides the class of a device node, `None` if it is not usable
///
/// # Examples
///
/// ```
/// use lisu_bridge::controller::device::DeviceClass;
/// use lisu_bridge::controller::evdev_source::{classify, Capabilities};
///
/// let caps = Capabilities { abs_xy: true, gamepad_buttons: true, ..Default::default() };
/// assert_eq!(classify(0x054c, 0x0ce6, &caps, &[]), Some(DeviceClass::Gamepad));
/// assert_eq!(classify(0x1234, 0x0001, &Capabilities::default(), &[]), None);
/// ```
#[must_use]
pub fn classify(vendor: u16, product: u16, caps: &Capabilities, known: &[KnownDevice]) -> Option<DeviceClass> {
    if let Some(entry) = known_device(vendor, product, known) {
        return Some(entry.class);
    }
    if vendor == THREEDCONNEXION_VENDOR_ID && (caps.abs_xy || caps.rel_xy) {
        return Some(DeviceClass::SpatialSixDof);
    }
    if caps.gamepad_buttons && caps.abs_xy {
        return Some(DeviceClass::Gamepad);
    }
    if caps.rel_xy && caps.left_button {
        return Some(DeviceClass::Mouse);
    }
    None
}

/// How relative motion is folded between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// Deltas are summed and cleared on each poll (mouse)
    Accumulate,
    /// The last reported value is kept (6-DoF puck displacement)
    Latch,
}

/// Relative axis state shared between the reader task and `poll`
#[derive(Debug)]
pub struct RelativeMotion {
    mode: MotionMode,
    x: i32,
    y: i32,
    failure: Option<String>,
}

impl RelativeMotion {
    #[must_use]
    pub fn new(mode: MotionMode) -> Self {
        Self {
            mode,
            x: 0,
            y: 0,
            failure: None,
        }
    }

    /// Folds one evdev event into the state; anything but REL_X/REL_Y is ignored
    pub fn process_event(&mut self, event: &InputEvent) {
        let axis = match event.kind() {
            InputEventKind::RelAxis(axis) => axis,
            _ => return,
        };
        let slot = match axis {
            RelativeAxisType::REL_X => &mut self.x,
            RelativeAxisType::REL_Y => &mut self.y,
            _ => return,
        };
        match self.mode {
            MotionMode::Accumulate => *slot = slot.saturating_add(event.value()),
            MotionMode::Latch => *slot = event.value(),
        }
    }

    /// Current sample; accumulated deltas are cleared
    pub fn take(&mut self, counts_per_unit: f32) -> RawSample {
        let sample = AxisSample::new(
            normalize_relative(self.x as f32, counts_per_unit),
            normalize_relative(self.y as f32, counts_per_unit),
        );
        if self.mode == MotionMode::Accumulate {
            self.x = 0;
            self.y = 0;
        }
        sample
    }

    /// Marks the stream as broken
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Absolute-axis device (gamepad sticks, newer 6-DoF drivers)
pub struct AbsoluteSource {
    device: Device,
    path: String,
}

impl std::fmt::Debug for AbsoluteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbsoluteSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl InputSource for AbsoluteSource {
    fn poll(&mut self) -> Result<RawSample> {
        let state = self
            .device
            .get_abs_state()
            .map_err(|e| BridgeError::DeviceReadFailure(format!("{}: {}", self.path, e)))?;

        let axis = |code: AbsoluteAxisType| {
            let info = &state[code.0 as usize];
            normalize_axis(info.value, info.minimum, info.maximum)
        };
        Ok(AxisSample::new(
            axis(AbsoluteAxisType::ABS_X),
            axis(AbsoluteAxisType::ABS_Y),
        ))
    }
}

/// Relative-axis device read by a background task
#[derive(Debug)]
pub struct RelativeSource {
    motion: Arc<Mutex<RelativeMotion>>,
    counts_per_unit: f32,
    reader: JoinHandle<()>,
}

impl RelativeSource {
    fn spawn(device: Device, path: &str, mode: MotionMode, counts_per_unit: f32) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::ConnectFailure(format!("{}: {}", path, e)))?;
        let mut stream = device
            .into_event_stream()
            .map_err(|e| BridgeError::ConnectFailure(format!("{}: {}", path, e)))?;

        let motion = Arc::new(Mutex::new(RelativeMotion::new(mode)));
        let shared = Arc::clone(&motion);
        let path = path.to_string();
        let reader = runtime.spawn(async move {
            loop {
                match stream.next_event().await {
                    Ok(event) => shared
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .process_event(&event),
                    Err(e) => {
                        warn!("Event stream of {} ended: {}", path, e);
                        shared
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .fail(format!("{}: {}", path, e));
                        break;
                    }
                }
            }
        });

        Ok(Self::with_reader(motion, counts_per_unit, reader))
    }

    fn with_reader(motion: Arc<Mutex<RelativeMotion>>, counts_per_unit: f32, reader: JoinHandle<()>) -> Self {
        Self {
            motion,
            counts_per_unit,
            reader,
        }
    }
}

impl InputSource for RelativeSource {
    fn poll(&mut self) -> Result<RawSample> {
        let mut motion = self.motion.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reason) = motion.failure() {
            return Err(BridgeError::DeviceReadFailure(reason.to_string()));
        }
        Ok(motion.take(self.counts_per_unit))
    }
}

impl Drop for RelativeSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Enumerates and opens evdev devices
#[derive(Debug, Clone)]
pub struct EvdevProvider {
    input_dir: PathBuf,
    known: Vec<KnownDevice>,
    mouse_counts_per_unit: f32,
    spatial_counts_per_unit: f32,
}

impl EvdevProvider {
    pub fn new(config: &Config) -> Self {
        Self::with_input_dir(INPUT_DIR, config)
    }

    /// Provider scanning a different directory
    pub fn with_input_dir<P: AsRef<Path>>(input_dir: P, config: &Config) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            known: config.devices.clone(),
            mouse_counts_per_unit: config.sampling.mouse_counts_per_unit,
            spatial_counts_per_unit: config.sampling.spatial_counts_per_unit,
        }
    }

    fn event_nodes(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.input_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read {}: {}", self.input_dir.display(), e);
                return Vec::new();
            }
        };

        let mut nodes: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .map_or(false, |name| name.to_string_lossy().starts_with("event"))
            })
            .collect();

        // Sorted for deterministic naming when several devices are attached
        nodes.sort();
        nodes
    }

    fn describe(&self, path: &Path, device: &Device) -> Option<DeviceDescriptor> {
        let id = device.input_id();
        let caps = Capabilities::of(device);
        let class = classify(id.vendor(), id.product(), &caps, &self.known)?;

        let name = known_device(id.vendor(), id.product(), &self.known)
            .map(|d| d.name.clone())
            .or_else(|| device.name().map(str::to_string))
            .unwrap_or_else(|| path.display().to_string());

        Some(DeviceDescriptor {
            name,
            class,
            axis_count: caps.axis_count,
            button_count: caps.button_count,
            path: path.to_string_lossy().to_string(),
            vendor_id: id.vendor(),
            product_id: id.product(),
        })
    }
}

impl DeviceProvider for EvdevProvider {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let mut devices: Vec<DeviceDescriptor> = Vec::new();

        for path in self.event_nodes() {
            let device = match Device::open(&path) {
                Ok(device) => device,
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Could not open {}: {}", path.display(), e);
                    continue;
                }
            };

            if let Some(mut descriptor) = self.describe(&path, &device) {
                debug!(
                    "Found {} device {} (vendor: 0x{:04x}, product: 0x{:04x})",
                    descriptor.class, descriptor.name, descriptor.vendor_id, descriptor.product_id
                );
                if devices.iter().any(|d| d.name == descriptor.name) {
                    let node = path.file_name().map(|n| n.to_string_lossy().to_string());
                    descriptor.name = format!("{} ({})", descriptor.name, node.unwrap_or_default());
                }
                devices.push(descriptor);
            }
        }

        devices
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn InputSource>> {
        let path = descriptor.path.as_str();
        let device = Device::open(path)
            .map_err(|e| BridgeError::ConnectFailure(format!("{}: {}", path, e)))?;
        let caps = Capabilities::of(&device);

        if caps.abs_xy && descriptor.class != DeviceClass::Mouse {
            info!("Reading absolute axes of {} at {}", descriptor.name, path);
            return Ok(Box::new(AbsoluteSource {
                device,
                path: path.to_string(),
            }));
        }

        if caps.rel_xy {
            let (mode, counts_per_unit) = match descriptor.class {
                DeviceClass::Mouse => (MotionMode::Accumulate, self.mouse_counts_per_unit),
                _ => (MotionMode::Latch, self.spatial_counts_per_unit),
            };
            info!("Reading relative axes of {} at {}", descriptor.name, path);
            return Ok(Box::new(RelativeSource::spawn(device, path, mode, counts_per_unit)?));
        }

        Err(BridgeError::ConnectFailure(format!(
            "{} has no X/Y axes",
            descriptor.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    fn rel(axis: RelativeAxisType, value: i32) -> InputEvent {
        InputEvent::new(EventType::RELATIVE, axis.0, value)
    }

    fn known() -> Vec<KnownDevice> {
        Config::default().devices
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_known_table_wins() {
        // SpaceMouse ids from the default table, even with mouse-like capabilities
        let caps = Capabilities {
            rel_xy: true,
            left_button: true,
            ..Default::default()
        };
        assert_eq!(
            classify(0x256f, 0xc635, &caps, &known()),
            Some(DeviceClass::SpatialSixDof)
        );
        assert_eq!(
            classify(0x046d, 0xb03a, &Capabilities::default(), &known()),
            Some(DeviceClass::Mouse)
        );
        assert_eq!(
            known_device(0x046d, 0xb03a, &known()).map(|d| d.name.as_str()),
            Some("Bluetooth_mouse")
        );
    }

    #[test]
    fn test_classify_by_capabilities() {
        let gamepad = Capabilities {
            abs_xy: true,
            gamepad_buttons: true,
            ..Default::default()
        };
        let mouse = Capabilities {
            rel_xy: true,
            left_button: true,
            ..Default::default()
        };
        let puck = Capabilities {
            rel_xy: true,
            ..Default::default()
        };

        assert_eq!(classify(0x054c, 0x0ce6, &gamepad, &[]), Some(DeviceClass::Gamepad));
        assert_eq!(classify(0x1bcf, 0x0005, &mouse, &[]), Some(DeviceClass::Mouse));
        assert_eq!(classify(0x256f, 0xc62e, &puck, &[]), Some(DeviceClass::SpatialSixDof));
    }

    #[test]
    fn test_unusable_devices_skipped() {
        // Keyboard-like: buttons but no axes
        let keyboard = Capabilities {
            button_count: 100,
            ..Default::default()
        };
        // Touchpad-like: absolute axes without gamepad buttons
        let touchpad = Capabilities {
            abs_xy: true,
            left_button: true,
            ..Default::default()
        };
        assert_eq!(classify(0x0001, 0x0001, &keyboard, &[]), None);
        assert_eq!(classify(0x0002, 0x0002, &touchpad, &[]), None);
        assert_eq!(classify(0x256f, 0x0001, &Capabilities::default(), &[]), None);
    }

    // ==================== Relative Motion Tests ====================

    #[test]
    fn test_mouse_motion_accumulates_and_clears() {
        let mut motion = RelativeMotion::new(MotionMode::Accumulate);
        motion.process_event(&rel(RelativeAxisType::REL_X, 10));
        motion.process_event(&rel(RelativeAxisType::REL_X, 15));
        motion.process_event(&rel(RelativeAxisType::REL_Y, -50));

        let sample = motion.take(50.0);
        assert!((sample.x - 0.5).abs() < 1e-6);
        assert!((sample.y - (-1.0)).abs() < 1e-6);

        assert_eq!(motion.take(50.0), AxisSample::zero());
    }

    #[test]
    fn test_spatial_motion_latches() {
        let mut motion = RelativeMotion::new(MotionMode::Latch);
        motion.process_event(&rel(RelativeAxisType::REL_X, 100));
        motion.process_event(&rel(RelativeAxisType::REL_X, 175));

        let first = motion.take(350.0);
        assert!((first.x - 0.5).abs() < 1e-6);
        // Value held until the device reports a new one
        assert_eq!(motion.take(350.0), first);
    }

    #[test]
    fn test_motion_clamped() {
        let mut motion = RelativeMotion::new(MotionMode::Accumulate);
        motion.process_event(&rel(RelativeAxisType::REL_X, 5000));
        assert_eq!(motion.take(50.0).x, 1.0);
    }

    #[test]
    fn test_other_events_ignored() {
        let mut motion = RelativeMotion::new(MotionMode::Accumulate);
        motion.process_event(&rel(RelativeAxisType::REL_WHEEL, 3));
        motion.process_event(&InputEvent::new(EventType::KEY, Key::BTN_LEFT.code(), 1));
        motion.process_event(&InputEvent::new(
            EventType::ABSOLUTE,
            AbsoluteAxisType::ABS_X.0,
            200,
        ));
        assert_eq!(motion.take(50.0), AxisSample::zero());
    }

    #[tokio::test]
    async fn test_relative_source_reports_stream_failure() {
        let motion = Arc::new(Mutex::new(RelativeMotion::new(MotionMode::Accumulate)));
        let reader = tokio::spawn(async {});
        let mut source = RelativeSource::with_reader(Arc::clone(&motion), 50.0, reader);

        motion.lock().unwrap().process_event(&rel(RelativeAxisType::REL_Y, 25));
        assert!((source.poll().unwrap().y - 0.5).abs() < 1e-6);

        motion.lock().unwrap().fail("/dev/input/event7: No such device");
        match source.poll() {
            Err(BridgeError::DeviceReadFailure(reason)) => assert!(reason.contains("event7")),
            other => panic!("Expected DeviceReadFailure, got: {:?}", other),
        }
    }

    // ==================== Provider Tests ====================

    #[test]
    fn test_missing_input_dir_lists_nothing() {
        let provider = EvdevProvider::with_input_dir("/nonexistent/input", &Config::default());
        assert!(provider.list_devices().is_empty());
    }

    #[test]
    fn test_non_event_nodes_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mice"), b"").unwrap();
        std::fs::write(dir.path().join("js0"), b"").unwrap();

        let provider = EvdevProvider::with_input_dir(dir.path(), &Config::default());
        assert!(provider.event_nodes().is_empty());
        assert!(provider.list_devices().is_empty());
    }

    #[test]
    fn test_event_nodes_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["event3", "event1", "event2"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let provider = EvdevProvider::with_input_dir(dir.path(), &Config::default());
        let names: Vec<String> = provider
            .event_nodes()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["event1", "event2", "event3"]);
        // Regular files are not evdev nodes
        assert!(provider.list_devices().is_empty());
    }

    #[test]
    fn test_open_missing_node_is_connect_failure() {
        let provider = EvdevProvider::new(&Config::default());
        let mut descriptor = DeviceDescriptor::new("ghost", DeviceClass::Gamepad, 2, 0);
        descriptor.path = "/dev/input/event_missing".to_string();

        assert!(matches!(
            provider.open(&descriptor),
            Err(BridgeError::ConnectFailure(_))
        ));
    }

    // Integration test - only runs with real hardware
    #[tokio::test]
    #[ignore]
    async fn test_list_and_poll_real_hardware() {
        let provider = EvdevProvider::new(&Config::default());
        let devices = provider.list_devices();
        for device in &devices {
            println!("{:?}", device);
        }

        let first = devices.first().expect("No input device found");
        let mut source = provider.open(first).unwrap();
        let sample = source.poll().unwrap();
        assert!(sample.x.abs() <= 1.0 && sample.y.abs() <= 1.0);
    }
}
