//! Device directories and track creation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::track::{LocalTrack, MediaTrack, TrackKind};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No microphone available")]
    NoMicrophone,

    #[error("No camera available")]
    NoCamera,

    #[error("Device access denied: {0}")]
    PermissionDenied(String),

    #[error("Device error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: TrackKind,
}

/// Capture device directory. A call needs at least a microphone; camera and
/// screen tracks are optional extras.
pub trait MediaDevices: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;
    fn create_microphone_track(&self) -> Result<LocalTrack, DeviceError>;
    fn create_camera_track(&self) -> Result<LocalTrack, DeviceError>;
    fn create_screen_track(&self) -> Result<LocalTrack, DeviceError>;
}

// ---------------------------------------------------------------------------
// System devices (cpal)
// ---------------------------------------------------------------------------

/// Real hardware directory. Audio devices are discovered through cpal;
/// camera and screen capture pipelines are owned by the transport SDK, so
/// their tracks here carry identity and enablement state only.
pub struct SystemDevices;

impl SystemDevices {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for SystemDevices {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();
        let inputs = host
            .input_devices()
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        let mut devices = Vec::new();
        for device in inputs {
            devices.push(DeviceInfo {
                name: device.name().unwrap_or_else(|_| "unknown input".to_string()),
                kind: TrackKind::Microphone,
            });
        }
        Ok(devices)
    }

    fn create_microphone_track(&self) -> Result<LocalTrack, DeviceError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(DeviceError::NoMicrophone)?;
        let name = device.name().unwrap_or_else(|_| "default input".to_string());

        info!(device = %name, "Using input device");
        Ok(Arc::new(SimpleTrack::new(TrackKind::Microphone)))
    }

    fn create_camera_track(&self) -> Result<LocalTrack, DeviceError> {
        Ok(Arc::new(SimpleTrack::new(TrackKind::Camera)))
    }

    fn create_screen_track(&self) -> Result<LocalTrack, DeviceError> {
        Ok(Arc::new(SimpleTrack::new(TrackKind::Screen)))
    }
}

struct SimpleTrack {
    id: Uuid,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl SimpleTrack {
    fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }
}

impl MediaTrack for SimpleTrack {
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        debug!(kind = ?self.kind, enabled, "Track enablement changed");
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(kind = ?self.kind, "Track stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Virtual devices
// ---------------------------------------------------------------------------

/// Configurable device directory for development and tests.
///
/// Tracks it hands out are counted while live, so tests can assert that
/// teardown released every handle.
#[derive(Clone)]
pub struct VirtualDevices {
    state: Arc<VirtualState>,
}

struct VirtualState {
    has_microphone: bool,
    has_camera: bool,
    deny_access: bool,
    live: AtomicUsize,
}

impl VirtualDevices {
    /// Microphone and camera both present.
    pub fn new() -> Self {
        Self::with(true, true, false)
    }

    /// Microphone only.
    pub fn audio_only() -> Self {
        Self::with(true, false, false)
    }

    /// No capture devices at all.
    pub fn without_microphone() -> Self {
        Self::with(false, false, false)
    }

    /// Devices present but access is refused by the user/OS.
    pub fn denying_access() -> Self {
        Self::with(true, true, true)
    }

    fn with(has_microphone: bool, has_camera: bool, deny_access: bool) -> Self {
        Self {
            state: Arc::new(VirtualState {
                has_microphone,
                has_camera,
                deny_access,
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of handed-out tracks not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    fn create(&self, kind: TrackKind) -> Result<LocalTrack, DeviceError> {
        if self.state.deny_access {
            return Err(DeviceError::PermissionDenied(
                "denied by virtual device policy".to_string(),
            ));
        }
        match kind {
            TrackKind::Microphone if !self.state.has_microphone => {
                return Err(DeviceError::NoMicrophone)
            }
            TrackKind::Camera if !self.state.has_camera => return Err(DeviceError::NoCamera),
            _ => {}
        }

        self.state.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(VirtualTrack {
            id: Uuid::new_v4(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            state: self.state.clone(),
        }))
    }
}

impl Default for VirtualDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for VirtualDevices {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let mut devices = Vec::new();
        if self.state.has_microphone {
            devices.push(DeviceInfo {
                name: "virtual microphone".to_string(),
                kind: TrackKind::Microphone,
            });
        }
        if self.state.has_camera {
            devices.push(DeviceInfo {
                name: "virtual camera".to_string(),
                kind: TrackKind::Camera,
            });
        }
        Ok(devices)
    }

    fn create_microphone_track(&self) -> Result<LocalTrack, DeviceError> {
        self.create(TrackKind::Microphone)
    }

    fn create_camera_track(&self) -> Result<LocalTrack, DeviceError> {
        self.create(TrackKind::Camera)
    }

    fn create_screen_track(&self) -> Result<LocalTrack, DeviceError> {
        self.create(TrackKind::Screen)
    }
}

struct VirtualTrack {
    id: Uuid,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    state: Arc<VirtualState>,
}

impl MediaTrack for VirtualTrack {
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_devices_count_live_tracks() {
        let devices = VirtualDevices::new();
        let mic = devices.create_microphone_track().unwrap();
        let cam = devices.create_camera_track().unwrap();
        assert_eq!(devices.live_tracks(), 2);

        mic.stop();
        mic.stop(); // idempotent
        assert_eq!(devices.live_tracks(), 1);

        cam.stop();
        assert_eq!(devices.live_tracks(), 0);
    }

    #[test]
    fn missing_devices_surface_typed_errors() {
        let devices = VirtualDevices::without_microphone();
        assert!(matches!(
            devices.create_microphone_track(),
            Err(DeviceError::NoMicrophone)
        ));

        let devices = VirtualDevices::audio_only();
        assert!(devices.create_microphone_track().is_ok());
        assert!(matches!(
            devices.create_camera_track(),
            Err(DeviceError::NoCamera)
        ));
    }

    #[test]
    fn denied_access_blocks_every_kind() {
        let devices = VirtualDevices::denying_access();
        assert!(matches!(
            devices.create_microphone_track(),
            Err(DeviceError::PermissionDenied(_))
        ));
        assert!(matches!(
            devices.create_screen_track(),
            Err(DeviceError::PermissionDenied(_))
        ));
        assert_eq!(devices.live_tracks(), 0);
    }

    #[test]
    fn enumerate_reflects_configuration() {
        assert_eq!(VirtualDevices::new().enumerate().unwrap().len(), 2);
        assert_eq!(VirtualDevices::audio_only().enumerate().unwrap().len(), 1);
        assert!(VirtualDevices::without_microphone()
            .enumerate()
            .unwrap()
            .is_empty());
    }
}
