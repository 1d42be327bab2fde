//! # aula-media
//!
//! Local media lifecycle for calls: device acquisition, mute/camera/screen
//! toggles, and the join/publish/leave lifecycle against the peer media
//! transport.
//!
//! The transport itself is an external collaborator behind the
//! [`MediaTransport`] trait; [`LoopbackTransport`] is an in-process
//! implementation for development and tests. Device access goes through
//! [`MediaDevices`], with a cpal-backed [`SystemDevices`] for real hardware
//! and [`VirtualDevices`] for tests.

pub mod devices;
pub mod loopback;
pub mod session;
pub mod track;
pub mod transport;

pub use devices::{DeviceError, DeviceInfo, MediaDevices, SystemDevices, VirtualDevices};
pub use loopback::LoopbackTransport;
pub use session::{MediaError, MediaSessionManager, MediaState};
pub use track::{LocalTrack, MediaTrack, TrackKind};
pub use transport::{MediaTransport, RemoteEvent, TransportError, TransportSession};
