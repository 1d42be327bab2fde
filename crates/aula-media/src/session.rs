//! Local media session lifecycle.
//!
//! Owns the local capture tracks and the transport session for one call.
//! `teardown` is the single release path: it stops every track, leaves the
//! transport channel, and resets all flags, and it must be reached on every
//! way out of a call (accept failure, rejection, hangup, record removal,
//! navigation away). It is idempotent so callers can invoke it defensively.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aula_shared::{CallKind, ChannelRef, UserId};

use crate::devices::{DeviceError, MediaDevices};
use crate::track::{LocalTrack, TrackKind};
use crate::transport::{MediaTransport, RemoteEvent, TransportError, TransportSession};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("No active media session")]
    NotActive,
}

/// Snapshot of the local media state, for UI consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaState {
    pub mic_muted: bool,
    pub camera_on: bool,
    pub screen_sharing: bool,
    pub track_count: usize,
}

pub struct MediaSessionManager {
    devices: Arc<dyn MediaDevices>,
    transport: Arc<dyn MediaTransport>,
    local_user: UserId,
    session: Option<Box<dyn TransportSession>>,
    tracks: Vec<LocalTrack>,
    mic_muted: bool,
    camera_on: bool,
    screen_sharing: bool,
}

impl MediaSessionManager {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        transport: Arc<dyn MediaTransport>,
        local_user: UserId,
    ) -> Self {
        Self {
            devices,
            transport,
            local_user,
            session: None,
            tracks: Vec::new(),
            mic_muted: false,
            camera_on: false,
            screen_sharing: false,
        }
    }

    /// Acquire local capture tracks for a call of the given kind.
    ///
    /// A microphone is required. The camera is optional: a video call
    /// without one degrades to audio-only. No-op when tracks are already
    /// held, so eager acquisition and a later accept do not double up.
    pub fn acquire_local(&mut self, kind: CallKind) -> Result<(), MediaError> {
        if !self.tracks.is_empty() {
            return Ok(());
        }

        let microphone = self.devices.create_microphone_track()?;
        self.tracks.push(microphone);
        self.mic_muted = false;

        if kind == CallKind::Video {
            match self.devices.create_camera_track() {
                Ok(camera) => {
                    self.tracks.push(camera);
                    self.camera_on = true;
                }
                Err(DeviceError::NoCamera) => {
                    warn!("No camera available, continuing audio-only");
                }
                Err(error) => {
                    // The microphone was already acquired; release it
                    // before surfacing the failure.
                    self.release_tracks();
                    return Err(error.into());
                }
            }
        }

        debug!(tracks = self.tracks.len(), ?kind, "Local media acquired");
        Ok(())
    }

    /// Join the transport channel for an accepted call.
    pub async fn join_transport(&mut self, channel: &ChannelRef) -> Result<(), MediaError> {
        let session = self.transport.join(channel, &self.local_user).await?;
        self.session = Some(session);
        info!(channel = %channel, "Joined media channel");
        Ok(())
    }

    /// Publish every held local track to the joined session.
    pub async fn publish_local(&mut self) -> Result<(), MediaError> {
        let session = self.session.as_mut().ok_or(MediaError::NotActive)?;
        session.publish(&self.tracks).await?;
        Ok(())
    }

    /// Take the remote participant event feed (once, after joining).
    pub fn remote_events(&mut self) -> Option<mpsc::UnboundedReceiver<RemoteEvent>> {
        self.session.as_mut().and_then(|s| s.remote_events())
    }

    /// Flip the microphone. Returns the new muted state.
    pub fn toggle_mic(&mut self) -> bool {
        let Some(microphone) = self.track_of(TrackKind::Microphone) else {
            warn!("Mic toggle with no microphone track");
            return self.mic_muted;
        };
        self.mic_muted = !self.mic_muted;
        microphone.set_enabled(!self.mic_muted);
        debug!(muted = self.mic_muted, "Mic toggled");
        self.mic_muted
    }

    /// Flip the camera feed. Returns whether the camera is now on.
    pub fn toggle_camera(&mut self) -> bool {
        let Some(camera) = self.track_of(TrackKind::Camera) else {
            warn!("Camera toggle on an audio-only session");
            return false;
        };
        self.camera_on = !self.camera_on;
        camera.set_enabled(self.camera_on);
        debug!(camera = self.camera_on, "Camera toggled");
        self.camera_on
    }

    /// Swap the camera for a screen-capture track, or back.
    ///
    /// Enabling unpublishes the camera (if any) and publishes a fresh
    /// screen track; disabling releases the screen track and republishes
    /// the camera, leaving exactly the pre-share tracks attached. Returns
    /// whether screen sharing is now active.
    pub async fn toggle_screen_share(&mut self) -> Result<bool, MediaError> {
        if self.session.is_none() {
            return Err(MediaError::NotActive);
        }

        if !self.screen_sharing {
            let screen = self.devices.create_screen_track()?;
            let camera = self.track_of(TrackKind::Camera);

            let session = self.session.as_mut().expect("checked above");
            if let Some(camera) = &camera {
                session.unpublish(std::slice::from_ref(camera)).await?;
            }
            if let Err(error) = session.publish(std::slice::from_ref(&screen)).await {
                // Roll back so the toggle never half-applies.
                screen.stop();
                if let Some(camera) = &camera {
                    let _ = session.publish(std::slice::from_ref(camera)).await;
                }
                return Err(error.into());
            }

            self.tracks.push(screen);
            self.screen_sharing = true;
            info!("Screen sharing started");
        } else {
            let Some(index) = self.tracks.iter().position(|t| t.kind() == TrackKind::Screen)
            else {
                self.screen_sharing = false;
                return Ok(false);
            };
            let screen = self.tracks.remove(index);

            let session = self.session.as_mut().expect("checked above");
            session.unpublish(std::slice::from_ref(&screen)).await?;
            screen.stop();

            if let Some(camera) = self.track_of(TrackKind::Camera) {
                let session = self.session.as_mut().expect("checked above");
                session.publish(std::slice::from_ref(&camera)).await?;
            }
            self.screen_sharing = false;
            info!("Screen sharing stopped");
        }

        Ok(self.screen_sharing)
    }

    /// Release everything: stop and drop all local tracks, leave the
    /// transport session, reset all flags. Safe to call repeatedly and on
    /// sessions that never joined.
    pub async fn teardown(&mut self) {
        self.release_tracks();

        if let Some(mut session) = self.session.take() {
            if let Err(error) = session.leave().await {
                warn!(%error, "Transport leave failed during teardown");
            }
        }

        self.mic_muted = false;
        self.camera_on = false;
        self.screen_sharing = false;
        debug!("Media session torn down");
    }

    pub fn state(&self) -> MediaState {
        MediaState {
            mic_muted: self.mic_muted,
            camera_on: self.camera_on,
            screen_sharing: self.screen_sharing,
            track_count: self.tracks.len(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn track_of(&self, kind: TrackKind) -> Option<LocalTrack> {
        self.tracks.iter().find(|t| t.kind() == kind).cloned()
    }

    fn release_tracks(&mut self) {
        for track in self.tracks.drain(..) {
            track.stop();
        }
    }
}
