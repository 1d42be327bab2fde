//! In-process media transport.
//!
//! Joins sessions by channel name inside one process and fans publish,
//! unpublish, and leave out to co-joined sessions as remote events. Used by
//! the end-to-end tests and local development; carries no actual media.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use aula_shared::{ChannelRef, UserId};

use crate::track::{LocalTrack, TrackKind};
use crate::transport::{MediaTransport, RemoteEvent, TransportError, TransportSession};

#[derive(Default)]
struct Rooms {
    next_member: u64,
    rooms: HashMap<String, HashMap<u64, Member>>,
}

struct Member {
    user: UserId,
    tx: mpsc::UnboundedSender<RemoteEvent>,
    published: Vec<TrackKind>,
}

#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<Rooms>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participant_count(&self, channel: &ChannelRef) -> usize {
        let rooms = self.inner.lock().expect("rooms lock");
        rooms.rooms.get(channel.as_str()).map_or(0, HashMap::len)
    }

    /// Every (participant, kind) pair currently published on `channel`,
    /// sorted for deterministic assertions.
    pub fn published_tracks(&self, channel: &ChannelRef) -> Vec<(UserId, TrackKind)> {
        let rooms = self.inner.lock().expect("rooms lock");
        let mut published: Vec<(UserId, TrackKind)> = rooms
            .rooms
            .get(channel.as_str())
            .into_iter()
            .flat_map(HashMap::values)
            .flat_map(|m| m.published.iter().map(|kind| (m.user.clone(), *kind)))
            .collect();
        published.sort();
        published
    }
}

impl Rooms {
    fn broadcast(&self, channel: &str, from: u64, event: RemoteEvent) {
        if let Some(room) = self.rooms.get(channel) {
            for (id, member) in room {
                if *id != from {
                    let _ = member.tx.send(event.clone());
                }
            }
        }
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn join(
        &self,
        channel: &ChannelRef,
        user: &UserId,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.inner.lock().expect("rooms lock");
        let id = rooms.next_member;
        rooms.next_member += 1;

        let room = rooms.rooms.entry(channel.as_str().to_string()).or_default();

        // Catch the new member up on what is already published.
        for member in room.values() {
            for kind in &member.published {
                let _ = tx.send(RemoteEvent::TrackPublished {
                    user: member.user.clone(),
                    kind: *kind,
                });
            }
        }

        room.insert(
            id,
            Member {
                user: user.clone(),
                tx,
                published: Vec::new(),
            },
        );
        debug!(channel = %channel, user = %user.short(), "Joined loopback channel");

        Ok(Box::new(LoopbackSession {
            id,
            user: user.clone(),
            channel: channel.as_str().to_string(),
            rooms: self.inner.clone(),
            events: Some(rx),
            left: false,
        }))
    }
}

struct LoopbackSession {
    id: u64,
    user: UserId,
    channel: String,
    rooms: Arc<Mutex<Rooms>>,
    events: Option<mpsc::UnboundedReceiver<RemoteEvent>>,
    left: bool,
}

impl LoopbackSession {
    fn leave_now(&mut self) {
        if self.left {
            return;
        }
        self.left = true;

        let mut rooms = self.rooms.lock().expect("rooms lock");
        if let Some(room) = rooms.rooms.get_mut(&self.channel) {
            room.remove(&self.id);
            if room.is_empty() {
                rooms.rooms.remove(&self.channel);
            }
        }
        rooms.broadcast(
            &self.channel,
            self.id,
            RemoteEvent::ParticipantLeft {
                user: self.user.clone(),
            },
        );
        debug!(channel = %self.channel, user = %self.user.short(), "Left loopback channel");
    }
}

#[async_trait]
impl TransportSession for LoopbackSession {
    async fn publish(&mut self, tracks: &[LocalTrack]) -> Result<(), TransportError> {
        if self.left {
            return Err(TransportError::Closed);
        }

        let mut rooms = self.rooms.lock().expect("rooms lock");
        for track in tracks {
            let kind = track.kind();
            if let Some(member) = rooms
                .rooms
                .get_mut(&self.channel)
                .and_then(|room| room.get_mut(&self.id))
            {
                member.published.push(kind);
            }
            rooms.broadcast(
                &self.channel,
                self.id,
                RemoteEvent::TrackPublished {
                    user: self.user.clone(),
                    kind,
                },
            );
        }
        Ok(())
    }

    async fn unpublish(&mut self, tracks: &[LocalTrack]) -> Result<(), TransportError> {
        if self.left {
            return Err(TransportError::Closed);
        }

        let mut rooms = self.rooms.lock().expect("rooms lock");
        for track in tracks {
            let kind = track.kind();
            if let Some(member) = rooms
                .rooms
                .get_mut(&self.channel)
                .and_then(|room| room.get_mut(&self.id))
            {
                if let Some(index) = member.published.iter().position(|k| *k == kind) {
                    member.published.remove(index);
                }
            }
            rooms.broadcast(
                &self.channel,
                self.id,
                RemoteEvent::TrackUnpublished {
                    user: self.user.clone(),
                    kind,
                },
            );
        }
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), TransportError> {
        self.leave_now();
        Ok(())
    }

    fn remote_events(&mut self) -> Option<mpsc::UnboundedReceiver<RemoteEvent>> {
        self.events.take()
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.leave_now();
    }
}
