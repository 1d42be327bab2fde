//! The realtime client facade and its media driver loop.
//!
//! Call-session events drive the media lifecycle: `Established` joins the
//! transport channel and publishes local tracks, any `Closed` runs an
//! unconditional teardown. Device acquisition always happens before the
//! first signaling write, so a device or permission failure never leaves a
//! dangling call record in the store.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use aula_call::{spawn_call_session, CallError, CallEvent, CallPhase, CallRecord, CallSession};
use aula_chat::{spawn_feed, ChatService, MessageFeed};
use aula_media::{MediaDevices, MediaError, MediaSessionManager, MediaState, MediaTransport};
use aula_shared::{CallKind, Conversation, ConversationRegistry, Message, MessageId, UserId};
use aula_store::SharedStore;

use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::error::{ClientError, Result};
use crate::events::ClientEvent;

pub struct RealtimeClient {
    ctx: ClientContext,
    registry: ConversationRegistry,
    store: Arc<dyn SharedStore>,
    chat: ChatService,
    calls: CallSession,
    media: Arc<Mutex<MediaSessionManager>>,
    ringing: Arc<StdMutex<Option<CallRecord>>>,
    events_rx: Option<mpsc::Receiver<ClientEvent>>,
    driver: JoinHandle<()>,
}

impl RealtimeClient {
    /// Wire up chat, call control, and media for one signed-in user.
    pub async fn connect(
        ctx: ClientContext,
        config: ClientConfig,
        store: Arc<dyn SharedStore>,
        transport: Arc<dyn MediaTransport>,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<Self> {
        let (calls, call_events) = spawn_call_session(ctx.user.clone(), store.clone()).await?;

        let media = Arc::new(Mutex::new(MediaSessionManager::new(
            devices,
            transport,
            ctx.user.clone(),
        )));
        let ringing = Arc::new(StdMutex::new(None));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);

        let driver = tokio::spawn(drive(
            call_events,
            media.clone(),
            calls.clone(),
            ringing.clone(),
            event_tx,
        ));

        Ok(Self {
            chat: ChatService::new(store.clone(), ctx.user.clone()),
            registry: ConversationRegistry::new(config.advisor),
            ctx,
            store,
            calls,
            media,
            ringing,
            events_rx: Some(event_rx),
            driver,
        })
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Take the client event stream. Yields `None` after the first call.
    pub fn events(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events_rx.take()
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    pub async fn send_message(
        &self,
        conversation: &Conversation,
        text: &str,
    ) -> Result<Message> {
        Ok(self.chat.send(conversation, text).await?)
    }

    pub async fn edit_message(
        &self,
        conversation: &Conversation,
        id: &MessageId,
        text: &str,
    ) -> Result<Message> {
        Ok(self.chat.edit(conversation, id, text).await?)
    }

    pub async fn delete_message(
        &self,
        conversation: &Conversation,
        id: &MessageId,
    ) -> Result<()> {
        Ok(self.chat.delete(conversation, id).await?)
    }

    /// The live, merged, ordered message view of a conversation.
    pub async fn conversation_feed(&self, conversation: &Conversation) -> Result<MessageFeed> {
        Ok(spawn_feed(self.store.clone(), &self.registry, conversation).await?)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Start a call to `peer`.
    ///
    /// Local media is acquired first; device or permission failures abort
    /// before any record is written. If the signaling write fails after
    /// acquisition, the tracks are released again.
    pub async fn start_call(&self, peer: UserId, kind: CallKind) -> Result<CallRecord> {
        {
            let mut media = self.media.lock().await;
            media.acquire_local(kind)?;
        }

        match self.calls.start_call(peer, kind).await {
            Ok(record) => Ok(record),
            Err(error) => {
                self.media.lock().await.teardown().await;
                Err(error.into())
            }
        }
    }

    /// Accept the currently ringing incoming call.
    ///
    /// If local media cannot be acquired the call is rejected, so the
    /// initiator resolves immediately instead of ringing forever.
    pub async fn accept_call(&self) -> Result<CallRecord> {
        let pending = self.ringing.lock().expect("ringing lock").clone();
        let Some(pending) = pending else {
            return Err(CallError::InvalidState.into());
        };

        let acquired = self.media.lock().await.acquire_local(pending.kind);
        if let Err(error) = acquired {
            if let Err(reject) = self.calls.reject_call().await {
                warn!(error = %reject, "Failed to reject unanswerable call");
            }
            self.media.lock().await.teardown().await;
            return Err(error.into());
        }

        match self.calls.accept_call().await {
            Ok(record) => Ok(record),
            Err(error) => {
                self.media.lock().await.teardown().await;
                Err(error.into())
            }
        }
    }

    pub async fn reject_call(&self) -> Result<()> {
        let result = self.calls.reject_call().await;
        // Defensive: nothing should be held yet, but never leak on exit.
        self.media.lock().await.teardown().await;
        Ok(result?)
    }

    /// Hang up. Local media is released even when the `ended` write fails;
    /// the store error is still surfaced.
    pub async fn end_call(&self) -> Result<()> {
        let result = self.calls.end_call().await;
        self.media.lock().await.teardown().await;
        Ok(result?)
    }

    pub fn call_phase(&self) -> CallPhase {
        self.calls.phase()
    }

    pub fn phase_watch(&self) -> watch::Receiver<CallPhase> {
        self.calls.phase_watch()
    }

    // ------------------------------------------------------------------
    // Media toggles
    // ------------------------------------------------------------------

    /// Returns the new muted state.
    pub async fn toggle_mic(&self) -> bool {
        self.media.lock().await.toggle_mic()
    }

    /// Returns whether the camera is now on.
    pub async fn toggle_camera(&self) -> bool {
        self.media.lock().await.toggle_camera()
    }

    /// Returns whether screen sharing is now active.
    pub async fn toggle_screen_share(&self) -> Result<bool> {
        Ok(self.media.lock().await.toggle_screen_share().await?)
    }

    pub async fn media_state(&self) -> MediaState {
        self.media.lock().await.state()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Maps call-session events onto the media lifecycle.
async fn drive(
    mut call_events: mpsc::Receiver<CallEvent>,
    media: Arc<Mutex<MediaSessionManager>>,
    calls: CallSession,
    ringing: Arc<StdMutex<Option<CallRecord>>>,
    events: mpsc::Sender<ClientEvent>,
) {
    while let Some(event) = call_events.recv().await {
        match event {
            CallEvent::IncomingRinging { record } => {
                *ringing.lock().expect("ringing lock") = Some(record.clone());
                let _ = events.send(ClientEvent::IncomingCall { record }).await;
            }

            CallEvent::Established { record } => {
                ringing.lock().expect("ringing lock").take();

                let setup = {
                    let mut media = media.lock().await;
                    // Tracks are normally held already (acquired before the
                    // signaling write); this is a no-op then.
                    let result = match media.acquire_local(record.kind) {
                        Ok(()) => match media.join_transport(&record.channel).await {
                            Ok(()) => media.publish_local().await,
                            Err(error) => Err(error),
                        },
                        Err(error) => Err(error),
                    };
                    result.map(|()| media.remote_events())
                };

                match setup {
                    Ok(remote) => {
                        if let Some(mut remote) = remote {
                            let forward = events.clone();
                            tokio::spawn(async move {
                                while let Some(event) = remote.recv().await {
                                    if forward.send(ClientEvent::Remote(event)).await.is_err() {
                                        break;
                                    }
                                }
                            });
                        }
                        let _ = events.send(ClientEvent::CallConnected { record }).await;
                    }
                    Err(error) => {
                        warn!(%error, "Media setup failed, closing the call");
                        if let Err(end) = calls.end_call().await {
                            debug!(error = %end, "Hangup after media failure did not go through");
                        }
                        media.lock().await.teardown().await;
                        let _ = events
                            .send(ClientEvent::CallFailed {
                                reason: error.to_string(),
                            })
                            .await;
                    }
                }
            }

            CallEvent::Closed { phase, record } => {
                ringing.lock().expect("ringing lock").take();
                media.lock().await.teardown().await;
                let _ = events.send(ClientEvent::CallClosed { phase, record }).await;
            }
        }
    }
    debug!("Client driver loop terminated");
}
