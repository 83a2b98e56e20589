//! Streamer role: one pairing per joined viewer

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{Flow, SessionHandler};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent, SessionRole};
use crate::media::{DeviceInfo, LocalStream, MediaKind, TrackChange, TrackController};
use crate::negotiation::{
    ConnectionState, IceCandidate, OfferOutcome, Pairing, PeerEvent, PeerEventKind,
    PeerEventReceiver, PeerEventSender, SessionDescription, TransportFactory,
};
use crate::signaling::{share_link, Envelope, SignalSender};

/// User actions on a running streamer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamerCommand {
    CloseVideo,
    /// Open or switch the camera; `None` selects the default device
    SelectVideo(Option<String>),
    /// Open or switch the microphone; `None` selects the default device
    SelectAudio(Option<String>),
    MuteAudio,
    UnmuteAudio,
    Stop,
}

pub struct StreamerSession {
    signal: SignalSender,
    events: Arc<EventBus>,
    factory: Arc<dyn TransportFactory>,
    controller: TrackController,
    stream: LocalStream,
    pairings: HashMap<String, Pairing>,
    peer_events: PeerEventSender,
    next_generation: u64,
    server_url: String,
    room_id: Option<String>,
}

impl StreamerSession {
    /// Create a session; transport events arrive on the returned receiver
    pub fn new(
        signal: SignalSender,
        events: Arc<EventBus>,
        factory: Arc<dyn TransportFactory>,
        controller: TrackController,
        server_url: impl Into<String>,
    ) -> (Self, PeerEventReceiver) {
        let (peer_events, peer_rx) = mpsc::unbounded_channel();
        let session = Self {
            signal,
            events,
            factory,
            controller,
            stream: LocalStream::new(),
            pairings: HashMap::new(),
            peer_events,
            next_generation: 1,
            server_url: server_url.into(),
            room_id: None,
        };
        (session, peer_rx)
    }

    /// Open the initial camera and microphone
    ///
    /// A device that fails to open is reported and skipped; the session
    /// streams whatever was acquired. Fails only if nothing could be opened.
    pub async fn start(&mut self, video: Option<&str>, audio: Option<&str>) -> Result<()> {
        let mut last_error = None;

        for (kind, device) in [(MediaKind::Video, video), (MediaKind::Audio, audio)] {
            match self.controller.open(&mut self.stream, kind, device).await {
                Ok(track) => info!("Local {} track {} ({})", kind, track.id(), track.label()),
                Err(e) => {
                    warn!("Failed to open {} device: {}", kind, e);
                    self.status(format!("Error: {}", e));
                    last_error = Some(e);
                }
            }
        }

        if self.stream.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| AppError::Internal("No local media".to_string())));
        }

        self.status("Waiting for viewers...");
        Ok(())
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn viewer_count(&self) -> usize {
        self.pairings.len()
    }

    pub fn pairing(&self, viewer_id: &str) -> Option<&Pairing> {
        self.pairings.get(viewer_id)
    }

    pub fn stream(&self) -> &LocalStream {
        &self.stream
    }

    pub async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.controller.devices().await
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Status: {}", message);
        self.events
            .publish(SessionEvent::status(SessionRole::Streamer, message));
    }

    fn publish_viewer_count(&self) {
        self.events.publish(SessionEvent::ViewerCountChanged {
            count: self.pairings.len(),
        });
    }

    fn pairing_mut(&mut self, viewer_id: &str) -> Result<&mut Pairing> {
        self.pairings
            .get_mut(viewer_id)
            .ok_or_else(|| AppError::negotiation(viewer_id, "No pairing for viewer"))
    }

    fn require_viewer_id(viewer_id: Option<String>, kind: &str) -> Result<String> {
        viewer_id.ok_or_else(|| AppError::negotiation("unknown", format!("{} without viewer_id", kind)))
    }

    async fn on_room_created(&mut self, room_id: String) {
        let link = share_link(&self.server_url, &room_id);
        info!("Room created: {} ({})", room_id, link);
        self.events.publish(SessionEvent::RoomCreated {
            room_id: room_id.clone(),
            share_link: link,
        });
        self.room_id = Some(room_id);
        self.status("Room created! Share the link with viewers.");
    }

    async fn on_viewer_joined(&mut self, viewer_id: String) -> Result<()> {
        info!("Viewer joined: {}", viewer_id);

        if let Some(mut stale) = self.pairings.remove(&viewer_id) {
            warn!("Viewer {} joined twice, replacing its pairing", viewer_id);
            stale.close().await;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let transport = self
            .factory
            .create(&viewer_id, generation, self.peer_events.clone())
            .await
            .map_err(|e| AppError::negotiation(&viewer_id, format!("Failed to create peer: {}", e)))?;
        let mut pairing = Pairing::new(viewer_id.clone(), generation, transport);

        for track in self.stream.tracks() {
            if let Err(e) = pairing.bind_track(track.clone()).await {
                pairing.close().await;
                return Err(e);
            }
        }

        self.pairings.insert(viewer_id.clone(), pairing);
        self.events.publish(SessionEvent::ViewerJoined {
            viewer_id: viewer_id.clone(),
        });
        self.publish_viewer_count();

        self.send_offer(&viewer_id).await
    }

    /// Offer to one viewer, or queue it behind an outstanding offer
    async fn send_offer(&mut self, viewer_id: &str) -> Result<()> {
        let result = self.pairing_mut(viewer_id)?.create_offer().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.abandon(viewer_id, e).await),
        };

        match outcome {
            OfferOutcome::Ready(sdp) => self.transmit_offer(viewer_id, sdp),
            OfferOutcome::Queued => debug!("Offer to {} queued", viewer_id),
        }
        Ok(())
    }

    fn transmit_offer(&self, viewer_id: &str, sdp: SessionDescription) {
        info!("Sending offer to {}", viewer_id);
        self.signal.send(Envelope::Offer {
            viewer_id: Some(viewer_id.to_string()),
            sdp,
        });
    }

    async fn on_answer(&mut self, viewer_id: String, sdp: SessionDescription) -> Result<()> {
        let result = self.pairing_mut(&viewer_id)?.apply_answer(sdp).await;
        match result {
            Ok(Some(follow_up)) => {
                self.transmit_offer(&viewer_id, follow_up);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(self.abandon(&viewer_id, e).await),
        }
    }

    /// A viewer-initiated offer; ignored while our own offer is outstanding
    async fn on_offer(&mut self, viewer_id: String, sdp: SessionDescription) -> Result<()> {
        let result = self.pairing_mut(&viewer_id)?.accept_offer(sdp).await;
        match result {
            Ok(Some(answer)) => {
                self.signal.send(Envelope::Answer {
                    viewer_id: Some(viewer_id),
                    sdp: answer,
                });
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(self.abandon(&viewer_id, e).await),
        }
    }

    async fn on_remote_candidate(
        &mut self,
        viewer_id: String,
        candidate: Option<IceCandidate>,
    ) -> Result<()> {
        self.pairing_mut(&viewer_id)?
            .add_ice_candidate(candidate)
            .await;
        Ok(())
    }

    async fn on_viewer_left(&mut self, viewer_id: &str) {
        info!("Viewer left: {}", viewer_id);
        self.remove_pairing(viewer_id).await;
    }

    async fn remove_pairing(&mut self, viewer_id: &str) -> bool {
        let Some(mut pairing) = self.pairings.remove(viewer_id) else {
            debug!("No pairing to remove for {}", viewer_id);
            return false;
        };
        pairing.close().await;

        self.events.publish(SessionEvent::ViewerLeft {
            viewer_id: viewer_id.to_string(),
        });
        self.publish_viewer_count();
        if self.pairings.is_empty() {
            self.status("Waiting for viewers...");
        } else {
            self.status(format!("Streaming to {} viewer(s)", self.pairings.len()));
        }
        true
    }

    /// Drop a pairing after a negotiation failure, passing the error on
    async fn abandon(&mut self, viewer_id: &str, err: AppError) -> AppError {
        warn!("Abandoning pairing {}: {}", viewer_id, err);
        self.remove_pairing(viewer_id).await;
        err
    }

    async fn apply_track_change(&mut self, change: TrackChange) {
        self.events.publish(SessionEvent::TrackChanged {
            kind: change.kind,
            action: change.action,
            device_id: change.device_id.clone(),
        });

        for viewer_id in &change.failed {
            self.abandon(viewer_id, AppError::negotiation(viewer_id, "Sender update failed"))
                .await;
        }

        for viewer_id in &change.renegotiate {
            if !self.pairings.contains_key(viewer_id) {
                continue;
            }
            if let Err(e) = self.send_offer(viewer_id).await {
                warn!("Renegotiation with {} failed: {}", viewer_id, e);
            }
        }
    }

    async fn on_command_error(&self, err: AppError) -> Result<Flow> {
        if matches!(err, AppError::Acquisition { .. }) {
            self.status(format!("Error: {}", err));
        }
        Err(err)
    }
}

#[async_trait]
impl SessionHandler for StreamerSession {
    type Command = StreamerCommand;

    fn role(&self) -> SessionRole {
        SessionRole::Streamer
    }

    async fn handle_envelope(&mut self, envelope: Envelope) -> Result<Flow> {
        trace!("Streamer handling {}", envelope.kind());

        match envelope {
            Envelope::RoomCreated { room_id } => self.on_room_created(room_id).await,
            Envelope::PeerJoined { viewer_id } => self.on_viewer_joined(viewer_id).await?,
            Envelope::Answer { viewer_id, sdp } => {
                let viewer_id = Self::require_viewer_id(viewer_id, "answer")?;
                self.on_answer(viewer_id, sdp).await?;
            }
            Envelope::Offer { viewer_id, sdp } => {
                let viewer_id = Self::require_viewer_id(viewer_id, "offer")?;
                self.on_offer(viewer_id, sdp).await?;
            }
            Envelope::IceCandidate {
                viewer_id,
                candidate,
            } => {
                let viewer_id = Self::require_viewer_id(viewer_id, "ice-candidate")?;
                self.on_remote_candidate(viewer_id, candidate).await?;
            }
            Envelope::PeerLeft { viewer_id } => self.on_viewer_left(&viewer_id).await,
            Envelope::Error { message } => {
                warn!("Signaling server error: {}", message);
                self.status(format!("Error: {}", message));
            }
            Envelope::StreamerLeft | Envelope::Keepalive => {}
        }

        Ok(Flow::Continue)
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) -> Flow {
        let Some(pairing) = self.pairings.get_mut(&event.peer_id) else {
            trace!("Dropping event for removed pairing {}", event.peer_id);
            return Flow::Continue;
        };
        if pairing.generation() != event.generation {
            trace!(
                "Dropping stale event for {} (generation {} != {})",
                event.peer_id,
                event.generation,
                pairing.generation()
            );
            return Flow::Continue;
        }

        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                self.signal.send(Envelope::IceCandidate {
                    viewer_id: Some(event.peer_id),
                    candidate: Some(candidate),
                });
            }
            PeerEventKind::ConnectionState(state) => {
                if !pairing.set_connection_state(state) {
                    return Flow::Continue;
                }
                self.events.publish(SessionEvent::PairingStateChanged {
                    peer_id: event.peer_id.clone(),
                    state,
                });

                if state == ConnectionState::Connected {
                    self.status(format!("Streaming to {} viewer(s)", self.pairings.len()));
                } else if state.is_terminal() {
                    info!("Pairing {} {}, removing", event.peer_id, state);
                    self.remove_pairing(&event.peer_id).await;
                }
            }
            PeerEventKind::RemoteTrack { kind, track_id } => {
                debug!("Ignoring remote {} track {} from {}", kind, track_id, event.peer_id);
            }
        }
        Flow::Continue
    }

    async fn handle_command(&mut self, command: StreamerCommand) -> Result<Flow> {
        debug!("Streamer command: {:?}", command);

        let result = match command {
            StreamerCommand::CloseVideo => {
                self.controller
                    .close_video(&mut self.stream, &mut self.pairings)
                    .await
            }
            StreamerCommand::SelectVideo(device) => {
                self.controller
                    .select_device(
                        &mut self.stream,
                        &mut self.pairings,
                        MediaKind::Video,
                        device.as_deref(),
                    )
                    .await
            }
            StreamerCommand::SelectAudio(device) => {
                self.controller
                    .select_device(
                        &mut self.stream,
                        &mut self.pairings,
                        MediaKind::Audio,
                        device.as_deref(),
                    )
                    .await
            }
            StreamerCommand::MuteAudio => self.controller.set_audio_muted(&self.stream, true),
            StreamerCommand::UnmuteAudio => self.controller.set_audio_muted(&self.stream, false),
            StreamerCommand::Stop => return Ok(Flow::Stop("stopped")),
        };

        match result {
            Ok(change) => {
                self.apply_track_change(change).await;
                Ok(Flow::Continue)
            }
            Err(e) => self.on_command_error(e).await,
        }
    }

    async fn shutdown(&mut self, reason: &str) {
        let viewers: Vec<String> = self.pairings.keys().cloned().collect();
        for viewer_id in viewers {
            if let Some(mut pairing) = self.pairings.remove(&viewer_id) {
                pairing.close().await;
            }
        }
        self.stream.stop_all();

        self.status("Disconnected");
        self.events.publish(SessionEvent::SessionClosed {
            role: SessionRole::Streamer,
            reason: reason.to_string(),
        });
        info!("Streamer session shut down ({})", reason);
    }
}
