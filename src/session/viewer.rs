//! Viewer role: a single pairing answering the streamer's offers

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{Flow, SessionHandler};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent, SessionRole};
use crate::negotiation::{
    ConnectionState, Pairing, PeerEvent, PeerEventKind, PeerEventReceiver, PeerEventSender,
    SessionDescription, TransportFactory,
};
use crate::signaling::{Envelope, SignalSender};

/// Peer id of the viewer's only pairing
pub const STREAMER_PEER_ID: &str = "streamer";

/// User actions on a running viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Stop,
}

pub struct ViewerSession {
    room_id: String,
    signal: SignalSender,
    events: Arc<EventBus>,
    factory: Arc<dyn TransportFactory>,
    peer_events: PeerEventSender,
    pairing: Option<Pairing>,
    generation: u64,
}

impl ViewerSession {
    pub fn new(
        room_id: impl Into<String>,
        signal: SignalSender,
        events: Arc<EventBus>,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, PeerEventReceiver) {
        let (peer_events, peer_rx) = mpsc::unbounded_channel();
        let session = Self {
            room_id: room_id.into(),
            signal,
            events,
            factory,
            peer_events,
            pairing: None,
            generation: 0,
        };
        (session, peer_rx)
    }

    /// Create the pairing to the streamer and wait for its offer
    pub async fn start(&mut self) -> Result<()> {
        self.generation += 1;
        let transport = self
            .factory
            .create(STREAMER_PEER_ID, self.generation, self.peer_events.clone())
            .await?;
        self.pairing = Some(Pairing::new(STREAMER_PEER_ID, self.generation, transport));

        info!("Joined room {}", self.room_id);
        self.status("Waiting for streamer...");
        Ok(())
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn pairing(&self) -> Option<&Pairing> {
        self.pairing.as_ref()
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Status: {}", message);
        self.events
            .publish(SessionEvent::status(SessionRole::Viewer, message));
    }

    fn pairing_mut(&mut self) -> Result<&mut Pairing> {
        self.pairing
            .as_mut()
            .ok_or_else(|| AppError::negotiation(STREAMER_PEER_ID, "No pairing to the streamer"))
    }

    /// Answer the streamer. A later offer simply replaces an earlier one.
    async fn on_offer(&mut self, sdp: SessionDescription) -> Result<()> {
        info!("Received offer");
        let answer = self.pairing_mut()?.accept_offer(sdp).await?;

        if let Some(answer) = answer {
            self.signal.send(Envelope::Answer {
                viewer_id: None,
                sdp: answer,
            });
            info!("Sent answer");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionHandler for ViewerSession {
    type Command = ViewerCommand;

    fn role(&self) -> SessionRole {
        SessionRole::Viewer
    }

    async fn handle_envelope(&mut self, envelope: Envelope) -> Result<Flow> {
        trace!("Viewer handling {}", envelope.kind());

        match envelope {
            Envelope::Offer { sdp, .. } => self.on_offer(sdp).await?,
            Envelope::IceCandidate { candidate, .. } => {
                self.pairing_mut()?.add_ice_candidate(candidate).await;
            }
            Envelope::Error { message } => {
                warn!("Signaling server error: {}", message);
                self.status(format!("Error: {}", message));
            }
            Envelope::StreamerLeft => {
                info!("Streamer left room {}", self.room_id);
                return Ok(Flow::Stop("streamer_left"));
            }
            Envelope::Keepalive => {}
            other => debug!("Viewer ignoring {}", other.kind()),
        }

        Ok(Flow::Continue)
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) -> Flow {
        let Some(pairing) = self.pairing.as_mut() else {
            return Flow::Continue;
        };
        if pairing.generation() != event.generation {
            trace!("Dropping stale event (generation {})", event.generation);
            return Flow::Continue;
        }

        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                self.signal.send(Envelope::IceCandidate {
                    viewer_id: None,
                    candidate: Some(candidate),
                });
            }
            PeerEventKind::ConnectionState(state) => {
                if !pairing.set_connection_state(state) {
                    return Flow::Continue;
                }
                self.events.publish(SessionEvent::PairingStateChanged {
                    peer_id: event.peer_id,
                    state,
                });

                if state.is_terminal() {
                    warn!("Connection to streamer {}, leaving room {}", state, self.room_id);
                    if let Some(mut pairing) = self.pairing.take() {
                        pairing.close().await;
                    }
                    return Flow::Stop("connection_failed");
                }
                match state {
                    ConnectionState::Disconnected => self.status("Disconnected"),
                    ConnectionState::Connected => info!("P2P connection established"),
                    _ => {}
                }
            }
            PeerEventKind::RemoteTrack { kind, track_id } => {
                info!("Received remote {} track", kind);
                self.events.publish(SessionEvent::RemoteTrack {
                    peer_id: event.peer_id,
                    kind,
                    track_id,
                });
                self.status("Connected - Receiving stream");
            }
        }
        Flow::Continue
    }

    async fn handle_command(&mut self, command: ViewerCommand) -> Result<Flow> {
        match command {
            ViewerCommand::Stop => Ok(Flow::Stop("stopped")),
        }
    }

    async fn shutdown(&mut self, reason: &str) {
        if let Some(mut pairing) = self.pairing.take() {
            pairing.close().await;
        }

        if reason == "channel_error" {
            self.status("Connection error");
        } else {
            self.status("Disconnected");
        }
        self.events.publish(SessionEvent::SessionClosed {
            role: SessionRole::Viewer,
            reason: reason.to_string(),
        });
        info!("Viewer session shut down ({})", reason);
    }
}
