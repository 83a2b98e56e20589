//! webrtc-rs backed peer transport

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use super::transport::{PeerEvent, PeerEventKind, PeerEventSender, PeerTransport, TransportFactory};
use super::types::{ConnectionState, IceCandidate, SdpType, SessionDescription};
use crate::config::WebRtcConfig;
use crate::error::{AppError, Result};
use crate::media::{MediaKind, MediaTrack};

/// Build the ICE server list from STUN and TURN settings
pub fn ice_servers(config: &WebRtcConfig) -> Vec<RTCIceServer> {
    let mut ice_servers = vec![];

    for stun_url in &config.stun_servers {
        ice_servers.push(RTCIceServer {
            urls: vec![stun_url.clone()],
            ..Default::default()
        });
    }

    for turn in &config.turn_servers {
        ice_servers.push(RTCIceServer {
            urls: turn.urls.clone(),
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        });
    }

    ice_servers
}

/// Creates one `RTCPeerConnection` per pairing
pub struct RtcTransportFactory {
    config: WebRtcConfig,
}

impl RtcTransportFactory {
    pub fn new(config: WebRtcConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        generation: u64,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerTransport>> {
        let transport = RtcTransport::new(&self.config, peer_id, generation, events).await?;
        Ok(Box::new(transport))
    }
}

/// Peer connection wrapper reporting its callbacks as `PeerEvent`s
pub struct RtcTransport {
    peer_id: String,
    pc: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<MediaKind, Arc<RTCRtpSender>>>,
}

impl RtcTransport {
    pub async fn new(
        config: &WebRtcConfig,
        peer_id: &str,
        generation: u64,
        events: PeerEventSender,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;

        let transport = Self {
            peer_id: peer_id.to_string(),
            pc: Arc::new(pc),
            senders: Mutex::new(HashMap::new()),
        };
        transport.setup_event_handlers(generation, events);

        debug!("Peer connection created for {} (generation {})", peer_id, generation);
        Ok(transport)
    }

    fn setup_event_handlers(&self, generation: u64, events: PeerEventSender) {
        let emit = {
            let peer_id = self.peer_id.clone();
            move |events: &PeerEventSender, kind: PeerEventKind| {
                // The session may already be gone
                let _ = events.send(PeerEvent {
                    peer_id: peer_id.clone(),
                    generation,
                    kind,
                });
            }
        };

        let state_events = events.clone();
        let state_emit = emit.clone();
        let peer_id = self.peer_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let events = state_events.clone();
                let emit = state_emit.clone();
                let peer_id = peer_id.clone();

                Box::pin(async move {
                    let new_state = match s {
                        RTCPeerConnectionState::New => ConnectionState::New,
                        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => ConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => ConnectionState::Failed,
                        RTCPeerConnectionState::Closed => ConnectionState::Closed,
                        _ => return,
                    };

                    info!("Peer {} connection state: {}", peer_id, new_state);
                    emit(&events, PeerEventKind::ConnectionState(new_state));
                })
            }));

        let candidate_events = events.clone();
        let candidate_emit = emit.clone();
        let peer_id = self.peer_id.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = candidate_events.clone();
                let emit = candidate_emit.clone();
                let peer_id = peer_id.clone();

                Box::pin(async move {
                    // None marks the end of gathering
                    let Some(c) = candidate else {
                        return;
                    };
                    match c.to_json() {
                        Ok(init) => {
                            trace!("Local ICE candidate for {}: {}", peer_id, init.candidate);
                            emit(
                                &events,
                                PeerEventKind::LocalCandidate(IceCandidate {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_mline_index: init.sdp_mline_index,
                                    username_fragment: init.username_fragment,
                                }),
                            );
                        }
                        Err(e) => warn!("Failed to serialize ICE candidate for {}: {}", peer_id, e),
                    }
                })
            }));

        let track_events = events;
        let track_emit = emit;
        let peer_id = self.peer_id.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                let emit = track_emit.clone();
                let peer_id = peer_id.clone();

                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        RTPCodecType::Video => MediaKind::Video,
                        _ => return,
                    };

                    info!("Remote {} track from {}: {}", kind, peer_id, track.id());
                    emit(
                        &events,
                        PeerEventKind::RemoteTrack {
                            kind,
                            track_id: track.id(),
                        },
                    );
                })
            },
        ));
    }

    fn to_rtc(&self, description: SessionDescription) -> Result<RTCSessionDescription> {
        let parsed = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp),
            SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        };
        parsed.map_err(|e| AppError::negotiation(&self.peer_id, format!("Invalid SDP: {}", e)))
    }

    fn from_rtc(description: &RTCSessionDescription, sdp_type: SdpType) -> SessionDescription {
        SessionDescription {
            sdp_type,
            sdp: description.sdp.clone(),
        }
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;
        Ok(Self::from_rtc(&offer, SdpType::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create answer: {}", e)))?;
        Ok(Self::from_rtc(&answer, SdpType::Answer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let sdp = self.to_rtc(description)?;
        self.pc
            .set_local_description(sdp)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let sdp = self.to_rtc(description)?;
        self.pc.set_remote_description(sdp).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to set remote description: {}", e))
        })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::candidate(&self.peer_id, e.to_string()))
    }

    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        let kind = track.kind();
        let sender = self
            .pc
            .add_track(track.rtp_track())
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to add {} track: {}", kind, e)))?;

        // Drain RTCP so interceptors keep running
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });

        self.senders.lock().insert(kind, sender);
        info!("{} track {} added to {}", kind, track.id(), self.peer_id);
        Ok(())
    }

    async fn replace_track(&self, kind: MediaKind, track: Option<Arc<MediaTrack>>) -> Result<()> {
        let sender = self
            .senders
            .lock()
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No {} sender for {}", kind, self.peer_id)))?;

        sender
            .replace_track(track.map(|t| t.rtp_track()))
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to replace {} track: {}", kind, e)))
    }

    async fn close(&self) -> Result<()> {
        self.senders.lock().clear();
        self.pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}
