//! Seam between the negotiation state machine and a peer connection

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{ConnectionState, IceCandidate, SessionDescription};
use crate::error::Result;
use crate::media::{MediaKind, MediaTrack};

/// Operations the state machine needs from one peer connection
///
/// Every method is a suspension point. Implementations report failures as
/// errors; the caller decides their scope.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Create a new outbound sender slot carrying `track`
    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<()>;

    /// Swap the track of an existing sender slot; `None` leaves the slot empty
    async fn replace_track(&self, kind: MediaKind, track: Option<Arc<MediaTrack>>) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Event raised by a transport outside of any call
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEventKind {
    /// A local network-path candidate to forward to the remote peer
    LocalCandidate(IceCandidate),
    /// Connectivity changed
    ConnectionState(ConnectionState),
    /// The remote peer started sending a track
    RemoteTrack { kind: MediaKind, track_id: String },
}

/// Transport event tagged with the pairing it belongs to
///
/// `generation` lets the session drop events from pairings that have
/// since been torn down or replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEvent {
    pub peer_id: String,
    pub generation: u64,
    pub kind: PeerEventKind,
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Builds one transport per pairing
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: &str,
        generation: u64,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerTransport>>;
}
