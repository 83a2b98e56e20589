//! Offer/answer negotiation
//!
//! A [`Pairing`] is the per-peer state machine. It talks to the peer
//! connection only through [`PeerTransport`], so the same logic runs
//! against webrtc-rs ([`RtcTransport`]) and in-memory doubles.

pub mod candidates;
pub mod pairing;
pub mod rtc;
pub mod transport;
pub mod types;

pub use candidates::{CandidateBuffer, FlushReport};
pub use pairing::{BindOutcome, OfferOutcome, Pairing, SenderSlot};
pub use rtc::{RtcTransport, RtcTransportFactory};
pub use transport::{
    PeerEvent, PeerEventKind, PeerEventReceiver, PeerEventSender, PeerTransport, TransportFactory,
};
pub use types::{ConnectionState, DescriptionState, IceCandidate, SdpType, SessionDescription};
