//! Signaling: envelope wire types and the channel that carries them

pub mod channel;
pub mod envelope;
pub mod url;

pub use channel::{ChannelEvent, MemoryRelay, SignalSender, SignalingChannel};
pub use envelope::Envelope;
pub use url::{share_link, streamer_url, viewer_url};
