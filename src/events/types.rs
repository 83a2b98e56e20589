//! Session event types
//!
//! Status text and lifecycle notifications published by streamer and
//! viewer sessions. Serialized as `{"event": "...", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::media::{MediaKind, TrackAction};
use crate::negotiation::ConnectionState;

/// Which end of the broadcast a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Streamer,
    Viewer,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRole::Streamer => write!(f, "streamer"),
            SessionRole::Viewer => write!(f, "viewer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// Human-readable status line
    #[serde(rename = "session.status")]
    Status { role: SessionRole, message: String },

    /// Room assigned by the relay
    #[serde(rename = "session.room_created")]
    RoomCreated { room_id: String, share_link: String },

    #[serde(rename = "session.closed")]
    SessionClosed {
        role: SessionRole,
        /// Why the session ended: "stopped", "channel_closed", "streamer_left"
        reason: String,
    },

    #[serde(rename = "viewer.joined")]
    ViewerJoined { viewer_id: String },

    #[serde(rename = "viewer.left")]
    ViewerLeft { viewer_id: String },

    #[serde(rename = "viewer.count_changed")]
    ViewerCountChanged { count: usize },

    /// Connectivity of one pairing changed
    #[serde(rename = "pairing.state_changed")]
    PairingStateChanged {
        peer_id: String,
        state: ConnectionState,
    },

    /// Remote peer started sending a track
    #[serde(rename = "media.remote_track")]
    RemoteTrack {
        peer_id: String,
        kind: MediaKind,
        track_id: String,
    },

    /// Local track closed, opened, swapped or muted
    #[serde(rename = "media.track_changed")]
    TrackChanged {
        kind: MediaKind,
        action: TrackAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
    },
}

impl SessionEvent {
    /// Get the event name (for filtering)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "session.status",
            Self::RoomCreated { .. } => "session.room_created",
            Self::SessionClosed { .. } => "session.closed",
            Self::ViewerJoined { .. } => "viewer.joined",
            Self::ViewerLeft { .. } => "viewer.left",
            Self::ViewerCountChanged { .. } => "viewer.count_changed",
            Self::PairingStateChanged { .. } => "pairing.state_changed",
            Self::RemoteTrack { .. } => "media.remote_track",
            Self::TrackChanged { .. } => "media.track_changed",
        }
    }

    /// Check if event matches a topic pattern
    ///
    /// Supports `*` and prefix wildcards like `viewer.*`.
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        if topic.ends_with(".*") {
            let prefix = topic.trim_end_matches(".*");
            event_name.starts_with(prefix)
        } else {
            event_name == topic
        }
    }

    pub fn status(role: SessionRole, message: impl Into<String>) -> Self {
        Self::Status {
            role,
            message: message.into(),
        }
    }
}
