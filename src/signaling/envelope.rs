//! Signaling wire format
//!
//! One JSON object per message, discriminated by `type`. The underscore
//! spellings are accepted on input for older relays.

use serde::{Deserialize, Serialize};

use crate::negotiation::{IceCandidate, SessionDescription};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Relay assigned the streamer a room
    #[serde(alias = "room_created")]
    RoomCreated { room_id: String },

    /// A viewer joined the streamer's room
    #[serde(alias = "viewer_joined")]
    PeerJoined { viewer_id: String },

    /// `viewer_id` is set on the streamer side only
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
        sdp: SessionDescription,
    },

    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
        sdp: SessionDescription,
    },

    #[serde(alias = "ice_candidate")]
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
        #[serde(default)]
        candidate: Option<IceCandidate>,
    },

    #[serde(alias = "viewer_left")]
    PeerLeft { viewer_id: String },

    /// The streamer a viewer was watching went away
    #[serde(alias = "streamer_left")]
    StreamerLeft,

    #[serde(alias = "ping", alias = "pong")]
    Keepalive,

    Error { message: String },
}

impl Envelope {
    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::RoomCreated { .. } => "room-created",
            Envelope::PeerJoined { .. } => "peer-joined",
            Envelope::Offer { .. } => "offer",
            Envelope::Answer { .. } => "answer",
            Envelope::IceCandidate { .. } => "ice-candidate",
            Envelope::PeerLeft { .. } => "peer-left",
            Envelope::StreamerLeft => "streamer-left",
            Envelope::Keepalive => "keepalive",
            Envelope::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_shape() {
        let envelope = Envelope::Offer {
            viewer_id: Some("v1".to_string()),
            sdp: SessionDescription::offer("v=0"),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["viewer_id"], "v1");
        assert_eq!(json["sdp"]["type"], "offer");
        assert_eq!(json["sdp"]["sdp"], "v=0");
    }

    #[test]
    fn test_viewer_side_omits_viewer_id() {
        let envelope = Envelope::Answer {
            viewer_id: None,
            sdp: SessionDescription::answer("v=0"),
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("viewer_id"));
    }

    #[test]
    fn test_kebab_tags() {
        let json = serde_json::to_value(Envelope::PeerJoined {
            viewer_id: "v1".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "peer-joined");
        assert_eq!(
            serde_json::to_value(Envelope::Keepalive).unwrap()["type"],
            "keepalive"
        );
    }

    #[test]
    fn test_underscore_aliases() {
        let parsed: Envelope =
            serde_json::from_str(r#"{"type":"room_created","room_id":"abc123"}"#).unwrap();
        assert_eq!(
            parsed,
            Envelope::RoomCreated {
                room_id: "abc123".to_string()
            }
        );

        let parsed: Envelope =
            serde_json::from_str(r#"{"type":"viewer_left","viewer_id":"v9"}"#).unwrap();
        assert_eq!(parsed.kind(), "peer-left");

        let parsed: Envelope = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(parsed, Envelope::Keepalive);

        let parsed: Envelope = serde_json::from_str(r#"{"type":"streamer_left"}"#).unwrap();
        assert_eq!(parsed, Envelope::StreamerLeft);
    }

    #[test]
    fn test_candidate_may_be_null() {
        let parsed: Envelope =
            serde_json::from_str(r#"{"type":"ice-candidate","candidate":null}"#).unwrap();
        assert_eq!(
            parsed,
            Envelope::IceCandidate {
                viewer_id: None,
                candidate: None
            }
        );

        let parsed: Envelope = serde_json::from_str(
            r#"{"type":"ice_candidate","viewer_id":"v1","candidate":{"candidate":"candidate:1","sdpMid":"0","sdpMLineIndex":0}}"#,
        )
        .unwrap();
        match parsed {
            Envelope::IceCandidate {
                viewer_id,
                candidate: Some(candidate),
            } => {
                assert_eq!(viewer_id.as_deref(), Some("v1"));
                assert_eq!(candidate.candidate, "candidate:1");
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<Envelope>(r#"{"type":"bogus"}"#).is_err());
    }
}
