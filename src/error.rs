use thiserror::Error;

use crate::media::MediaKind;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Capture device could not be opened; prior media stays intact
    #[error("Acquisition error [{kind}]: {reason}")]
    Acquisition { kind: MediaKind, reason: String },

    /// Missing pairing or unusable description; only that pairing is affected
    #[error("Negotiation error [{peer_id}]: {reason}")]
    Negotiation { peer_id: String, reason: String },

    /// Candidate rejected by the transport; logged and skipped
    #[error("Candidate error [{peer_id}]: {reason}")]
    Candidate { peer_id: String, reason: String },

    /// Signaling channel closed or errored; tears the whole session down
    #[error("Signaling channel error: {0}")]
    Channel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn acquisition(kind: MediaKind, reason: impl Into<String>) -> Self {
        Self::Acquisition {
            kind,
            reason: reason.into(),
        }
    }

    pub fn negotiation(peer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Negotiation {
            peer_id: peer_id.into(),
            reason: reason.into(),
        }
    }

    pub fn candidate(peer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Candidate {
            peer_id: peer_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error escalates to a full session teardown
    ///
    /// Device and per-pairing failures stay contained to their scope;
    /// only a broken signaling channel ends the session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AppError::Channel(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_channel_errors_are_fatal() {
        assert!(AppError::Channel("closed".into()).is_session_fatal());
        assert!(!AppError::negotiation("v1", "no pairing").is_session_fatal());
        assert!(!AppError::candidate("v1", "rejected").is_session_fatal());
        assert!(!AppError::acquisition(MediaKind::Video, "busy").is_session_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::negotiation("abc", "Pairing not found");
        assert_eq!(err.to_string(), "Negotiation error [abc]: Pairing not found");

        let err = AppError::acquisition(MediaKind::Audio, "permission denied");
        assert_eq!(err.to_string(), "Acquisition error [audio]: permission denied");
    }
}
