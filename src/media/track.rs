//! Local capture tracks

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Stream ID shared by every track a streamer publishes
pub const LOCAL_STREAM_ID: &str = "livecast-stream";

/// Media kind of a track or sender slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// RTP codec capability advertised for tracks of this kind
    pub fn codec_capability(&self) -> RTCRtpCodecCapability {
        match self {
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: "video/H264".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line:
                    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                        .to_string(),
                rtcp_feedback: vec![],
            },
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                rtcp_feedback: vec![],
            },
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// A live capture track owned by the local stream
///
/// `enabled` is the mute switch (the track keeps flowing, silenced);
/// `stopped` is terminal and releases the device.
pub struct MediaTrack {
    id: String,
    kind: MediaKind,
    device_id: String,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtp: Arc<TrackLocalStaticSample>,
}

impl MediaTrack {
    /// Create a new track bound to a capture device
    pub fn new(kind: MediaKind, device_id: impl Into<String>, label: impl Into<String>) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", kind, &uuid[..8]);
        let rtp = Arc::new(TrackLocalStaticSample::new(
            kind.codec_capability(),
            id.clone(),
            LOCAL_STREAM_ID.to_string(),
        ));

        Self {
            id,
            kind,
            device_id: device_id.into(),
            label: label.into(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable the track in place (mute switch)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stop the track and release its device. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Track {} ({}) stopped", self.id, self.device_id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Underlying RTP track handed to peer connection senders
    pub fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.rtp.clone()
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
