use serde::{Deserialize, Serialize};

use crate::media::{DeviceInfo, MediaKind};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Signaling server settings
    pub signaling: SignalingConfig,
    /// Peer connection settings
    pub webrtc: WebRtcConfig,
    /// Capture settings
    pub media: MediaConfig,
}

/// Signaling server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Base URL of the relay (ws:// or wss://)
    pub server_url: String,
    /// Path streamers connect to
    pub streamer_path: String,
    /// Path viewers connect to; the room id goes in the query string
    pub viewer_path: String,
    /// Keepalive interval in seconds
    pub keepalive_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080".to_string(),
            streamer_path: "/ws/streamer".to_string(),
            viewer_path: "/ws/viewer".to_string(),
            keepalive_secs: 30,
        }
    }
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
            ],
            turn_servers: vec![],
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs; several allow UDP/TCP fallback
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

impl TurnServer {
    pub fn new(url: String, username: String, credential: String) -> Self {
        Self {
            urls: vec![url],
            username,
            credential,
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Camera to open at start; `None` picks the default
    pub video_device: Option<String>,
    /// Microphone to open at start; `None` picks the default
    pub audio_device: Option<String>,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Declared capture devices; the first of each kind is the default
    pub devices: Vec<DeviceInfo>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_device: None,
            audio_device: None,
            width: 1280,
            height: 720,
            devices: vec![
                DeviceInfo::new("default-camera", MediaKind::Video, "Default Camera"),
                DeviceInfo::new("default-microphone", MediaKind::Audio, "Default Microphone"),
            ],
        }
    }
}
