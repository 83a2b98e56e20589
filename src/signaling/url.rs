//! Signaling and share-link URLs

use crate::config::SignalingConfig;

fn base(config: &SignalingConfig) -> &str {
    config.server_url.trim_end_matches('/')
}

/// Endpoint a streamer connects to
pub fn streamer_url(config: &SignalingConfig) -> String {
    format!("{}{}", base(config), config.streamer_path)
}

/// Endpoint a viewer connects to, carrying the room id as `room`
pub fn viewer_url(config: &SignalingConfig, room_id: &str) -> String {
    format!(
        "{}{}?room={}",
        base(config),
        config.viewer_path,
        urlencoding::encode(room_id)
    )
}

/// Page link handed to viewers: `{origin}/viewer?room={room_id}`
///
/// The origin is the relay's scheme and authority, with `ws`/`wss`
/// mapped to `http`/`https`.
pub fn share_link(server_url: &str, room_id: &str) -> String {
    let (scheme, rest) = match server_url.split_once("://") {
        Some(("wss", rest)) => ("https", rest),
        Some(("ws", rest)) => ("http", rest),
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", server_url),
    };
    let authority = rest.split('/').next().unwrap_or(rest);

    format!(
        "{}://{}/viewer?room={}",
        scheme,
        authority,
        urlencoding::encode(room_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let config = SignalingConfig {
            server_url: "ws://relay.local:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(streamer_url(&config), "ws://relay.local:8080/ws/streamer");
        assert_eq!(
            viewer_url(&config, "room 1"),
            "ws://relay.local:8080/ws/viewer?room=room%201"
        );
    }

    #[test]
    fn test_share_link() {
        assert_eq!(
            share_link("wss://live.example.com/ws/streamer", "abc123"),
            "https://live.example.com/viewer?room=abc123"
        );
        assert_eq!(
            share_link("ws://localhost:8080", "abc123"),
            "http://localhost:8080/viewer?room=abc123"
        );
    }
}
