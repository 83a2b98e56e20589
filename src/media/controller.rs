//! Camera/microphone selection against the local stream and every pairing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::devices::{DeviceInfo, MediaDevices};
use super::stream::LocalStream;
use super::track::{MediaKind, MediaTrack};
use crate::error::{AppError, Result};
use crate::negotiation::Pairing;

/// What a controller action did to the local media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackAction {
    /// Track stopped and detached; senders left empty
    Closed,
    /// Track attached where none was live
    Opened,
    /// Live track replaced by one from another device
    Swapped,
    Muted,
    Unmuted,
}

impl std::fmt::Display for TrackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackAction::Closed => write!(f, "closed"),
            TrackAction::Opened => write!(f, "opened"),
            TrackAction::Swapped => write!(f, "swapped"),
            TrackAction::Muted => write!(f, "muted"),
            TrackAction::Unmuted => write!(f, "unmuted"),
        }
    }
}

/// Outcome of a controller action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackChange {
    pub kind: MediaKind,
    pub action: TrackAction,
    /// Device now feeding the slot, if any
    pub device_id: Option<String>,
    /// Pairings that need a fresh offer
    pub renegotiate: Vec<String>,
    /// Pairings whose sender could not be updated
    pub failed: Vec<String>,
}

impl TrackChange {
    fn new(kind: MediaKind, action: TrackAction, device_id: Option<String>) -> Self {
        Self {
            kind,
            action,
            device_id,
            renegotiate: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Applies device selections to the local stream and every pairing
///
/// The new track is always acquired before the old one is stopped, so a
/// failed acquisition leaves the previous media untouched.
pub struct TrackController {
    devices: Arc<dyn MediaDevices>,
}

impl TrackController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self { devices }
    }

    /// List capture devices
    pub async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.devices.enumerate().await
    }

    /// Acquire a track for the local stream before any pairing exists
    pub async fn open(
        &self,
        stream: &mut LocalStream,
        kind: MediaKind,
        device_id: Option<&str>,
    ) -> Result<Arc<MediaTrack>> {
        let track = self.devices.acquire(kind, device_id).await?;
        if let Some(old) = stream.insert(track.clone()) {
            old.stop();
        }
        Ok(track)
    }

    /// Stop the local video track and leave every video sender empty
    pub async fn close_video(
        &self,
        stream: &mut LocalStream,
        pairings: &mut HashMap<String, Pairing>,
    ) -> Result<TrackChange> {
        let track = stream
            .remove(MediaKind::Video)
            .ok_or_else(|| AppError::NotFound("No video track to close".to_string()))?;
        track.stop();

        let mut change = TrackChange::new(MediaKind::Video, TrackAction::Closed, None);
        for (peer_id, pairing) in pairings.iter_mut() {
            if let Err(e) = pairing.clear_track(MediaKind::Video).await {
                warn!("Failed to clear video sender for {}: {}", peer_id, e);
                change.failed.push(peer_id.clone());
            }
        }
        change.failed.sort();

        info!("Video closed ({} pairings)", pairings.len());
        Ok(change)
    }

    /// Switch the `kind` track to `device_id` (`None` for the default device)
    ///
    /// Swapping a live track never renegotiates. Filling an empty or absent
    /// sender does, and the affected pairings are listed in the result.
    pub async fn select_device(
        &self,
        stream: &mut LocalStream,
        pairings: &mut HashMap<String, Pairing>,
        kind: MediaKind,
        device_id: Option<&str>,
    ) -> Result<TrackChange> {
        let track = self.devices.acquire(kind, device_id).await?;

        let previous = stream.track(kind).cloned();
        if let Some(ref old) = previous {
            if old.device_id() == track.device_id() {
                debug!("{} device {} already selected", kind, old.device_id());
            }
            track.set_enabled(old.is_enabled());
        }

        let action = if previous.is_some() {
            TrackAction::Swapped
        } else {
            TrackAction::Opened
        };
        let mut change = TrackChange::new(kind, action, Some(track.device_id().to_string()));

        for (peer_id, pairing) in pairings.iter_mut() {
            match pairing.bind_track(track.clone()).await {
                Ok(outcome) if outcome.needs_renegotiation() => {
                    change.renegotiate.push(peer_id.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to bind {} track for {}: {}", kind, peer_id, e);
                    change.failed.push(peer_id.clone());
                }
            }
        }
        change.renegotiate.sort();
        change.failed.sort();

        stream.insert(track.clone());
        if let Some(old) = previous {
            old.stop();
        }

        info!(
            "{} {} with device {} ({} pairings to renegotiate)",
            kind,
            action,
            track.label(),
            change.renegotiate.len()
        );
        Ok(change)
    }

    /// Silence or restore the local audio track in place
    pub fn set_audio_muted(&self, stream: &LocalStream, muted: bool) -> Result<TrackChange> {
        let track = stream
            .track(MediaKind::Audio)
            .ok_or_else(|| AppError::NotFound("No audio track".to_string()))?;

        track.set_enabled(!muted);
        let action = if muted {
            TrackAction::Muted
        } else {
            TrackAction::Unmuted
        };
        info!("Audio {}", action);

        Ok(TrackChange::new(
            MediaKind::Audio,
            action,
            Some(track.device_id().to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::SenderSlot;
    use crate::testing::{test_catalog, MockTransport};

    struct Fixture {
        controller: TrackController,
        stream: LocalStream,
        pairings: HashMap<String, Pairing>,
        transports: HashMap<String, MockTransport>,
    }

    async fn fixture(viewers: &[&str]) -> Fixture {
        let controller = TrackController::new(Arc::new(test_catalog()));
        let mut stream = LocalStream::new();
        controller.open(&mut stream, MediaKind::Video, None).await.unwrap();
        controller.open(&mut stream, MediaKind::Audio, None).await.unwrap();

        let mut pairings = HashMap::new();
        let mut transports = HashMap::new();
        for (i, id) in viewers.iter().enumerate() {
            let transport = MockTransport::new();
            let mut pairing = Pairing::new(*id, i as u64 + 1, transport.boxed());
            for track in stream.tracks() {
                pairing.bind_track(track.clone()).await.unwrap();
            }
            pairings.insert(id.to_string(), pairing);
            transports.insert(id.to_string(), transport);
        }

        Fixture {
            controller,
            stream,
            pairings,
            transports,
        }
    }

    #[tokio::test]
    async fn test_close_video_empties_senders_without_renegotiation() {
        let mut f = fixture(&["v1", "v2"]).await;
        let old = f.stream.track(MediaKind::Video).cloned().unwrap();

        let change = f
            .controller
            .close_video(&mut f.stream, &mut f.pairings)
            .await
            .unwrap();

        assert_eq!(change.action, TrackAction::Closed);
        assert!(change.renegotiate.is_empty());
        assert!(old.is_stopped());
        assert!(f.stream.track(MediaKind::Video).is_none());
        for pairing in f.pairings.values() {
            assert!(matches!(pairing.slot(MediaKind::Video), Some(SenderSlot::Empty)));
            assert!(matches!(pairing.slot(MediaKind::Audio), Some(SenderSlot::Live(_))));
        }
        assert_eq!(
            f.transports["v1"].state().senders[&MediaKind::Video],
            None
        );
    }

    #[tokio::test]
    async fn test_close_without_video_is_not_found() {
        let mut f = fixture(&[]).await;
        f.controller
            .close_video(&mut f.stream, &mut f.pairings)
            .await
            .unwrap();
        let err = f
            .controller
            .close_video(&mut f.stream, &mut f.pairings)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reopen_after_close_renegotiates_each_pairing_once() {
        let mut f = fixture(&["v1", "v2"]).await;
        f.controller
            .close_video(&mut f.stream, &mut f.pairings)
            .await
            .unwrap();

        let change = f
            .controller
            .select_device(&mut f.stream, &mut f.pairings, MediaKind::Video, Some("cam1"))
            .await
            .unwrap();

        assert_eq!(change.action, TrackAction::Opened);
        assert_eq!(change.renegotiate, vec!["v1", "v2"]);
        assert_eq!(change.device_id.as_deref(), Some("cam1"));
        assert_eq!(f.stream.track(MediaKind::Video).unwrap().device_id(), "cam1");

        // Sender replaced in place, not added
        let state = f.transports["v1"].state();
        assert_eq!(state.added_tracks.len(), 2);
        assert!(state.senders[&MediaKind::Video].is_some());
    }

    #[tokio::test]
    async fn test_swap_replaces_in_place_and_stops_old_track() {
        let mut f = fixture(&["v1"]).await;
        let old = f.stream.track(MediaKind::Video).cloned().unwrap();

        let change = f
            .controller
            .select_device(&mut f.stream, &mut f.pairings, MediaKind::Video, Some("cam1"))
            .await
            .unwrap();

        assert_eq!(change.action, TrackAction::Swapped);
        assert!(change.renegotiate.is_empty());
        assert!(old.is_stopped());

        let new = f.stream.track(MediaKind::Video).cloned().unwrap();
        assert!(!new.is_stopped());
        assert_eq!(
            f.transports["v1"].state().senders[&MediaKind::Video].as_deref(),
            Some(new.id())
        );
        assert_eq!(f.transports["v1"].state().offers_created, 0);
    }

    #[tokio::test]
    async fn test_failed_acquisition_keeps_prior_track() {
        let mut f = fixture(&["v1"]).await;
        f.controller = TrackController::new(Arc::new(test_catalog().with_busy("cam1")));
        let old = f.stream.track(MediaKind::Video).cloned().unwrap();

        let err = f
            .controller
            .select_device(&mut f.stream, &mut f.pairings, MediaKind::Video, Some("cam1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Acquisition { .. }));
        assert!(!old.is_stopped());
        assert_eq!(f.stream.track(MediaKind::Video).unwrap().id(), old.id());
        assert!(f.transports["v1"].state().replaced_tracks.is_empty());
    }

    #[tokio::test]
    async fn test_audio_added_when_absent_renegotiates() {
        let controller = TrackController::new(Arc::new(test_catalog()));
        let mut stream = LocalStream::new();
        controller.open(&mut stream, MediaKind::Video, None).await.unwrap();

        let transport = MockTransport::new();
        let mut pairing = Pairing::new("v1", 1, transport.boxed());
        pairing
            .bind_track(stream.track(MediaKind::Video).cloned().unwrap())
            .await
            .unwrap();
        let mut pairings = HashMap::from([("v1".to_string(), pairing)]);

        let change = controller
            .select_device(&mut stream, &mut pairings, MediaKind::Audio, Some("mic1"))
            .await
            .unwrap();

        assert_eq!(change.action, TrackAction::Opened);
        assert_eq!(change.renegotiate, vec!["v1"]);
        assert_eq!(transport.state().added_tracks.len(), 2);
    }

    #[tokio::test]
    async fn test_mute_is_reversible_and_keeps_bindings() {
        let mut f = fixture(&["v1"]).await;
        let audio = f.stream.track(MediaKind::Audio).cloned().unwrap();

        let change = f.controller.set_audio_muted(&f.stream, true).unwrap();
        assert_eq!(change.action, TrackAction::Muted);
        assert!(!audio.is_enabled());
        assert!(!audio.is_stopped());

        f.controller.set_audio_muted(&f.stream, false).unwrap();
        assert!(audio.is_enabled());

        let pairing = &f.pairings["v1"];
        assert!(
            matches!(pairing.slot(MediaKind::Audio), Some(SenderSlot::Live(t)) if t.id() == audio.id())
        );
        assert!(f.transports["v1"].state().replaced_tracks.is_empty());
    }

    #[tokio::test]
    async fn test_swap_preserves_mute() {
        let mut f = fixture(&["v1"]).await;
        f.controller.set_audio_muted(&f.stream, true).unwrap();

        f.controller
            .select_device(&mut f.stream, &mut f.pairings, MediaKind::Audio, Some("mic1"))
            .await
            .unwrap();

        assert!(!f.stream.track(MediaKind::Audio).unwrap().is_enabled());
    }
}
