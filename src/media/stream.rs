//! Local media stream owned by a streamer session

use std::sync::Arc;

use super::track::{MediaKind, MediaTrack};

/// The session's local stream: at most one track per kind
#[derive(Debug, Default)]
pub struct LocalStream {
    tracks: Vec<Arc<MediaTrack>>,
}

impl LocalStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track of the given kind, if any
    pub fn track(&self, kind: MediaKind) -> Option<&Arc<MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Insert a track, returning the track of the same kind it displaced
    ///
    /// The displaced track is not stopped; the caller decides when.
    pub fn insert(&mut self, track: Arc<MediaTrack>) -> Option<Arc<MediaTrack>> {
        let previous = self.remove(track.kind());
        self.tracks.push(track);
        previous
    }

    /// Detach the track of the given kind without stopping it
    pub fn remove(&mut self, kind: MediaKind) -> Option<Arc<MediaTrack>> {
        let index = self.tracks.iter().position(|t| t.kind() == kind)?;
        Some(self.tracks.remove(index))
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Stop and drop every track
    pub fn stop_all(&mut self) {
        for track in self.tracks.drain(..) {
            track.stop();
        }
    }
}
