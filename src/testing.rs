//! In-memory doubles for peer transports

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::media::{DeviceCatalog, DeviceInfo, MediaKind, MediaTrack};
use crate::negotiation::{
    IceCandidate, PeerEventSender, PeerTransport, SessionDescription, TransportFactory,
};

/// Everything a mock transport has been asked to do
#[derive(Debug, Default)]
pub struct MockState {
    pub offers_created: usize,
    pub answers_created: usize,
    pub local_descriptions: Vec<SessionDescription>,
    pub remote_descriptions: Vec<SessionDescription>,
    pub applied_candidates: Vec<IceCandidate>,
    pub rejected_candidates: HashSet<String>,
    pub added_tracks: Vec<(MediaKind, String)>,
    pub replaced_tracks: Vec<(MediaKind, Option<String>)>,
    /// Sender slots by kind, holding the current track id
    pub senders: HashMap<MediaKind, Option<String>>,
    pub fail_remote_description: bool,
    pub closed: bool,
}

impl MockState {
    pub fn applied_candidate_strings(&self) -> Vec<String> {
        self.applied_candidates
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }
}

/// Peer transport that records calls; clones share state
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    pub fn reject_candidate(&self, candidate: &str) {
        self.state.lock().rejected_candidates.insert(candidate.to_string());
    }

    pub fn boxed(&self) -> Box<dyn PeerTransport> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let mut state = self.state.lock();
        state.offers_created += 1;
        Ok(SessionDescription::offer(format!(
            "mock-offer-{}",
            state.offers_created
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut state = self.state.lock();
        state.answers_created += 1;
        Ok(SessionDescription::answer(format!(
            "mock-answer-{}",
            state.answers_created
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.state.lock().local_descriptions.push(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_remote_description {
            return Err(AppError::WebRtcError("malformed description".to_string()));
        }
        state.remote_descriptions.push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.state.lock();
        if state.rejected_candidates.contains(&candidate.candidate) {
            return Err(AppError::candidate("mock", "candidate rejected"));
        }
        state.applied_candidates.push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        let mut state = self.state.lock();
        state
            .added_tracks
            .push((track.kind(), track.id().to_string()));
        state
            .senders
            .insert(track.kind(), Some(track.id().to_string()));
        Ok(())
    }

    async fn replace_track(&self, kind: MediaKind, track: Option<Arc<MediaTrack>>) -> Result<()> {
        let mut state = self.state.lock();
        let id = track.map(|t| t.id().to_string());
        match state.senders.get_mut(&kind) {
            Some(slot) => *slot = id.clone(),
            None => return Err(AppError::NotFound(format!("No {} sender", kind))),
        }
        state.replaced_tracks.push((kind, id));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Factory handing out mock transports and keeping their event senders
#[derive(Default)]
pub struct MockTransportFactory {
    transports: Mutex<HashMap<String, MockTransport>>,
    events: Mutex<HashMap<String, (u64, PeerEventSender)>>,
    failing: Mutex<HashSet<String>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport created for `peer_id` (latest generation)
    pub fn transport(&self, peer_id: &str) -> MockTransport {
        self.transports
            .lock()
            .get(peer_id)
            .cloned()
            .unwrap_or_else(|| panic!("no transport created for {}", peer_id))
    }

    /// Generation and event sender handed to the transport for `peer_id`
    pub fn events(&self, peer_id: &str) -> (u64, PeerEventSender) {
        self.events
            .lock()
            .get(peer_id)
            .cloned()
            .unwrap_or_else(|| panic!("no transport created for {}", peer_id))
    }

    pub fn fail_for(&self, peer_id: &str) {
        self.failing.lock().insert(peer_id.to_string());
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        generation: u64,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerTransport>> {
        if self.failing.lock().contains(peer_id) {
            return Err(AppError::WebRtcError("transport unavailable".to_string()));
        }
        let transport = MockTransport::new();
        self.transports
            .lock()
            .insert(peer_id.to_string(), transport.clone());
        self.events
            .lock()
            .insert(peer_id.to_string(), (generation, events));
        Ok(transport.boxed())
    }
}

/// Two cameras and one microphone
pub fn test_catalog() -> DeviceCatalog {
    DeviceCatalog::new(vec![
        DeviceInfo::new("cam0", MediaKind::Video, "Front Camera"),
        DeviceInfo::new("cam1", MediaKind::Video, "USB Camera"),
        DeviceInfo::new("mic0", MediaKind::Audio, "Built-in Microphone"),
        DeviceInfo::new("mic1", MediaKind::Audio, "Headset"),
    ])
}
