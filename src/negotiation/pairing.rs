//! Negotiation pairing: one offer/answer state machine per remote peer

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::candidates::CandidateBuffer;
use super::transport::PeerTransport;
use super::types::{ConnectionState, DescriptionState, IceCandidate, SessionDescription};
use crate::error::{AppError, Result};
use crate::media::{MediaKind, MediaTrack};

/// Outbound sender slot of one kind
///
/// A kind with no entry in the pairing's bindings has no sender at all.
#[derive(Debug, Clone)]
pub enum SenderSlot {
    /// Sender carrying a live track
    Live(Arc<MediaTrack>),
    /// Sender exists but carries no track (camera closed after being opened)
    Empty,
}

/// How a track was bound to a pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Replaced the live track of an existing sender
    Swapped,
    /// Filled a sender that held no track
    Refilled,
    /// Created a sender that did not exist
    Added,
}

impl BindOutcome {
    /// Swaps are transparent to the remote peer; anything else needs a fresh offer
    pub fn needs_renegotiation(&self) -> bool {
        !matches!(self, BindOutcome::Swapped)
    }
}

/// Result of an offer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Offer created and applied locally; the caller transmits it
    Ready(SessionDescription),
    /// An offer is already outstanding; a new one follows once it is answered
    Queued,
}

/// One negotiated media session with a remote peer
pub struct Pairing {
    peer_id: String,
    generation: u64,
    transport: Box<dyn PeerTransport>,
    description: DescriptionState,
    connection: ConnectionState,
    remote_applied: bool,
    candidates: Option<CandidateBuffer>,
    bindings: HashMap<MediaKind, SenderSlot>,
    renegotiation_queued: bool,
    closed: bool,
    created_at: DateTime<Utc>,
}

impl Pairing {
    pub fn new(peer_id: impl Into<String>, generation: u64, transport: Box<dyn PeerTransport>) -> Self {
        Self {
            peer_id: peer_id.into(),
            generation,
            transport,
            description: DescriptionState::None,
            connection: ConnectionState::New,
            remote_applied: false,
            candidates: None,
            bindings: HashMap::new(),
            renegotiation_queued: false,
            closed: false,
            created_at: Utc::now(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn description_state(&self) -> DescriptionState {
        self.description
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_applied
    }

    /// Number of candidates waiting for the remote description
    pub fn buffered_candidates(&self) -> usize {
        self.candidates.as_ref().map_or(0, CandidateBuffer::len)
    }

    pub fn slot(&self, kind: MediaKind) -> Option<&SenderSlot> {
        self.bindings.get(&kind)
    }

    pub fn is_renegotiation_queued(&self) -> bool {
        self.renegotiation_queued
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn transition(&mut self, next: DescriptionState) {
        trace!("Pairing {}: {} -> {}", self.peer_id, self.description, next);
        self.description = next;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(AppError::negotiation(&self.peer_id, "Pairing is closed"));
        }
        Ok(())
    }

    fn fail(&self, step: &str, err: AppError) -> AppError {
        AppError::negotiation(&self.peer_id, format!("{}: {}", step, err))
    }

    /// Create an offer and apply it locally
    ///
    /// Only acts from `none` or `stable`. While an offer is outstanding the
    /// request is queued and replayed when the answer arrives.
    pub async fn create_offer(&mut self) -> Result<OfferOutcome> {
        self.ensure_open()?;

        match self.description {
            DescriptionState::None | DescriptionState::Stable => {}
            DescriptionState::OfferSent => {
                if !self.renegotiation_queued {
                    debug!("Offer outstanding for {}, queueing renegotiation", self.peer_id);
                }
                self.renegotiation_queued = true;
                return Ok(OfferOutcome::Queued);
            }
            other => {
                return Err(AppError::negotiation(
                    &self.peer_id,
                    format!("Cannot create offer in state {}", other),
                ));
            }
        }

        let offer = self
            .transport
            .create_offer()
            .await
            .map_err(|e| self.fail("Failed to create offer", e))?;
        self.transport
            .set_local_description(offer.clone())
            .await
            .map_err(|e| self.fail("Failed to set local description", e))?;

        self.transition(DescriptionState::OfferSent);
        debug!("Offer created for {}", self.peer_id);
        Ok(OfferOutcome::Ready(offer))
    }

    /// Apply a remote offer and produce the answer to transmit
    ///
    /// Returns `None` when the offer loses glare against our own outstanding
    /// offer; the local offer stands and the remote one is dropped.
    pub async fn accept_offer(&mut self, offer: SessionDescription) -> Result<Option<SessionDescription>> {
        self.ensure_open()?;

        if !offer.is_offer() {
            return Err(AppError::negotiation(&self.peer_id, "Expected an offer"));
        }

        if self.description == DescriptionState::OfferSent {
            warn!(
                "Ignoring offer from {}: local offer outstanding (glare)",
                self.peer_id
            );
            return Ok(None);
        }

        self.transport
            .set_remote_description(offer)
            .await
            .map_err(|e| self.fail("Failed to set remote description", e))?;
        self.transition(DescriptionState::OfferReceived);
        self.on_remote_description_applied().await;

        let answer = self
            .transport
            .create_answer()
            .await
            .map_err(|e| self.fail("Failed to create answer", e))?;
        self.transport
            .set_local_description(answer.clone())
            .await
            .map_err(|e| self.fail("Failed to set local description", e))?;

        self.transition(DescriptionState::AnswerSent);
        self.transition(DescriptionState::Stable);
        Ok(Some(answer))
    }

    /// Apply the answer to our outstanding offer
    ///
    /// Returns the follow-up offer when a renegotiation was queued meanwhile.
    pub async fn apply_answer(&mut self, answer: SessionDescription) -> Result<Option<SessionDescription>> {
        self.ensure_open()?;

        if !answer.is_answer() {
            return Err(AppError::negotiation(&self.peer_id, "Expected an answer"));
        }
        if self.description != DescriptionState::OfferSent {
            return Err(AppError::negotiation(
                &self.peer_id,
                format!("Unexpected answer in state {}", self.description),
            ));
        }

        self.transport
            .set_remote_description(answer)
            .await
            .map_err(|e| self.fail("Failed to set remote description", e))?;
        self.transition(DescriptionState::AnswerReceived);
        self.on_remote_description_applied().await;
        self.transition(DescriptionState::Stable);
        info!("Answer applied for {}", self.peer_id);

        if !self.renegotiation_queued {
            return Ok(None);
        }

        self.renegotiation_queued = false;
        match self.create_offer().await? {
            OfferOutcome::Ready(offer) => Ok(Some(offer)),
            OfferOutcome::Queued => Ok(None),
        }
    }

    /// Release buffered candidates the first time a remote description lands
    async fn on_remote_description_applied(&mut self) {
        if self.remote_applied {
            return;
        }
        self.remote_applied = true;

        if let Some(buffer) = self.candidates.take() {
            let report = buffer.flush(&self.peer_id, self.transport.as_ref()).await;
            info!(
                "Flushed ICE candidates for {}: {} applied, {} failed",
                self.peer_id, report.applied, report.failed
            );
        }
    }

    /// Buffer or apply a remote candidate. Never fails the caller.
    pub async fn add_ice_candidate(&mut self, candidate: Option<IceCandidate>) {
        let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
            trace!("Ignoring empty ICE candidate for {}", self.peer_id);
            return;
        };

        if self.closed {
            debug!("Dropping ICE candidate for closed pairing {}", self.peer_id);
            return;
        }

        if !self.remote_applied {
            debug!("Buffering ICE candidate for {}", self.peer_id);
            self.candidates
                .get_or_insert_with(CandidateBuffer::new)
                .push(candidate);
            return;
        }

        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            warn!("Error adding ICE candidate for {}: {}", self.peer_id, e);
        }
    }

    /// Attach `track` to the sender slot of its kind
    pub async fn bind_track(&mut self, track: Arc<MediaTrack>) -> Result<BindOutcome> {
        self.ensure_open()?;
        let kind = track.kind();

        let outcome = match self.bindings.get(&kind) {
            Some(SenderSlot::Live(_)) => BindOutcome::Swapped,
            Some(SenderSlot::Empty) => BindOutcome::Refilled,
            None => BindOutcome::Added,
        };

        let result = match outcome {
            BindOutcome::Added => self.transport.add_track(track.clone()).await,
            _ => self.transport.replace_track(kind, Some(track.clone())).await,
        };
        result.map_err(|e| self.fail(&format!("Failed to bind {} track", kind), e))?;

        debug!("Bound {} track {} to {} ({:?})", kind, track.id(), self.peer_id, outcome);
        self.bindings.insert(kind, SenderSlot::Live(track));
        Ok(outcome)
    }

    /// Detach the track of a live sender, leaving the sender in place
    ///
    /// Returns false when there was no live track of that kind.
    pub async fn clear_track(&mut self, kind: MediaKind) -> Result<bool> {
        self.ensure_open()?;

        if !matches!(self.bindings.get(&kind), Some(SenderSlot::Live(_))) {
            return Ok(false);
        }

        self.transport
            .replace_track(kind, None)
            .await
            .map_err(|e| self.fail(&format!("Failed to clear {} track", kind), e))?;
        self.bindings.insert(kind, SenderSlot::Empty);
        debug!("Cleared {} sender for {}", kind, self.peer_id);
        Ok(true)
    }

    /// Record a connectivity change; returns whether the state changed
    pub fn set_connection_state(&mut self, state: ConnectionState) -> bool {
        if self.connection == state {
            return false;
        }
        self.connection = state;
        true
    }

    /// Tear down. Buffered candidates are discarded; idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.renegotiation_queued = false;

        if let Some(buffer) = self.candidates.take() {
            debug!(
                "Discarding {} buffered ICE candidates for {}",
                buffer.len(),
                self.peer_id
            );
        }

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close peer connection {}: {}", self.peer_id, e);
        }
        self.connection = ConnectionState::Closed;
        info!(
            "Pairing {} closed after {}s",
            self.peer_id,
            (Utc::now() - self.created_at).num_seconds()
        );
    }
}
