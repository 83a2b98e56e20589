//! Early network-path candidate buffering
//!
//! Candidates can race the remote description: the remote peer starts
//! trickling them as soon as its local description is set, and the
//! signaling relay may deliver them before the offer/answer they belong to
//! is applied here. They are queued until the remote description lands and
//! then applied in arrival order.

use std::collections::VecDeque;
use tracing::{debug, warn};

use super::transport::PeerTransport;
use super::types::IceCandidate;

/// Outcome of a buffer flush
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub failed: usize,
}

/// FIFO of candidates that arrived before the remote description
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.queue.push_back(candidate);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Apply every buffered candidate in arrival order, consuming the buffer
    ///
    /// Best effort: a rejected candidate is logged and skipped, the rest
    /// are still applied.
    pub async fn flush(self, peer_id: &str, transport: &dyn PeerTransport) -> FlushReport {
        let mut report = FlushReport::default();
        if self.is_empty() {
            return report;
        }
        debug!(
            "Processing {} buffered ICE candidates for {}",
            self.queue.len(),
            peer_id
        );

        for candidate in self.queue {
            match transport.add_ice_candidate(candidate).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("Error adding buffered ICE candidate for {}: {}", peer_id, e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
