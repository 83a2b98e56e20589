//! Streamer and viewer sessions
//!
//! A session owns its signaling channel, its pairings and (for the
//! streamer) the local stream. Everything it does runs on one event loop,
//! [`run_session`], which handles a single envelope, transport event or
//! user command at a time with exclusive access to session state.

pub mod streamer;
pub mod viewer;

pub use streamer::{StreamerCommand, StreamerSession};
pub use viewer::{ViewerCommand, ViewerSession, STREAMER_PEER_ID};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::SessionRole;
use crate::negotiation::{PeerEvent, PeerEventReceiver};
use crate::signaling::{ChannelEvent, Envelope, SignalingChannel};

/// Whether the event loop keeps going after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// End the session with the given reason
    Stop(&'static str),
}

/// One role's reaction to envelopes, transport events and commands
#[async_trait]
pub trait SessionHandler: Send {
    type Command: Send + 'static;

    fn role(&self) -> SessionRole;

    async fn handle_envelope(&mut self, envelope: Envelope) -> Result<Flow>;

    /// Transport callbacks; stale ones are dropped here
    async fn handle_peer_event(&mut self, event: PeerEvent) -> Flow;

    async fn handle_command(&mut self, command: Self::Command) -> Result<Flow>;

    /// Close every pairing and release local media
    async fn shutdown(&mut self, reason: &str);
}

/// Drive a session until it stops or its signaling channel goes away
///
/// Errors from a single step are logged and the loop continues unless the
/// error is session-fatal.
pub async fn run_session<H: SessionHandler>(
    handler: &mut H,
    mut channel: SignalingChannel,
    mut peer_events: PeerEventReceiver,
    mut commands: mpsc::UnboundedReceiver<H::Command>,
) -> Result<()> {
    let role = handler.role();
    info!("{} session running", role);

    let reason = loop {
        tokio::select! {
            event = channel.recv() => {
                match event {
                    Some(ChannelEvent::Message(envelope)) => {
                        let kind = envelope.kind();
                        match handler.handle_envelope(envelope).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Stop(reason)) => break reason,
                            Err(e) if e.is_session_fatal() => {
                                error!("Fatal error handling {}: {}", kind, e);
                                break "channel_error";
                            }
                            Err(e) => warn!("Failed to handle {}: {}", kind, e),
                        }
                    }
                    Some(ChannelEvent::Error(e)) => {
                        warn!("Signaling channel error: {}", e);
                        break "channel_error";
                    }
                    Some(ChannelEvent::Closed) | None => break "channel_closed",
                }
            }

            Some(event) = peer_events.recv() => {
                if let Flow::Stop(reason) = handler.handle_peer_event(event).await {
                    break reason;
                }
            }

            Some(command) = commands.recv() => {
                match handler.handle_command(command).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop(reason)) => break reason,
                    Err(e) if e.is_session_fatal() => {
                        error!("Fatal error handling command: {}", e);
                        break "channel_error";
                    }
                    Err(e) => warn!("Command failed: {}", e),
                }
            }
        }
    };

    debug!("{} session ending: {}", role, reason);
    channel.close();
    handler.shutdown(reason).await;
    info!("{} session closed ({})", role, reason);
    Ok(())
}
