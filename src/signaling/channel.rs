//! Duplex signaling channel over a WebSocket
//!
//! The channel only moves envelopes. Sends are fire-and-forget; inbound
//! envelopes, closure and errors are surfaced through [`ChannelEvent`] and
//! the owning session decides what to do with them.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::envelope::Envelope;
use crate::error::{AppError, Result};

/// What the channel reports to its session
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(Envelope),
    /// Remote end closed the connection
    Closed,
    Error(String),
}

/// Cloneable handle for sending envelopes
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl SignalSender {
    /// Queue an envelope; dropped with a debug log once the channel is gone
    pub fn send(&self, envelope: Envelope) {
        let kind = envelope.kind();
        if self.tx.send(envelope).is_err() {
            debug!("Signaling channel closed, dropping {}", kind);
        }
    }
}

/// One signaling connection, owned by one session
pub struct SignalingChannel {
    sender: SignalSender,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    task: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    /// Connect to `url` and start the pump task
    ///
    /// A keepalive envelope is sent every `keepalive` while the socket is open.
    pub async fn connect(url: &str, keepalive: Duration) -> Result<Self> {
        info!("Connecting to signaling server {}", url);
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| AppError::Channel(format!("Failed to connect to {}: {}", url, e)))?;
        info!("Signaling channel open");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(pump(ws, out_rx, event_tx, keepalive));

        Ok(Self {
            sender: SignalSender { tx: out_tx },
            events: event_rx,
            task: Some(task),
        })
    }

    /// In-process channel with no socket behind it
    ///
    /// The returned [`MemoryRelay`] plays the relay: it sees everything the
    /// session sends and can inject inbound events.
    pub fn memory() -> (Self, MemoryRelay) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let channel = Self {
            sender: SignalSender { tx: out_tx },
            events: event_rx,
            task: None,
        };
        let relay = MemoryRelay {
            outbound: out_rx,
            inbound: event_tx,
        };
        (channel, relay)
    }

    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    /// Next inbound event; `None` once the pump has stopped
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Stop the pump; further sends are dropped
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Signaling channel closed");
        }
        self.events.close();
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Relay end of an in-process channel
pub struct MemoryRelay {
    outbound: mpsc::UnboundedReceiver<Envelope>,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
}

impl MemoryRelay {
    /// Deliver an envelope to the session
    pub fn deliver(&self, envelope: Envelope) {
        let _ = self.inbound.send(ChannelEvent::Message(envelope));
    }

    /// Report closure or error to the session
    pub fn report(&self, event: ChannelEvent) {
        let _ = self.inbound.send(event);
    }

    /// Next envelope the session sent, if one is queued
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.outbound.try_recv().ok()
    }

    /// Everything the session has sent so far
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut sent = Vec::new();
        while let Ok(envelope) = self.outbound.try_recv() {
            sent.push(envelope);
        }
        sent
    }
}

async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    keepalive: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    let mut keepalive_interval = tokio::time::interval(keepalive);
    // First tick completes immediately
    keepalive_interval.tick().await;

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(Envelope::Keepalive) => trace!("Keepalive received"),
                        Ok(envelope) => {
                            trace!("Received {}", envelope.kind());
                            if events.send(ChannelEvent::Message(envelope)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed signaling message: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Signaling channel closed by server");
                        let _ = events.send(ChannelEvent::Closed);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Signaling receive error: {}", e);
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                    _ => {}
                }
            }

            envelope = outbound.recv() => {
                let Some(envelope) = envelope else {
                    // Session dropped its senders
                    let _ = sink.close().await;
                    break;
                };
                let json = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize {}: {}", envelope.kind(), e);
                        continue;
                    }
                };
                trace!("Sending {}", envelope.kind());
                if let Err(e) = sink.send(Message::Text(json)).await {
                    warn!("Failed to send {}, closing channel: {}", envelope.kind(), e);
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
            }

            _ = keepalive_interval.tick() => {
                let json = r#"{"type":"keepalive"}"#.to_string();
                if let Err(e) = sink.send(Message::Text(json)).await {
                    warn!("Failed to send keepalive, closing channel: {}", e);
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }

    debug!("Signaling pump exiting");
}
