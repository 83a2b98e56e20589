//! livecast - one-to-many live broadcast endpoints
//!
//! Streamer and viewer sessions that negotiate peer-to-peer media over a
//! WebSocket signaling relay. The streamer keeps one pairing per viewer
//! and renegotiates when its camera or microphone changes.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod negotiation;
pub mod session;
pub mod signaling;

#[cfg(test)]
mod testing;

pub use error::{AppError, Result};
