//! Local capture media
//!
//! Tracks, the local stream that owns them, device access, and the
//! controller that applies camera/microphone changes to live pairings.

pub mod controller;
pub mod devices;
pub mod stream;
pub mod track;

pub use controller::{TrackAction, TrackChange, TrackController};
pub use devices::{DeviceCatalog, DeviceInfo, MediaDevices};
pub use stream::LocalStream;
pub use track::{MediaKind, MediaTrack, LOCAL_STREAM_ID};
