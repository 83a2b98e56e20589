//! Capture device enumeration and acquisition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::track::{MediaKind, MediaTrack};
use crate::error::{AppError, Result};

/// Capture device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device identifier used for selection
    pub device_id: String,
    /// Device kind
    pub kind: MediaKind,
    /// Human-readable label
    pub label: String,
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<String>, kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            label: label.into(),
        }
    }
}

/// Access to capture hardware
///
/// `acquire` is a suspension point: it may wait on permission prompts or
/// slow device opens. A failure leaves nothing half-acquired.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// List available capture devices
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a device of the given kind; `None` selects the default device
    async fn acquire(&self, kind: MediaKind, device_id: Option<&str>) -> Result<Arc<MediaTrack>>;
}

/// Device catalogue backed by a declared device list
///
/// The first device of each kind is the default. Devices marked busy fail
/// acquisition the way an in-use camera does.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<DeviceInfo>,
    busy: HashSet<String>,
}

impl DeviceCatalog {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            busy: HashSet::new(),
        }
    }

    /// Mark a device as held by another application
    pub fn with_busy(mut self, device_id: impl Into<String>) -> Self {
        self.busy.insert(device_id.into());
        self
    }

    fn find(&self, kind: MediaKind, device_id: Option<&str>) -> Result<&DeviceInfo> {
        match device_id {
            Some(id) => self
                .devices
                .iter()
                .find(|d| d.kind == kind && d.device_id == id)
                .ok_or_else(|| AppError::acquisition(kind, format!("Device not found: {}", id))),
            None => self
                .devices
                .iter()
                .find(|d| d.kind == kind)
                .ok_or_else(|| AppError::acquisition(kind, format!("No {} device available", kind))),
        }
    }
}

#[async_trait]
impl MediaDevices for DeviceCatalog {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn acquire(&self, kind: MediaKind, device_id: Option<&str>) -> Result<Arc<MediaTrack>> {
        let device = self.find(kind, device_id)?;

        if self.busy.contains(&device.device_id) {
            return Err(AppError::acquisition(
                kind,
                format!(
                    "Device {} is being used by another application",
                    device.device_id
                ),
            ));
        }

        let track = Arc::new(MediaTrack::new(kind, &device.device_id, &device.label));
        info!("Acquired {} device {} as track {}", kind, device.label, track.id());
        debug!("Device id: {}", device.device_id);
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> DeviceCatalog {
        DeviceCatalog::new(vec![
            DeviceInfo::new("cam0", MediaKind::Video, "Front Camera"),
            DeviceInfo::new("cam1", MediaKind::Video, "USB Camera"),
            DeviceInfo::new("mic0", MediaKind::Audio, "Built-in Microphone"),
        ])
    }

    #[tokio::test]
    async fn test_default_device_is_first_of_kind() {
        let track = catalog().acquire(MediaKind::Video, None).await.unwrap();
        assert_eq!(track.device_id(), "cam0");
        assert_eq!(track.kind(), MediaKind::Video);
    }

    #[tokio::test]
    async fn test_acquire_specific_device() {
        let track = catalog().acquire(MediaKind::Video, Some("cam1")).await.unwrap();
        assert_eq!(track.label(), "USB Camera");
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_acquisition_error() {
        let err = catalog()
            .acquire(MediaKind::Audio, Some("cam0"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Acquisition { kind: MediaKind::Audio, .. }));
    }

    #[tokio::test]
    async fn test_busy_device_fails() {
        let catalog = catalog().with_busy("cam1");
        assert!(catalog.acquire(MediaKind::Video, Some("cam1")).await.is_err());
        assert!(catalog.acquire(MediaKind::Video, Some("cam0")).await.is_ok());
    }

    #[tokio::test]
    async fn test_enumerate() {
        let devices = catalog().enumerate().await.unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(
            devices.iter().filter(|d| d.kind == MediaKind::Video).count(),
            2
        );
    }
}
