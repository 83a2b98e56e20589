use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a JSON file
///
/// Uses `ArcSwap` for lock-free reads.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    /// Open the store, writing defaults when the file does not exist yet
    pub async fn load(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let config = match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating default configuration at {}", path.display());
                let config = AppConfig::default();
                Self::save_to_file(path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };

        let (change_tx, _) = broadcast::channel(16);

        Ok(Self {
            path: path.to_path_buf(),
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        })
    }

    async fn save_to_file(path: &Path, config: &AppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(path, json).await?;
        debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Get current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Set entire configuration
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        Self::save_to_file(&self.path, &config).await?;
        self.cache.store(Arc::new(config));

        let _ = self.change_tx.send(ConfigChange {
            key: "app_config".to_string(),
        });

        Ok(())
    }

    /// Update configuration with a closure
    ///
    /// Read-modify-write; concurrent updates are last-write-wins.
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let current = self.cache.load();
        let mut config = (**current).clone();
        f(&mut config);
        self.set(config).await
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_config_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("livecast.json");

        let store = ConfigStore::load(&path).await.unwrap();
        assert!(path.exists());

        let config = store.get();
        assert_eq!(config.signaling.keepalive_secs, 30);
        assert_eq!(config.webrtc.stun_servers.len(), 3);
        assert_eq!((config.media.width, config.media.height), (1280, 720));

        let mut changes = store.subscribe();
        assert_ok!(
            store
                .update(|c| {
                    c.signaling.server_url = "wss://relay.example.com".to_string();
                    c.media.video_device = Some("cam1".to_string());
                })
                .await
        );
        assert_eq!(changes.recv().await.unwrap().key, "app_config");

        let config = store.get();
        assert_eq!(config.signaling.server_url, "wss://relay.example.com");

        // A new store instance sees the persisted values
        let store2 = ConfigStore::load(&path).await.unwrap();
        let config = store2.get();
        assert_eq!(config.signaling.server_url, "wss://relay.example.com");
        assert_eq!(config.media.video_device.as_deref(), Some("cam1"));
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        tokio::fs::write(&path, r#"{"signaling":{"keepalive_secs":10}}"#)
            .await
            .unwrap();

        let config = ConfigStore::load(&path).await.unwrap().get();
        assert_eq!(config.signaling.keepalive_secs, 10);
        assert_eq!(config.signaling.streamer_path, "/ws/streamer");
        assert_eq!(config.media.devices.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = ConfigStore::load(&path).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
