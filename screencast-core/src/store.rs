//! Persistence seam for stream settings.
//!
//! The controller reads the store before every prepare and the reconciler
//! writes the merged settings before triggering a restart, so a crash mid
//! restart still comes back up with the requested configuration.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::StreamSettings;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<StreamSettings>;
    async fn save(&self, settings: &StreamSettings) -> Result<()>;
}

/// In-memory store, used by tests and the demo harness.
#[derive(Default)]
pub struct MemorySettingsStore {
    inner: RwLock<StreamSettings>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new(initial: StreamSettings) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<StreamSettings> {
        Ok(self.inner.read().clone())
    }

    async fn save(&self, settings: &StreamSettings) -> Result<()> {
        *self.inner.write() = settings.clone();
        Ok(())
    }
}

/// JSON file store. A missing file yields the configured defaults; writes
/// replace the whole file.
pub struct FileSettingsStore {
    path: PathBuf,
    defaults: StreamSettings,
}

impl FileSettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, defaults: StreamSettings) -> Self {
        Self {
            path: path.into(),
            defaults,
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<StreamSettings> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let settings = serde_json::from_slice(&bytes)?;
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "settings file absent, using defaults");
                Ok(self.defaults.clone())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn save(&self, settings: &StreamSettings) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Bitrate, FrameRate, SettingsUpdate};

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemorySettingsStore::default();
        let update = SettingsUpdate {
            bitrate: Some(Bitrate::Mbps20),
            ..Default::default()
        };
        let changed = StreamSettings::default().merged(&update);
        store.save(&changed).await.unwrap();
        assert_eq!(store.load().await.unwrap(), changed);
    }

    #[tokio::test]
    async fn file_store_uses_configured_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = StreamSettings {
            bitrate: Bitrate::Mbps25,
            ..Default::default()
        };
        let store = FileSettingsStore::new(dir.path().join("settings.json"), defaults.clone());
        assert_eq!(store.load().await.unwrap(), defaults);
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(
            dir.path().join("settings.json"),
            StreamSettings::default(),
        );
        let changed = StreamSettings {
            frame_rate: FrameRate::Fps60,
            audio_enabled: false,
            ..Default::default()
        };
        store.save(&changed).await.unwrap();
        assert_eq!(store.load().await.unwrap(), changed);
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let store = FileSettingsStore::new(path, StreamSettings::default());
        assert!(store.load().await.is_err());
    }
}
