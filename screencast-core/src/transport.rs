//! Transport seam: the capability the session controller drives.
//!
//! Implementations own capture, encoding and the wire protocol. The
//! controller only sequences their lifecycle, so the trait is deliberately
//! narrow: prepare, start, stop, a live bitrate knob, and a resume
//! primitive that reuses the existing capture grant instead of tearing the
//! pipeline down.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::PermissionToken;

pub mod simulated;

/// Encoder video parameters derived from the active settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u64,
    pub keyframe_interval_secs: u32,
}

/// Encoder audio parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    pub enabled: bool,
    pub bitrate_bps: u64,
    pub sample_rate: u32,
    pub stereo: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bitrate_bps: 128_000,
            sample_rate: 44_100,
            stereo: true,
        }
    }
}

/// Failure mode of `prepare`. Revoked permission is terminal for the
/// session; encoder init failures are reported but may succeed on a later
/// attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    #[error("video encoder init failed: {0}")]
    Video(String),
    #[error("audio capture init failed: {0}")]
    Audio(String),
    #[error("capture permission revoked")]
    PermissionRevoked,
}

/// Asynchronous transport notifications, delivered out of band on the
/// event channel handed to the implementation at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionStarted { url: String },
    ConnectionSuccess,
    ConnectionFailed { reason: String },
    Disconnected,
    AuthError,
    BitrateSample { bps: u64 },
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Channel pair for transport event delivery.
#[must_use]
pub fn event_channel() -> (TransportEvents, mpsc::UnboundedReceiver<TransportEvent>) {
    mpsc::unbounded_channel()
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Initialize capture and encoders for the given parameters under the
    /// given capture grant. Must be called before `start`, and again
    /// whenever the parameters change.
    async fn prepare(
        &self,
        permission: &PermissionToken,
        video: &VideoConfig,
        audio: &AudioConfig,
    ) -> Result<(), PrepareError>;

    /// Begin connecting to `url`. Outcome arrives as `ConnectionSuccess`
    /// or `ConnectionFailed` on the event channel.
    async fn start(&self, url: &str) -> Result<(), String>;

    /// Tear the connection down. Idempotent.
    async fn stop(&self) -> Result<(), String>;

    /// Whether the transport believes it is currently publishing.
    fn is_streaming(&self) -> bool;

    /// Adjust the encoder bitrate without restarting the pipeline.
    async fn set_bitrate_live(&self, bps: u64) -> Result<(), String>;

    /// Resume the existing pipeline after `delay`, keeping the capture
    /// grant alive. Outcome arrives on the event channel like `start`.
    async fn retry(&self, delay: Duration, reason: &str, url: &str) -> Result<(), String>;
}
