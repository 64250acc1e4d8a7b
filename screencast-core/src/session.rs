//! Session data model and the status surface consumed by presentation
//! layers.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::orientation::Orientation;
use crate::settings::StreamSettings;

/// Lifecycle states of the single owned session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Preparing,
    Connecting,
    Streaming,
    Reconnecting,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Terminal states from which a fresh start is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Opaque capture authorization. The controller caches it across
/// reconnects and restarts and discards it on terminal stop or failure;
/// it never inspects the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionToken(String);

impl PermissionToken {
    #[must_use]
    pub fn new() -> Self {
        Self(nanoid::nanoid!())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PermissionToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse status codes published to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Starting,
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// One entry on the status broadcast channel, emitted on every state
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub status: StatusCode,
    pub message: String,
    pub url: Option<String>,
}

/// Rolling bitrate telemetry from the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub last_bitrate_bps: u64,
    pub bitrate_samples: u64,
}

/// The one live session the controller owns. A fresh value is created per
/// start and dropped on terminal stop or failure.
pub(crate) struct Session {
    pub id: String,
    pub permission: PermissionToken,
    pub target_url: String,
    pub active_settings: StreamSettings,
    pub retry_count: u32,
    pub intentional_stop: bool,
    /// Set when settings changed while a start/retry was in flight, so the
    /// next attempt re-prepares instead of reusing the stale pipeline.
    pub needs_prepare: bool,
    pub stats: StreamStats,
    pub connected_at: Option<Instant>,
}

impl Session {
    pub fn new(permission: PermissionToken, target_url: String, settings: StreamSettings) -> Self {
        Self {
            id: nanoid::nanoid!(10),
            permission,
            target_url,
            active_settings: settings,
            retry_count: 0,
            intentional_stop: false,
            needs_prepare: false,
            stats: StreamStats::default(),
            connected_at: None,
        }
    }
}

/// Point-in-time view of the controller, returned by the inspection
/// command.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub retry_count: u32,
    pub settings: Option<StreamSettings>,
    pub target_url: Option<String>,
    pub orientation: Orientation,
    pub stats: StreamStats,
    /// Seconds since the current connection was established.
    pub uptime_secs: Option<u64>,
}
