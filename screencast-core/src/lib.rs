//! Lifecycle controller for a screen-broadcast session.
//!
//! The crate owns no capture or wire protocol; it drives an injected
//! [`transport::StreamTransport`] through prepare/start/stop, reconnects
//! with bounded backoff, cross-checks liveness against the ingest server's
//! health endpoint, and reconciles settings changes and orientation flips
//! into live updates or restarts.

pub mod config;
pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod orientation;
pub mod reconcile;
mod retry;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;

pub use config::{Config, LoggingConfig, ServerConfig};
pub use controller::{Command, ControllerConfig, SessionController, SessionHandle};
pub use error::{Error, Result};
pub use heartbeat::{HealthProbe, HeartbeatConfig, HttpHealthProbe, ProbeOutcome};
pub use orientation::Orientation;
pub use reconcile::{classify, ChangeClass};
pub use retry::RetryPolicy;
pub use session::{
    PermissionToken, SessionSnapshot, SessionState, StatusCode, StatusUpdate, StreamStats,
};
pub use settings::{
    AspectMode, Bitrate, FrameRate, Resolution, ScreenMetrics, SettingsUpdate, StreamSettings,
};
pub use store::{FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use transport::{
    event_channel, simulated::SimulatedTransport, AudioConfig, PrepareError, StreamTransport,
    TransportEvent, TransportEvents, VideoConfig,
};
