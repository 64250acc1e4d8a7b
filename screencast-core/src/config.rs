//! Application configuration, layered from an optional TOML file and
//! `SCREENCAST_`-prefixed environment variables. Every section has full
//! defaults so an empty config runs.

use std::time::Duration;

use serde::Deserialize;

use crate::controller::ControllerConfig;
use crate::error::{Error, Result};
use crate::heartbeat::HeartbeatConfig;
use crate::retry::RetryPolicy;
use crate::settings::{ScreenMetrics, StreamSettings};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub session: SessionTuning,
    pub screen: ScreenConfig,
    /// Initial stream settings, used when the settings store is empty.
    pub defaults: StreamSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub rtmp_port: u16,
    pub http_port: u16,
    pub app: String,
    pub stream_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            rtmp_port: 1935,
            http_port: 8000,
            app: "live".to_owned(),
            stream_key: "stream".to_owned(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn rtmp_url(&self) -> String {
        format!(
            "rtmp://{}:{}/{}/{}",
            self.host, self.rtmp_port, self.app, self.stream_key
        )
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.host, self.http_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            file_path: None,
        }
    }
}

/// Timer tuning, all in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    pub retry_first_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub restart_delay_ms: u64,
    pub stop_timeout_ms: u64,
    pub force_reconnect_delay_ms: u64,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            retry_first_delay_ms: 3_000,
            retry_max_delay_ms: 30_000,
            heartbeat_interval_ms: 3_000,
            heartbeat_timeout_ms: 2_000,
            settle_delay_ms: 1_000,
            restart_delay_ms: 500,
            stop_timeout_ms: 5_000,
            force_reconnect_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 2400,
        }
    }
}

impl Config {
    /// Load from an optional file with environment overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SCREENCAST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.server.host.is_empty() {
            problems.push("server.host must not be empty".to_owned());
        }
        if self.server.app.is_empty() || self.server.stream_key.is_empty() {
            problems.push("server.app and server.stream_key must not be empty".to_owned());
        }
        if self.session.retry_first_delay_ms == 0 {
            problems.push("session.retry_first_delay_ms must be positive".to_owned());
        }
        if self.session.retry_max_delay_ms < self.session.retry_first_delay_ms {
            problems.push("session.retry_max_delay_ms must be >= retry_first_delay_ms".to_owned());
        }
        if self.session.heartbeat_interval_ms == 0 {
            problems.push("session.heartbeat_interval_ms must be positive".to_owned());
        }
        if self.screen.width == 0 || self.screen.height == 0 {
            problems.push("screen dimensions must be positive".to_owned());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(problems.join("; ")))
        }
    }

    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            target_url: self.server.rtmp_url(),
            screen: ScreenMetrics {
                width: self.screen.width,
                height: self.screen.height,
            },
            retry: RetryPolicy {
                first_delay: Duration::from_millis(self.session.retry_first_delay_ms),
                max_delay: Duration::from_millis(self.session.retry_max_delay_ms),
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(self.session.heartbeat_interval_ms),
                probe_timeout: Duration::from_millis(self.session.heartbeat_timeout_ms),
            },
            settle_delay: Duration::from_millis(self.session.settle_delay_ms),
            restart_delay: Duration::from_millis(self.session.restart_delay_ms),
            stop_timeout: Duration::from_millis(self.session.stop_timeout_ms),
            force_reconnect_delay: Duration::from_millis(self.session.force_reconnect_delay_ms),
        }
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.session.heartbeat_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_service_urls() {
        let config = Config::default();
        assert_eq!(config.server.rtmp_url(), "rtmp://127.0.0.1:1935/live/stream");
        assert_eq!(config.server.health_url(), "http://127.0.0.1:8000/health");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_match_controller_timers() {
        let cc = Config::default().controller_config();
        assert_eq!(cc.retry.first_delay, Duration::from_secs(3));
        assert_eq!(cc.retry.max_delay, Duration::from_secs(30));
        assert_eq!(cc.heartbeat.interval, Duration::from_secs(3));
        assert_eq!(cc.settle_delay, Duration::from_secs(1));
        assert_eq!(cc.restart_delay, Duration::from_millis(500));
        assert_eq!(cc.force_reconnect_delay, Duration::from_secs(2));
    }

    #[test]
    fn inverted_retry_bounds_rejected() {
        let mut config = Config::default();
        config.session.retry_first_delay_ms = 10_000;
        config.session.retry_max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_host_rejected() {
        let mut config = Config::default();
        config.server.host.clear();
        assert!(config.validate().is_err());
    }
}
