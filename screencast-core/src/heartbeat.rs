//! Server-side health polling while a session is streaming.
//!
//! The probe is advisory: unreachable servers are skipped because the
//! transport's own callbacks are authoritative for connection loss. The
//! one condition only the probe can see is split brain, where the server
//! reports the stream inactive while the local transport still believes it
//! is publishing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::StreamTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Server reachable and the stream is being ingested.
    Active,
    /// Server reachable but it does not see the stream.
    Inactive,
    /// Probe failed or timed out.
    Unreachable,
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

#[derive(Deserialize)]
struct HealthBody {
    stream_active: bool,
}

/// `GET {base}/health` returning `{ "stream_active": bool }`.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: String, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> ProbeOutcome {
        let resp = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url = %self.url, error = %e, "health probe unreachable");
                return ProbeOutcome::Unreachable;
            }
        };
        if !resp.status().is_success() {
            debug!(url = %self.url, status = %resp.status(), "health probe non-success");
            return ProbeOutcome::Unreachable;
        }
        match resp.json::<HealthBody>().await {
            Ok(body) if body.stream_active => ProbeOutcome::Active,
            Ok(_) => ProbeOutcome::Inactive,
            Err(e) => {
                debug!(url = %self.url, error = %e, "health probe body malformed");
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Periodic poller, armed while streaming and disarmed on every exit from
/// the streaming state. Raises the split-brain signal at most once per
/// streaming episode; an Active probe re-arms the latch.
pub(crate) struct HeartbeatMonitor {
    config: HeartbeatConfig,
    token: Option<CancellationToken>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            token: None,
        }
    }

    pub fn arm<F>(
        &mut self,
        probe: Arc<dyn HealthProbe>,
        transport: Arc<dyn StreamTransport>,
        on_split_brain: F,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        self.disarm();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        let interval = self.config.interval;
        let probe_timeout = self.config.probe_timeout;

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            let mut raised = false;
            loop {
                tokio::select! {
                    () = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                // A probe that outlives its budget counts as unreachable.
                let outcome = tokio::time::timeout(probe_timeout, probe.check())
                    .await
                    .unwrap_or(ProbeOutcome::Unreachable);
                match outcome {
                    ProbeOutcome::Active => raised = false,
                    ProbeOutcome::Unreachable => {}
                    ProbeOutcome::Inactive => {
                        if transport.is_streaming() && !raised {
                            warn!("server reports stream inactive while transport is publishing");
                            raised = true;
                            on_split_brain();
                        }
                    }
                }
            }
        });
    }

    pub fn disarm(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FixedProbe(ProbeOutcome);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn check(&self) -> ProbeOutcome {
            self.0
        }
    }

    struct StalledProbe;

    #[async_trait]
    impl HealthProbe for StalledProbe {
        async fn check(&self) -> ProbeOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ProbeOutcome::Inactive
        }
    }

    struct AlwaysStreaming;

    #[async_trait]
    impl StreamTransport for AlwaysStreaming {
        async fn prepare(
            &self,
            _: &crate::session::PermissionToken,
            _: &crate::transport::VideoConfig,
            _: &crate::transport::AudioConfig,
        ) -> Result<(), crate::transport::PrepareError> {
            Ok(())
        }
        async fn start(&self, _: &str) -> Result<(), String> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), String> {
            Ok(())
        }
        fn is_streaming(&self) -> bool {
            true
        }
        async fn set_bitrate_live(&self, _: u64) -> Result<(), String> {
            Ok(())
        }
        async fn retry(&self, _: Duration, _: &str, _: &str) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_inactive_polls_raise_once() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let hits = Arc::new(AtomicU32::new(0));
        let counted = hits.clone();
        monitor.arm(
            Arc::new(FixedProbe(ProbeOutcome::Inactive)),
            Arc::new(AlwaysStreaming),
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_polls_never_raise() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let raised = Arc::new(AtomicBool::new(false));
        let flagged = raised.clone();
        monitor.arm(
            Arc::new(FixedProbe(ProbeOutcome::Unreachable)),
            Arc::new(AlwaysStreaming),
            move || flagged.store(true, Ordering::SeqCst),
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!raised.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_probe_counts_as_unreachable() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let raised = Arc::new(AtomicBool::new(false));
        let flagged = raised.clone();
        monitor.arm(
            Arc::new(StalledProbe),
            Arc::new(AlwaysStreaming),
            move || flagged.store(true, Ordering::SeqCst),
        );
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!raised.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_stops_polling() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let hits = Arc::new(AtomicU32::new(0));
        let counted = hits.clone();
        monitor.arm(
            Arc::new(FixedProbe(ProbeOutcome::Inactive)),
            Arc::new(AlwaysStreaming),
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
            },
        );
        monitor.disarm();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
