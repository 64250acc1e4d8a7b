//! In-process transport used by the demo binary and soak runs. Connects
//! after a configurable delay and can be told to fail the first N
//! connection attempts, which exercises the full backoff ladder without a
//! real media server.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    AudioConfig, PrepareError, StreamTransport, TransportEvent, TransportEvents, VideoConfig,
};
use crate::session::PermissionToken;

pub struct SimulatedTransport {
    events: TransportEvents,
    connect_delay: Duration,
    fail_remaining: AtomicU32,
    streaming: AtomicBool,
}

impl SimulatedTransport {
    #[must_use]
    pub fn new(events: TransportEvents, connect_delay: Duration, fail_first: u32) -> Self {
        Self {
            events,
            connect_delay,
            fail_remaining: AtomicU32::new(fail_first),
            streaming: AtomicBool::new(false),
        }
    }

    fn connect_after(&self, delay: Duration, url: &str) {
        let events = self.events.clone();
        let url = url.to_owned();
        let fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let _ = events.send(TransportEvent::ConnectionStarted { url: url.clone() });
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fail {
                let _ = events.send(TransportEvent::ConnectionFailed {
                    reason: format!("simulated refusal from {url}"),
                });
            } else {
                let _ = events.send(TransportEvent::ConnectionSuccess);
            }
        });
    }
}

#[async_trait]
impl StreamTransport for SimulatedTransport {
    async fn prepare(
        &self,
        _permission: &PermissionToken,
        video: &VideoConfig,
        audio: &AudioConfig,
    ) -> Result<(), PrepareError> {
        debug!(
            width = video.width,
            height = video.height,
            fps = video.fps,
            bitrate_bps = video.bitrate_bps,
            audio = audio.enabled,
            "simulated encoder prepared"
        );
        Ok(())
    }

    async fn start(&self, url: &str) -> Result<(), String> {
        info!(url, "simulated transport connecting");
        self.streaming.store(true, Ordering::SeqCst);
        self.connect_after(self.connect_delay, url);
        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn set_bitrate_live(&self, bps: u64) -> Result<(), String> {
        debug!(bps, "simulated bitrate applied");
        Ok(())
    }

    async fn retry(&self, delay: Duration, reason: &str, url: &str) -> Result<(), String> {
        info!(?delay, reason, "simulated transport resuming");
        self.connect_after(delay + self.connect_delay, url);
        Ok(())
    }
}
