//! Scripted fakes for driving the controller under paused time.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use screencast_core::{
    event_channel, AudioConfig, ControllerConfig, HealthProbe, MemorySettingsStore,
    PermissionToken, PrepareError, ProbeOutcome, SessionController, SessionHandle,
    StreamTransport, TransportEvent, TransportEvents, VideoConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Prepare {
        width: u32,
        height: u32,
        fps: u32,
        audio: bool,
    },
    Start {
        url: String,
    },
    Stop,
    SetBitrate {
        bps: u64,
    },
    Retry {
        delay: Duration,
        reason: String,
    },
}

/// Transport fake. Connection attempts succeed synchronously unless told
/// to fail the first N; the resume primitive waits its delay first, like a
/// real pipeline would.
pub struct FakeTransport {
    events: TransportEvents,
    epoch: tokio::time::Instant,
    calls: Mutex<Vec<(Duration, Call)>>,
    fail_connects: AtomicU32,
    fail_resume: AtomicBool,
    prepare_error: Mutex<Option<PrepareError>>,
    streaming: AtomicBool,
}

impl FakeTransport {
    pub fn new(events: TransportEvents) -> Self {
        Self {
            events,
            epoch: tokio::time::Instant::now(),
            calls: Mutex::new(Vec::new()),
            fail_connects: AtomicU32::new(0),
            fail_resume: AtomicBool::new(false),
            prepare_error: Mutex::new(None),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn fail_first_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::SeqCst);
    }

    pub fn set_prepare_error(&self, error: PrepareError) {
        *self.prepare_error.lock() = Some(error);
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Elapsed-time stamps of every recorded `Start` call.
    pub fn start_times(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| matches!(c, Call::Start { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|(_, c)| matcher(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((self.epoch.elapsed(), call));
    }

    fn attempt_outcome(&self) -> TransportEvent {
        let failed = self
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            TransportEvent::ConnectionFailed {
                reason: "scripted connect failure".to_owned(),
            }
        } else {
            self.streaming.store(true, Ordering::SeqCst);
            TransportEvent::ConnectionSuccess
        }
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn prepare(
        &self,
        _permission: &PermissionToken,
        video: &VideoConfig,
        audio: &AudioConfig,
    ) -> Result<(), PrepareError> {
        self.record(Call::Prepare {
            width: video.width,
            height: video.height,
            fps: video.fps,
            audio: audio.enabled,
        });
        match self.prepare_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn start(&self, url: &str) -> Result<(), String> {
        self.record(Call::Start {
            url: url.to_owned(),
        });
        let outcome = self.attempt_outcome();
        let _ = self.events.send(outcome);
        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        self.record(Call::Stop);
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn set_bitrate_live(&self, bps: u64) -> Result<(), String> {
        self.record(Call::SetBitrate { bps });
        Ok(())
    }

    async fn retry(&self, delay: Duration, reason: &str, _url: &str) -> Result<(), String> {
        self.record(Call::Retry {
            delay,
            reason: reason.to_owned(),
        });
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err("resume unavailable".to_owned());
        }
        let events = self.events.clone();
        let outcome = self.attempt_outcome();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(outcome);
        });
        Ok(())
    }
}

pub struct FakeProbe {
    outcome: Mutex<ProbeOutcome>,
}

impl FakeProbe {
    pub fn new(outcome: ProbeOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
        }
    }

    pub fn set(&self, outcome: ProbeOutcome) {
        *self.outcome.lock() = outcome;
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn check(&self) -> ProbeOutcome {
        *self.outcome.lock()
    }
}

pub struct Harness {
    pub handle: SessionHandle,
    pub transport: Arc<FakeTransport>,
    pub probe: Arc<FakeProbe>,
    pub store: Arc<MemorySettingsStore>,
    /// Keeps the actor task owned by the harness for the test's lifetime.
    #[allow(dead_code)]
    pub join: JoinHandle<()>,
}

pub fn harness() -> Harness {
    let (events_tx, events_rx) = event_channel();
    let transport = Arc::new(FakeTransport::new(events_tx));
    let probe = Arc::new(FakeProbe::new(ProbeOutcome::Active));
    let store = Arc::new(MemorySettingsStore::default());
    let (handle, join) = SessionController::spawn(
        transport.clone(),
        probe.clone(),
        store.clone(),
        ControllerConfig::default(),
        events_rx,
    );
    Harness {
        handle,
        transport,
        probe,
        store,
        join,
    }
}

/// Let the actor drain its queue and spawned tasks finish, advancing
/// paused time by a hair.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
