//! The session controller actor.
//!
//! One task owns the session and all lifecycle decisions. Every external
//! signal (commands, transport callbacks, heartbeat verdicts, timers) is
//! funneled into a single event queue, so handlers never race each other.
//! Blocking transport work runs on spawned tasks that post completion
//! events back, stamped with an operation sequence number so completions
//! from a superseded operation are ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::heartbeat::{HealthProbe, HeartbeatConfig, HeartbeatMonitor};
use crate::orientation::OrientationWatcher;
use crate::reconcile::{classify, ChangeClass};
use crate::retry::{RetryPolicy, RetryScheduler, ScheduledTask};
use crate::session::{
    PermissionToken, Session, SessionSnapshot, SessionState, StatusCode, StatusUpdate,
};
use crate::settings::{ScreenMetrics, SettingsUpdate, StreamSettings};
use crate::store::SettingsStore;
use crate::transport::{
    AudioConfig, PrepareError, StreamTransport, TransportEvent, VideoConfig,
};

const KEYFRAME_INTERVAL_SECS: u32 = 1;
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Tuning knobs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Publish URL handed to the transport.
    pub target_url: String,
    /// Physical screen dimensions of the capture device.
    pub screen: ScreenMetrics,
    pub retry: RetryPolicy,
    pub heartbeat: HeartbeatConfig,
    /// Wait after an orientation crossing before restarting.
    pub settle_delay: Duration,
    /// Wait between stop completing and the replacement session preparing.
    pub restart_delay: Duration,
    /// Upper bound on how long a transport stop may block the transition.
    pub stop_timeout: Duration,
    /// Fixed resume delay for the heartbeat's forced reconnect.
    pub force_reconnect_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_url: "rtmp://127.0.0.1:1935/live/stream".to_owned(),
            screen: ScreenMetrics {
                width: 1080,
                height: 2400,
            },
            retry: RetryPolicy::default(),
            heartbeat: HeartbeatConfig::default(),
            settle_delay: Duration::from_secs(1),
            restart_delay: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
            force_reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Commands accepted by the controller.
pub enum Command {
    Start { permission: PermissionToken },
    Stop,
    UpdateSettings(SettingsUpdate),
    RotationSample(u16),
    Inspect(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

enum Event {
    Command(Command),
    Transport(TransportEvent),
    PrepareFinished {
        op_seq: u64,
        result: std::result::Result<StreamSettings, PrepareError>,
    },
    StartFinished {
        op_seq: u64,
        result: std::result::Result<(), String>,
    },
    StopFinished {
        op_seq: u64,
    },
    ResumeFinished {
        op_seq: u64,
        result: std::result::Result<(), String>,
    },
    RetryFired {
        generation: u64,
    },
    SettleFired {
        generation: u64,
    },
    RestartFired {
        generation: u64,
    },
    SplitBrain,
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Event>,
    status_tx: broadcast::Sender<StatusUpdate>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn start(&self, permission: PermissionToken) -> Result<()> {
        self.send(Command::Start { permission })
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        self.send(Command::UpdateSettings(update))
    }

    pub fn rotation_sample(&self, degrees: u16) -> Result<()> {
        self.send(Command::RotationSample(degrees))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Inspect(tx))?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }

    /// Subscribe to status updates emitted on every state transition.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    /// Watch channel carrying the current session state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Event::Command(command))
            .map_err(|_| Error::ControllerClosed)
    }
}

pub struct SessionController {
    config: ControllerConfig,
    transport: Arc<dyn StreamTransport>,
    probe: Arc<dyn HealthProbe>,
    store: Arc<dyn SettingsStore>,
    tx: mpsc::UnboundedSender<Event>,

    state: SessionState,
    session: Option<Session>,
    watcher: OrientationWatcher,
    pending_restart: bool,

    op_seq: u64,
    retry: RetryScheduler,
    settle: ScheduledTask,
    restart: ScheduledTask,
    heartbeat: HeartbeatMonitor,

    status_tx: broadcast::Sender<StatusUpdate>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionController {
    /// Spawn the actor. `transport_events` is the receiving half of the
    /// channel the transport was constructed with.
    pub fn spawn(
        transport: Arc<dyn StreamTransport>,
        probe: Arc<dyn HealthProbe>,
        store: Arc<dyn SettingsStore>,
        config: ControllerConfig,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let forward = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = transport_events.recv().await {
                if forward.send(Event::Transport(event)).is_err() {
                    return;
                }
            }
        });

        let initial_orientation = config.screen.orientation();
        let controller = Self {
            retry: RetryScheduler::new(config.retry),
            heartbeat: HeartbeatMonitor::new(config.heartbeat),
            watcher: OrientationWatcher::new(initial_orientation),
            config,
            transport,
            probe,
            store,
            tx: tx.clone(),
            state: SessionState::Idle,
            session: None,
            pending_restart: false,
            op_seq: 0,
            settle: ScheduledTask::default(),
            restart: ScheduledTask::default(),
            status_tx: status_tx.clone(),
            state_tx,
        };

        let handle = SessionHandle {
            tx,
            status_tx,
            state_rx,
        };
        let join = tokio::spawn(controller.run(rx));
        (handle, join)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = rx.recv().await {
            match event {
                Event::Command(Command::Shutdown) => {
                    self.teardown();
                    break;
                }
                Event::Command(command) => self.handle_command(command),
                Event::Transport(event) => self.handle_transport(event),
                Event::PrepareFinished { op_seq, result } => {
                    self.handle_prepare_finished(op_seq, result);
                }
                Event::StartFinished { op_seq, result } => {
                    self.handle_start_finished(op_seq, result);
                }
                Event::StopFinished { op_seq } => self.handle_stop_finished(op_seq),
                Event::ResumeFinished { op_seq, result } => {
                    self.handle_resume_finished(op_seq, result);
                }
                Event::RetryFired { generation } => self.handle_retry_fired(generation),
                Event::SettleFired { generation } => self.handle_settle_fired(generation),
                Event::RestartFired { generation } => self.handle_restart_fired(generation),
                Event::SplitBrain => self.handle_split_brain(),
            }
        }
        info!("session controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { permission } => self.handle_start(permission),
            Command::Stop => self.handle_stop(),
            Command::UpdateSettings(update) => self.handle_update_settings(update),
            Command::RotationSample(degrees) => self.handle_rotation_sample(degrees),
            Command::Inspect(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => unreachable!("handled in run"),
        }
    }

    fn handle_start(&mut self, permission: PermissionToken) {
        if !self.state.is_terminal() {
            debug!(state = %self.state, "start ignored, session already active");
            return;
        }
        let session = Session::new(
            permission,
            self.config.target_url.clone(),
            StreamSettings::default(),
        );
        info!(session_id = %session.id, url = %session.target_url, "starting broadcast session");
        self.session = Some(session);
        self.pending_restart = false;
        self.begin_prepare();
    }

    fn handle_stop(&mut self) {
        if self.state.is_terminal() {
            debug!(state = %self.state, "stop ignored");
            return;
        }
        if self.state == SessionState::Stopping {
            if self.pending_restart {
                // A stop-for-restart is in flight; turn it into a final stop.
                self.pending_restart = false;
                if let Some(session) = self.session.as_mut() {
                    session.intentional_stop = true;
                }
            } else if self.session.as_ref().is_some_and(|s| !s.intentional_stop) {
                // Restart delay window between stop and re-prepare.
                self.restart.cancel();
                self.session = None;
                self.set_state(SessionState::Stopped);
                self.emit_status(StatusCode::Disconnected, "broadcast stopped".to_owned());
            }
            return;
        }
        info!("stopping broadcast session");
        self.pending_restart = false;
        if let Some(session) = self.session.as_mut() {
            session.intentional_stop = true;
        }
        self.cancel_timers();
        self.heartbeat.disarm();
        self.watcher.suspend();
        self.emit_status(StatusCode::Disconnected, "stopping broadcast".to_owned());
        self.begin_stop(None);
    }

    fn handle_update_settings(&mut self, update: SettingsUpdate) {
        if update.is_empty() {
            return;
        }

        // A stop in flight is final for this session; the change is
        // persisted only, never turned into a restart of a session the
        // user (or a restart sequence) is tearing down.
        let session_active = self.session.is_some()
            && !self.state.is_terminal()
            && self.state != SessionState::Stopping;
        if !session_active {
            // Persist only; the next session picks the merged values up.
            let store = self.store.clone();
            tokio::spawn(async move {
                let current = match store.load().await {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!(error = %e, "settings load failed, merging over defaults");
                        StreamSettings::default()
                    }
                };
                let merged = current.merged(&update);
                if let Err(e) = store.save(&merged).await {
                    error!(error = %e, "settings persist failed");
                }
            });
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let (merged, class) = classify(&session.active_settings, &update);
        match class {
            ChangeClass::Unchanged => {
                debug!("settings update matches active configuration");
            }
            ChangeClass::LiveBitrate(bitrate) => {
                info!(mbps = bitrate.megabits(), "applying bitrate live");
                session.active_settings = merged.clone();
                let streaming = self.state == SessionState::Streaming;
                if !streaming {
                    // The prepared pipeline carries the old bitrate; force
                    // a re-prepare on the next attempt.
                    session.needs_prepare = true;
                }
                let store = self.store.clone();
                let transport = self.transport.clone();
                let bps = bitrate.bits_per_sec();
                tokio::spawn(async move {
                    if let Err(e) = store.save(&merged).await {
                        error!(error = %e, "settings persist failed");
                    }
                    if streaming {
                        if let Err(e) = transport.set_bitrate_live(bps).await {
                            warn!(error = %e, "live bitrate update rejected, keeping stream up");
                        }
                    }
                });
            }
            ChangeClass::RestartRequired => {
                info!("settings change requires pipeline restart");
                session.active_settings = merged.clone();
                self.retry.cancel();
                if self.state == SessionState::Preparing {
                    // Prepare already in flight; rerun it with the new
                    // values once it completes.
                    session.needs_prepare = true;
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        if let Err(e) = store.save(&merged).await {
                            error!(error = %e, "settings persist failed");
                        }
                    });
                } else {
                    session.intentional_stop = true;
                    self.pending_restart = true;
                    self.heartbeat.disarm();
                    self.emit_status(
                        StatusCode::Starting,
                        "restarting with updated settings".to_owned(),
                    );
                    self.begin_stop(Some(merged));
                }
            }
        }
    }

    fn handle_rotation_sample(&mut self, degrees: u16) {
        if self.state != SessionState::Streaming {
            return;
        }
        if let Some(orientation) = self.watcher.on_sample(degrees) {
            info!(?orientation, degrees, "orientation crossing detected, settling");
            let tx = self.tx.clone();
            self.settle.schedule(self.config.settle_delay, move |generation| {
                let _ = tx.send(Event::SettleFired { generation });
            });
        }
    }

    fn handle_settle_fired(&mut self, generation: u64) {
        if !self.settle.is_current(generation) {
            return;
        }
        if !matches!(
            self.state,
            SessionState::Streaming | SessionState::Connecting | SessionState::Reconnecting
        ) {
            return;
        }
        info!(orientation = ?self.watcher.orientation(), "restarting for orientation change");
        if let Some(session) = self.session.as_mut() {
            session.intentional_stop = true;
        }
        self.retry.cancel();
        self.pending_restart = true;
        self.heartbeat.disarm();
        self.emit_status(
            StatusCode::Starting,
            "restarting for orientation change".to_owned(),
        );
        self.begin_stop(None);
    }

    fn handle_restart_fired(&mut self, generation: u64) {
        if !self.restart.is_current(generation) {
            return;
        }
        if self.session.is_none() {
            return;
        }
        self.begin_prepare();
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStarted { url } => {
                debug!(url = %url, "transport connection attempt started");
            }
            TransportEvent::ConnectionSuccess => self.handle_connection_success(),
            TransportEvent::ConnectionFailed { reason } => self.handle_connection_failed(&reason),
            TransportEvent::Disconnected => self.handle_disconnected(),
            TransportEvent::AuthError => self.handle_auth_error(),
            TransportEvent::BitrateSample { bps } => {
                if let Some(session) = self.session.as_mut() {
                    session.stats.last_bitrate_bps = bps;
                    session.stats.bitrate_samples += 1;
                    trace!(bps, "bitrate sample");
                }
            }
        }
    }

    fn handle_connection_success(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::Reconnecting
        ) {
            debug!(state = %self.state, "connection success ignored");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.intentional_stop {
            return;
        }
        session.retry_count = 0;
        session.connected_at = Some(Instant::now());
        let url = session.target_url.clone();
        info!(session_id = %session.id, url = %url, "stream connected");
        self.retry.cancel();
        self.set_state(SessionState::Streaming);
        self.emit_status_url(StatusCode::Connected, "stream is live".to_owned(), Some(url));
        self.watcher.resume();

        let tx = self.tx.clone();
        self.heartbeat
            .arm(self.probe.clone(), self.transport.clone(), move || {
                let _ = tx.send(Event::SplitBrain);
            });
    }

    fn handle_connection_failed(&mut self, reason: &str) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::Reconnecting | SessionState::Streaming
        ) {
            debug!(state = %self.state, reason, "connection failure ignored");
            return;
        }
        if self.session.as_ref().is_none_or(|s| s.intentional_stop) {
            return;
        }
        warn!(reason, "connection failed");
        self.schedule_backoff();
    }

    fn handle_disconnected(&mut self) {
        if self.state != SessionState::Streaming {
            debug!(state = %self.state, "disconnect ignored");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.intentional_stop {
            return;
        }
        session.retry_count += 1;
        session.connected_at = None;
        let attempt = session.retry_count;
        let delay = self.retry.policy().delay(attempt);
        let url = session.target_url.clone();
        warn!(attempt, ?delay, "unexpected disconnect, resuming");
        self.heartbeat.disarm();
        self.set_state(SessionState::Reconnecting);
        self.emit_status(
            StatusCode::Connecting,
            format!("connection lost, resuming in {}s", delay.as_secs()),
        );
        self.begin_resume(delay, "unexpected disconnect", url);
    }

    fn handle_split_brain(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.intentional_stop {
            return;
        }
        let url = session.target_url.clone();
        let delay = self.config.force_reconnect_delay;
        warn!(?delay, "server lost the stream, forcing reconnect");
        self.heartbeat.disarm();
        self.set_state(SessionState::Reconnecting);
        self.emit_status(
            StatusCode::Connecting,
            "server lost the stream, reconnecting".to_owned(),
        );
        // Deliberately does not touch retry_count: a split brain is not a
        // connect failure.
        self.begin_resume(delay, "server reports stream inactive", url);
    }

    fn handle_auth_error(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        error!("authentication rejected by server, session failed");
        self.cancel_timers();
        self.heartbeat.disarm();
        self.watcher.suspend();
        self.pending_restart = false;
        self.session = None;
        self.set_state(SessionState::Failed);
        self.emit_status(
            StatusCode::Failed,
            "authentication rejected by server".to_owned(),
        );
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let _ = transport.stop().await;
        });
    }

    fn handle_prepare_finished(
        &mut self,
        op_seq: u64,
        result: std::result::Result<StreamSettings, PrepareError>,
    ) {
        if op_seq != self.op_seq || self.state != SessionState::Preparing {
            debug!(op_seq, "stale prepare completion ignored");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match result {
            Ok(settings) => {
                session.active_settings = settings;
                if session.needs_prepare {
                    // Settings changed while prepare was in flight.
                    session.needs_prepare = false;
                    self.begin_prepare();
                    return;
                }
                self.begin_start();
            }
            Err(PrepareError::PermissionRevoked) => {
                error!("capture permission revoked, session failed");
                self.fail_session("screen capture permission revoked");
            }
            Err(e) => {
                error!(error = %e, "pipeline prepare failed, session failed");
                self.fail_session("failed to initialize capture pipeline");
            }
        }
    }

    fn handle_start_finished(
        &mut self,
        op_seq: u64,
        result: std::result::Result<(), String>,
    ) {
        if op_seq != self.op_seq || self.state != SessionState::Connecting {
            return;
        }
        if let Err(reason) = result {
            warn!(reason, "transport start rejected");
            self.schedule_backoff();
        }
    }

    fn handle_stop_finished(&mut self, op_seq: u64) {
        if op_seq != self.op_seq || self.state != SessionState::Stopping {
            return;
        }
        if self.pending_restart {
            self.pending_restart = false;
            if let Some(session) = self.session.as_mut() {
                session.intentional_stop = false;
            }
            let tx = self.tx.clone();
            self.restart
                .schedule(self.config.restart_delay, move |generation| {
                    let _ = tx.send(Event::RestartFired { generation });
                });
            return;
        }
        info!("broadcast session stopped");
        self.session = None;
        self.set_state(SessionState::Stopped);
        self.emit_status(StatusCode::Disconnected, "broadcast stopped".to_owned());
    }

    fn handle_resume_finished(
        &mut self,
        op_seq: u64,
        result: std::result::Result<(), String>,
    ) {
        if op_seq != self.op_seq || self.state != SessionState::Reconnecting {
            return;
        }
        if let Err(reason) = result {
            // Resume primitive unavailable; fall back to a scheduled full
            // reconnect at the same attempt number.
            warn!(reason, "transport resume rejected, falling back to scheduler");
            let attempt = self.session.as_ref().map_or(1, |s| s.retry_count.max(1));
            let tx = self.tx.clone();
            let delay = self.retry.schedule_attempt(attempt, move |generation| {
                let _ = tx.send(Event::RetryFired { generation });
            });
            self.emit_status(
                StatusCode::Connecting,
                format!("retrying in {}s (attempt {attempt})", delay.as_secs()),
            );
        }
    }

    fn handle_retry_fired(&mut self, generation: u64) {
        if !self.retry.is_current(generation) {
            return;
        }
        if self.state != SessionState::Reconnecting {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.intentional_stop {
            return;
        }
        if session.needs_prepare {
            session.needs_prepare = false;
            self.begin_prepare();
        } else {
            self.begin_start();
        }
    }

    // Spawned operations. Each bumps op_seq so completions from an
    // operation the controller has moved past are dropped.

    fn begin_prepare(&mut self) {
        let Some(permission) = self.session.as_ref().map(|s| s.permission.clone()) else {
            return;
        };
        self.op_seq += 1;
        let op_seq = self.op_seq;
        self.set_state(SessionState::Preparing);
        self.emit_status(StatusCode::Starting, "preparing capture pipeline".to_owned());

        let store = self.store.clone();
        let transport = self.transport.clone();
        let tx = self.tx.clone();
        let screen = self.config.screen;
        let orientation = self.watcher.orientation();
        tokio::spawn(async move {
            let settings = match store.load().await {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(error = %e, "settings load failed, using defaults");
                    StreamSettings::default()
                }
            };
            let (width, height) = settings.video_dimensions(screen, orientation);
            let video = VideoConfig {
                width,
                height,
                fps: settings.frame_rate.fps(),
                bitrate_bps: settings.bitrate.bits_per_sec(),
                keyframe_interval_secs: KEYFRAME_INTERVAL_SECS,
            };
            let audio = AudioConfig {
                enabled: settings.audio_enabled,
                ..AudioConfig::default()
            };
            debug!(width, height, fps = video.fps, "preparing pipeline");
            let result = transport
                .prepare(&permission, &video, &audio)
                .await
                .map(|()| settings);
            let _ = tx.send(Event::PrepareFinished { op_seq, result });
        });
    }

    fn begin_start(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        self.op_seq += 1;
        let op_seq = self.op_seq;
        let url = session.target_url.clone();
        self.set_state(SessionState::Connecting);
        self.emit_status_url(
            StatusCode::Connecting,
            "connecting to server".to_owned(),
            Some(url.clone()),
        );

        let transport = self.transport.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = transport.start(&url).await;
            let _ = tx.send(Event::StartFinished { op_seq, result });
        });
    }

    fn begin_stop(&mut self, persist: Option<StreamSettings>) {
        self.op_seq += 1;
        let op_seq = self.op_seq;
        self.set_state(SessionState::Stopping);

        let store = self.store.clone();
        let transport = self.transport.clone();
        let tx = self.tx.clone();
        let stop_timeout = self.config.stop_timeout;
        tokio::spawn(async move {
            if let Some(settings) = persist {
                if let Err(e) = store.save(&settings).await {
                    error!(error = %e, "settings persist failed");
                }
            }
            if tokio::time::timeout(stop_timeout, transport.stop())
                .await
                .is_err()
            {
                warn!("transport stop timed out, completing transition anyway");
            }
            let _ = tx.send(Event::StopFinished { op_seq });
        });
    }

    fn begin_resume(&mut self, delay: Duration, reason: &'static str, url: String) {
        self.op_seq += 1;
        let op_seq = self.op_seq;
        let transport = self.transport.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = transport.retry(delay, reason, &url).await;
            let _ = tx.send(Event::ResumeFinished { op_seq, result });
        });
    }

    fn schedule_backoff(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.retry_count += 1;
        let attempt = session.retry_count;
        self.heartbeat.disarm();
        self.set_state(SessionState::Reconnecting);
        let tx = self.tx.clone();
        let delay = self.retry.schedule_attempt(attempt, move |generation| {
            let _ = tx.send(Event::RetryFired { generation });
        });
        self.emit_status(
            StatusCode::Connecting,
            format!("retrying in {}s (attempt {attempt})", delay.as_secs()),
        );
    }

    fn fail_session(&mut self, message: &str) {
        self.cancel_timers();
        self.heartbeat.disarm();
        self.watcher.suspend();
        self.pending_restart = false;
        self.session = None;
        self.set_state(SessionState::Failed);
        self.emit_status(StatusCode::Failed, message.to_owned());
    }

    fn cancel_timers(&mut self) {
        self.retry.cancel();
        self.settle.cancel();
        self.restart.cancel();
    }

    fn teardown(&mut self) {
        self.cancel_timers();
        self.heartbeat.disarm();
        if !self.state.is_terminal() {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let _ = transport.stop().await;
            });
            self.set_state(SessionState::Stopped);
        }
        self.session = None;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            retry_count: self.session.as_ref().map_or(0, |s| s.retry_count),
            settings: self.session.as_ref().map(|s| s.active_settings.clone()),
            target_url: self.session.as_ref().map(|s| s.target_url.clone()),
            orientation: self.watcher.orientation(),
            stats: self.session.as_ref().map_or_else(Default::default, |s| s.stats),
            uptime_secs: self
                .session
                .as_ref()
                .and_then(|s| s.connected_at)
                .map(|t| t.elapsed().as_secs()),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "session state transition");
        self.state = state;
        let _ = self.state_tx.send(state);
    }

    fn emit_status(&self, status: StatusCode, message: String) {
        self.emit_status_url(status, message, None);
    }

    fn emit_status_url(&self, status: StatusCode, message: String, url: Option<String>) {
        let _ = self.status_tx.send(StatusUpdate {
            status,
            message,
            url,
        });
    }
}
