//! Demo and soak harness: runs the session controller against the
//! built-in simulated transport so the reconnect, heartbeat and restart
//! machinery can be exercised without a device or media server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use screencast_core::{
    event_channel, Config, FileSettingsStore, HttpHealthProbe, MemorySettingsStore,
    PermissionToken, SessionController, SettingsStore, SimulatedTransport,
};

#[derive(Parser)]
#[command(name = "screencast", about = "Screen-broadcast session controller harness")]
struct Args {
    /// Path to a config file (TOML).
    #[arg(short, long, env = "SCREENCAST_CONFIG_PATH")]
    config: Option<String>,

    /// Persist settings to this JSON file instead of memory.
    #[arg(long)]
    settings_file: Option<String>,

    /// Simulated transport: fail the first N connection attempts.
    #[arg(long, default_value_t = 0)]
    fail_first: u32,

    /// Simulated transport: connection delay in milliseconds.
    #[arg(long, default_value_t = 200)]
    connect_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    screencast_core::logging::init_logging(&config.logging).context("initializing logging")?;
    info!(url = %config.server.rtmp_url(), "screencast harness starting");

    let store: Arc<dyn SettingsStore> = match &args.settings_file {
        Some(path) => Arc::new(FileSettingsStore::new(path, config.defaults.clone())),
        None => Arc::new(MemorySettingsStore::new(config.defaults.clone())),
    };

    let (events_tx, events_rx) = event_channel();
    let transport = Arc::new(SimulatedTransport::new(
        events_tx,
        Duration::from_millis(args.connect_delay_ms),
        args.fail_first,
    ));
    let probe = Arc::new(
        HttpHealthProbe::new(config.server.health_url(), config.heartbeat_timeout())
            .context("building health probe")?,
    );

    let (handle, join) = SessionController::spawn(
        transport,
        probe,
        store,
        config.controller_config(),
        events_rx,
    );

    // Mirror every status transition into the log, the way a notification
    // or overlay layer would consume it.
    let mut status_rx = handle.subscribe_status();
    tokio::spawn(async move {
        while let Ok(update) = status_rx.recv().await {
            info!(status = %update.status, message = %update.message, url = ?update.url, "status");
        }
    });

    handle.start(PermissionToken::new())?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    handle.stop()?;

    let mut state_rx = handle.watch_state();
    let stopped = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if state_rx.borrow_and_update().is_terminal() {
                return;
            }
            if state_rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    if stopped.is_err() {
        warn!("session did not reach a terminal state before shutdown timeout");
    }

    handle.shutdown()?;
    let _ = join.await;
    Ok(())
}
