//! pir-displayd - motion sensor daemon for dashboard displays.
//!
//! Host notifications are exchanged as JSON lines on stdin/stdout, so all
//! logging goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pir_displayd::config::{Config, Settings};
use pir_displayd::controller::DisplayController;
use pir_displayd::daemon::{self, Daemon};
use pir_displayd::host::{self, HostMessage, NotificationSink, StdoutSink};
use pir_displayd::power::PowerBackend;
use pir_displayd::sensor::{GpiomonSensor, PresenceWatcher};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

type LogHandle = reload::Handle<EnvFilter, Registry>;

/// Motion sensor daemon for dashboard displays.
///
/// Turns the display off after the PIR sensor stops reporting motion and back
/// on as soon as motion returns.
#[derive(Parser, Debug)]
#[command(name = "pir-displayd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file. Without one, the config is read from the host on stdin.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log relay writes and display commands instead of executing them.
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging (same as `debug = true` in the config).
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_handle = init_logging(&args.log_level)?;

    info!("pir-displayd v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    let (host_tx, mut host_rx) = mpsc::channel(16);
    host::spawn_stdin_reader(host_tx.clone());
    spawn_signal_handlers(shutdown.clone(), host_tx)?;

    let loaded =
        Config::load_optional(args.config.as_deref()).context("Failed to load configuration")?;
    let mut config = match loaded {
        Some(config) => config,
        None => match daemon::await_config(&mut host_rx, &shutdown).await {
            Some(config) => config,
            None => {
                info!("Exiting before configuration was received");
                return Ok(());
            }
        },
    };

    if args.dry_run {
        config.dry_run = true;
    }
    if args.debug {
        config.debug = true;
    }

    let settings = config.resolve().context("Invalid configuration")?;

    if settings.debug && !matches!(args.log_level.as_str(), "debug" | "trace") {
        log_handle
            .reload(crate_filter("debug")?)
            .context("Failed to enable debug logging")?;
    }

    info!(
        "Configuration loaded (sensor_gpio={}, dry_run={})",
        settings.sensor_gpio, settings.dry_run
    );

    run_daemon(settings, host_rx, shutdown).await
}

/// Initialize logging on stderr with a reloadable level filter.
fn init_logging(level: &str) -> Result<LogHandle> {
    let filter = crate_filter(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .init();

    Ok(handle)
}

fn crate_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(format!("pir_displayd={level}")).context("Invalid log level")
}

/// Cancel `shutdown` on SIGINT/SIGTERM; turn SIGUSR1 into a wake request.
fn spawn_signal_handlers(
    shutdown: CancellationToken,
    wake_tx: mpsc::Sender<HostMessage>,
) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = sigusr1.recv() => {
                    debug!("Received SIGUSR1, waking display");
                    if wake_tx.send(HostMessage::ScreenWakeup).await.is_err() {
                        break;
                    }
                }
            }
        }
        shutdown.cancel();
    });

    Ok(())
}

/// Power up the display, then watch the sensor until shutdown.
async fn run_daemon(
    settings: Settings,
    host_rx: mpsc::Receiver<HostMessage>,
    shutdown: CancellationToken,
) -> Result<()> {
    let sink: Arc<dyn NotificationSink> = Arc::new(StdoutSink);

    let backend = PowerBackend::from_settings(&settings).context("Failed to open relay output")?;
    let controller = DisplayController::start(&settings, backend, sink.clone())
        .context("Failed to power up display")?;

    let sensor = GpiomonSensor::spawn(&settings.gpio_chip, settings.sensor_gpio)
        .await
        .context("Failed to watch PIR sensor")?;
    let watcher = PresenceWatcher::new(sensor, settings.sensor_gpio, sink.clone());

    Daemon::new(watcher, controller, sink).run(host_rx, shutdown).await
}
