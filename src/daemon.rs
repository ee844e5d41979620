//! Daemon event loop.
//!
//! Sensor edges, off-timer deadlines and host messages are handled one at a
//! time on a single task, so the controller needs no locking.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::controller::{DisplayController, off_timer};
use crate::domain::Notification;
use crate::host::{HostMessage, NotificationSink};
use crate::sensor::{PresenceWatcher, SensorInput};

/// Wait for the host's first `CONFIG` message.
///
/// Returns `None` on shutdown or when the host channel closes first.
pub async fn await_config(
    inbound: &mut mpsc::Receiver<HostMessage>,
    shutdown: &CancellationToken,
) -> Option<Config> {
    info!("No config file found, waiting for CONFIG from host...");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return None,
            message = inbound.recv() => match message {
                Some(HostMessage::Config(config)) => return Some(*config),
                Some(HostMessage::ScreenWakeup) => {
                    debug!("Ignoring SCREEN_WAKEUP before configuration");
                }
                None => return None,
            },
        }
    }
}

/// A configured daemon: one watcher feeding one controller.
pub struct Daemon<S> {
    watcher: PresenceWatcher<S>,
    controller: DisplayController,
    sink: Arc<dyn NotificationSink>,
}

impl<S: SensorInput> Daemon<S> {
    pub fn new(
        watcher: PresenceWatcher<S>,
        controller: DisplayController,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            watcher,
            controller,
            sink,
        }
    }

    /// Run until `shutdown` is cancelled or the sensor goes away.
    ///
    /// The sensor is released before returning either way.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<HostMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let Self {
            mut watcher,
            mut controller,
            sink,
        } = self;
        let mut inbound_open = true;

        info!("Daemon started, waiting for motion...");

        let result = loop {
            let deadline = controller.off_deadline();

            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Shutting down");
                    break Ok(());
                }

                presence = watcher.next_presence() => match presence {
                    Ok(present) => controller.handle_presence(present),
                    Err(e) => break Err(anyhow::Error::new(e).context("PIR sensor watch ended")),
                },

                () = off_timer(deadline) => controller.fire_off_timer(),

                message = inbound.recv(), if inbound_open => match message {
                    Some(HostMessage::ScreenWakeup) => {
                        sink.notify(Notification::ScreenWakeup);
                        controller.handle_wake();
                    }
                    Some(HostMessage::Config(_)) => {
                        debug!("Already configured, ignoring CONFIG");
                    }
                    None => inbound_open = false,
                },
            }
        };

        watcher.release().await;
        result
    }
}
