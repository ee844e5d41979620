//! Line-delimited JSON channel to the dashboard host.
//!
//! Every message is an object `{"notification": TAG, "payload": VALUE}`. The
//! host writes `CONFIG` and `SCREEN_WAKEUP` to our stdin; we write
//! `USER_PRESENCE`, `SCREEN_STATE` and `SCREEN_WAKEUP` to stdout.

use std::io::Write;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::Notification;

/// Receiver of notifications reported upward to the host.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes one JSON line per notification to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn notify(&self, notification: Notification) {
        debug!("Notifying host: {:?}", notification);

        let line = match serde_json::to_string(&notification) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode notification: {}", e);
                return;
            }
        };

        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!("Failed to write notification: {}", e);
        }
    }
}

/// Message received from the host.
#[derive(Debug, Clone)]
pub enum HostMessage {
    /// Module configuration; only the first one is applied.
    Config(Box<Config>),
    /// Another dashboard module asked for the display to wake up.
    ScreenWakeup,
}

#[derive(Deserialize)]
struct RawMessage {
    notification: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl HostMessage {
    /// Parse one line. Unknown notifications yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let raw: RawMessage = serde_json::from_str(line)?;

        match raw.notification.as_str() {
            "CONFIG" => {
                let config: Config = serde_json::from_value(raw.payload)?;
                Ok(Some(Self::Config(Box::new(config))))
            }
            "SCREEN_WAKEUP" => Ok(Some(Self::ScreenWakeup)),
            other => {
                debug!("Ignoring host notification: {}", other);
                Ok(None)
            }
        }
    }
}

/// Forward parsed host messages from `reader` into `tx` until input ends.
pub fn spawn_reader<R>(reader: R, tx: mpsc::Sender<HostMessage>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(reader, LinesCodec::new());

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read host input: {}", e);
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match HostMessage::parse(&line) {
                Ok(Some(message)) => {
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Malformed host message: {}", e),
            }
        }

        info!("Host input closed");
    })
}

/// Read host messages from this process's stdin.
pub fn spawn_stdin_reader(tx: mpsc::Sender<HostMessage>) -> JoinHandle<()> {
    spawn_reader(tokio::io::stdin(), tx)
}
