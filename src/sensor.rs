//! Presence detection from a PIR motion sensor.
//!
//! [`SensorInput`] abstracts the GPIO edge source; [`PresenceWatcher`] turns its
//! edges into presence events and forwards each one to the host.

mod gpiomon;

use std::sync::Arc;

use async_trait::async_trait;
pub use gpiomon::GpiomonSensor;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::Notification;
use crate::host::NotificationSink;

/// Source of sensor edge transitions.
#[async_trait]
pub trait SensorInput: Send {
    /// Wait for the next edge and return the new line value.
    ///
    /// `true` is a rising edge (motion detected), `false` a falling edge.
    async fn next_edge(&mut self) -> Result<bool, SensorError>;

    /// Release the underlying GPIO resource.
    async fn release(&mut self) -> Result<(), SensorError>;
}

/// Errors that can occur while watching the sensor.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to start edge watcher: {0}")]
    Spawn(String),

    #[error("Failed to read sensor edge: {0}")]
    Read(String),

    #[error("Unrecognized edge event: {0}")]
    Parse(String),

    #[error("Sensor edge stream closed")]
    Closed,

    #[error("Failed to release sensor: {0}")]
    Release(String),
}

/// Watches a sensor and yields presence events.
///
/// Read failures are logged and skipped. The watcher cannot be restarted once
/// released.
pub struct PresenceWatcher<S> {
    sensor: S,
    gpio: u32,
    sink: Arc<dyn NotificationSink>,
}

impl<S: SensorInput> PresenceWatcher<S> {
    pub fn new(sensor: S, gpio: u32, sink: Arc<dyn NotificationSink>) -> Self {
        info!("Watching on GPIO #{} ...", gpio);
        Self { sensor, gpio, sink }
    }

    /// Wait for the next presence change.
    ///
    /// Only returns an error when the edge source is gone for good.
    pub async fn next_presence(&mut self) -> Result<bool, SensorError> {
        loop {
            match self.sensor.next_edge().await {
                Ok(present) => {
                    if present {
                        debug!("Motion detected");
                    } else {
                        debug!("Motion no longer detected");
                    }
                    self.sink.notify(Notification::UserPresence(present));
                    return Ok(present);
                }
                Err(SensorError::Closed) => return Err(SensorError::Closed),
                Err(e) => warn!("{}", e),
            }
        }
    }

    /// Release the sensor, consuming the watcher.
    pub async fn release(mut self) {
        debug!("Releasing PIR GPIO #{}", self.gpio);
        if let Err(e) = self.sensor.release().await {
            warn!("Failed to release PIR GPIO #{}: {}", self.gpio, e);
        }
    }
}
