//! Display power state machine.
//!
//! Presence and wake events switch the display on immediately. When power
//! saving is enabled, absence arms an off-timer; the display only turns off if
//! the timer fires before motion is seen again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::domain::{DisplayState, Notification};
use crate::host::NotificationSink;
use crate::power::PowerBackend;
use crate::relay::RelayError;

/// Owns the display state and the pending off-timer.
pub struct DisplayController {
    state: DisplayState,
    power_saving: bool,
    off_delay: Duration,
    /// Deadline of the one pending off-timer, if armed.
    off_timer: Option<Instant>,
    /// Last value reported by the sensor, `None` until the first edge.
    last_presence: Option<bool>,
    backend: PowerBackend,
    sink: Arc<dyn NotificationSink>,
}

impl DisplayController {
    /// Initialize the controller and run the backend's power-up sequence.
    ///
    /// Constructing the controller is the one-time configuration step.
    pub fn start(
        settings: &Settings,
        mut backend: PowerBackend,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, RelayError> {
        backend.power_up()?;

        info!(
            "Display controller started (power_saving={}, off_delay={:?}, relay={})",
            settings.power_saving,
            settings.turn_off_after,
            backend.uses_relay()
        );

        Ok(Self {
            state: DisplayState::default(),
            power_saving: settings.power_saving,
            off_delay: settings.turn_off_after,
            off_timer: None,
            last_presence: None,
            backend,
            sink,
        })
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    /// When the pending off-timer fires, if one is armed.
    pub fn off_deadline(&self) -> Option<Instant> {
        self.off_timer
    }

    /// Apply a presence change reported by the sensor.
    pub fn handle_presence(&mut self, present: bool) {
        self.last_presence = Some(present);

        if present {
            self.cancel_off_timer();
            self.activate();
        } else if self.power_saving {
            self.schedule_off_timer();
        }
    }

    /// Apply an external wake request.
    ///
    /// A pending off-timer is replaced so the woken display gets a full delay.
    pub fn handle_wake(&mut self) {
        self.cancel_off_timer();
        self.activate();

        if self.power_saving && self.last_presence == Some(false) {
            self.schedule_off_timer();
        }
    }

    /// The off-timer deadline was reached.
    pub fn fire_off_timer(&mut self) {
        if self.off_timer.take().is_none() {
            return;
        }
        self.deactivate();
    }

    fn schedule_off_timer(&mut self) {
        self.cancel_off_timer();

        // A delay past the clock's range never elapses.
        let Some(deadline) = Instant::now().checked_add(self.off_delay) else {
            debug!("Off delay {:?} is out of range, display stays ON", self.off_delay);
            return;
        };

        info!("Turning display OFF in {:?}", self.off_delay);
        self.off_timer = Some(deadline);
    }

    fn cancel_off_timer(&mut self) {
        if self.off_timer.take().is_some() {
            debug!("Cancelled pending display OFF");
        }
    }

    fn activate(&mut self) {
        if self.state.is_on() {
            debug!("Not turning display ON, it's already ON");
            return;
        }

        if let Err(e) = self.backend.turn_on() {
            error!("Failed to turn display ON: {}", e);
            return;
        }
        self.set_state(DisplayState::On);
    }

    fn deactivate(&mut self) {
        if !self.state.is_on() {
            debug!("Not turning display OFF, it's already OFF");
            return;
        }

        if let Err(e) = self.backend.turn_off() {
            error!("Failed to turn display OFF: {}", e);
            return;
        }
        self.set_state(DisplayState::Off);
    }

    fn set_state(&mut self, state: DisplayState) {
        self.state = state;
        info!("Display is now {}", state.as_str());
        self.sink.notify(Notification::ScreenState(state.is_on()));
    }
}

/// Resolve at `deadline`, or never when no off-timer is armed.
pub async fn off_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
