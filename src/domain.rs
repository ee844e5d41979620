//! Domain types shared by the watcher, the controller and the host channel.

use serde::Serialize;

/// Binary logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Map a configured `0`/`1` to a level. Any other value is rejected.
    pub fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0 => Some(Self::Low),
            1 => Some(Self::High),
            _ => None,
        }
    }

    /// Numeric value as written to the GPIO `value` file.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    /// The opposite level.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// Relay levels for "display on" and "display off".
///
/// Only constructible from the "on" level, so the pair is always complementary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayLevels {
    on: Level,
}

impl RelayLevels {
    /// Derive both levels from the configured "on" polarity.
    pub fn from_on_state(on: Level) -> Self {
        Self { on }
    }

    pub fn on(self) -> Level {
        self.on
    }

    pub fn off(self) -> Level {
        self.on.inverse()
    }
}

impl Default for RelayLevels {
    fn default() -> Self {
        Self::from_on_state(Level::High)
    }
}

/// Power state of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayState {
    /// Displays are assumed to be powered at boot.
    #[default]
    On,
    Off,
}

impl DisplayState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

/// Notification reported upward to the dashboard host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notification", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// The sensor reported motion (`true`) or its absence (`false`).
    UserPresence(bool),
    /// The display actually changed power state.
    ScreenState(bool),
    /// An external wake request, forwarded to the rest of the dashboard.
    ScreenWakeup,
}
