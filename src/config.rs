//! Configuration loading, defaults and validation for pir-displayd.
//!
//! Option names follow the dashboard host's module config (`sensorGpio`,
//! `turnOffAfterSeconds`, ...) so the same table can be used in a TOML file or
//! delivered as the payload of a `CONFIG` host message.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::domain::{Level, RelayLevels};

/// Turns the display on and resets the virtual terminal so the dashboard repaints.
pub const DEFAULT_DISPLAY_ON_COMMAND: &str =
    "/opt/vc/bin/tvservice --preferred && sudo chvt 6 && sudo chvt 7";

/// Cuts the display output.
pub const DEFAULT_DISPLAY_OFF_COMMAND: &str = "/opt/vc/bin/tvservice -o";

/// Relay output setting: a GPIO line number, or `false` when no relay is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayGpio {
    Line(u32),
    Enabled(bool),
}

impl Default for RelayGpio {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

/// Raw configuration as written by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Line offset of the PIR sensor on `gpio_chip` (BCM numbering, not the
    /// header pin). Required.
    pub sensor_gpio: Option<u32>,

    /// Line offset of the display relay on `gpio_chip` (default: disabled).
    pub relay_gpio: RelayGpio,

    /// Turn the display off after motion stops (default: true).
    pub power_saving: bool,

    /// Relay level that powers the display, 0 or 1 (default: 1).
    pub relay_on_state: u8,

    /// Accepted for compatibility; always derived from `relay_on_state`.
    pub relay_off_state: Option<u8>,

    /// Delay between motion stopping and the display turning off, fractions
    /// allowed (default: 30).
    pub turn_off_after_seconds: f64,

    /// Emit debug-only log messages (default: false).
    pub debug: bool,

    /// GPIO chip watched by `gpiomon` (default: "gpiochip0").
    pub gpio_chip: String,

    /// Shell command that powers the display on.
    pub display_on_command: String,

    /// Shell command that powers the display off.
    pub display_off_command: String,

    /// Log relay writes and display commands instead of executing them.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_gpio: None,
            relay_gpio: RelayGpio::default(),
            power_saving: true,
            relay_on_state: 1,
            relay_off_state: None,
            turn_off_after_seconds: 30.0,
            debug: false,
            gpio_chip: "gpiochip0".to_string(),
            display_on_command: DEFAULT_DISPLAY_ON_COMMAND.to_string(),
            display_off_command: DEFAULT_DISPLAY_OFF_COMMAND.to_string(),
            dry_run: false,
        }
    }
}

/// Fatal configuration problems, reported once at startup.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("sensorGpio config item not specified")]
    MissingSensorGpio,

    #[error("relayGpio is enabled but does not name a GPIO line")]
    MissingRelayLine,

    #[error("relayOnState must be 0 or 1, got {0}")]
    InvalidRelayOnState(u8),

    #[error("turnOffAfterSeconds must be a non-negative number of seconds, got {0}")]
    InvalidOffDelay(f64),
}

/// Relay wiring after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub gpio: u32,
    pub levels: RelayLevels,
}

/// Validated, immutable settings the daemon runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sensor_gpio: u32,
    pub relay: Option<RelaySettings>,
    pub power_saving: bool,
    pub turn_off_after: Duration,
    pub debug: bool,
    pub gpio_chip: String,
    pub display_on_command: String,
    pub display_off_command: String,
    pub dry_run: bool,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from `path`, or from the default path if it exists.
    ///
    /// Returns `None` when no file is available; the daemon then waits for the
    /// host to send its `CONFIG` message.
    pub fn load_optional(path: Option<&Path>) -> Result<Option<Self>> {
        if let Some(p) = path {
            return Self::load(p).map(Some);
        }

        if let Some(default_path) = default_path()
            && default_path.exists()
        {
            return Self::load(&default_path).map(Some);
        }

        Ok(None)
    }

    /// Validate and normalize into [`Settings`].
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let sensor_gpio = self.sensor_gpio.ok_or(ConfigError::MissingSensorGpio)?;

        let relay = match self.relay_gpio {
            RelayGpio::Enabled(false) => None,
            RelayGpio::Enabled(true) => return Err(ConfigError::MissingRelayLine),
            RelayGpio::Line(gpio) => {
                let on = Level::from_bit(self.relay_on_state)
                    .ok_or(ConfigError::InvalidRelayOnState(self.relay_on_state))?;
                let levels = RelayLevels::from_on_state(on);

                if let Some(off) = self.relay_off_state
                    && off != levels.off().as_u8()
                {
                    warn!(
                        "relayOffState={} ignored, using {} (complement of relayOnState)",
                        off,
                        levels.off().as_u8()
                    );
                }

                Some(RelaySettings { gpio, levels })
            }
        };

        let turn_off_after = Duration::try_from_secs_f64(self.turn_off_after_seconds)
            .map_err(|_| ConfigError::InvalidOffDelay(self.turn_off_after_seconds))?;

        Ok(Settings {
            sensor_gpio,
            relay,
            power_saving: self.power_saving,
            turn_off_after,
            debug: self.debug,
            gpio_chip: self.gpio_chip.clone(),
            display_on_command: self.display_on_command.clone(),
            display_off_command: self.display_off_command.clone(),
            dry_run: self.dry_run,
        })
    }
}

/// `$XDG_CONFIG_HOME/pir-displayd/config.toml`.
fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pir-displayd").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_sensor() -> Config {
        Config {
            sensor_gpio: Some(25),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sensor_gpio, None);
        assert_eq!(config.relay_gpio, RelayGpio::Enabled(false));
        assert!(config.power_saving);
        assert_eq!(config.relay_on_state, 1);
        assert!((config.turn_off_after_seconds - 30.0).abs() < f64::EPSILON);
        assert!(!config.debug);
        assert_eq!(config.gpio_chip, "gpiochip0");
    }

    #[test]
    fn test_missing_sensor_is_fatal() {
        let err = Config::default().resolve().unwrap_err();
        assert_eq!(err, ConfigError::MissingSensorGpio);
    }

    #[test]
    fn test_resolve_without_relay() {
        let settings = with_sensor().resolve().unwrap();
        assert_eq!(settings.sensor_gpio, 25);
        assert_eq!(settings.relay, None);
        assert_eq!(settings.turn_off_after, Duration::from_secs(30));
    }

    #[test]
    fn test_relay_polarity_is_complementary() {
        for bit in [0, 1] {
            let config = Config {
                relay_gpio: RelayGpio::Line(17),
                relay_on_state: bit,
                ..with_sensor()
            };
            let relay = config.resolve().unwrap().relay.unwrap();
            assert_eq!(relay.gpio, 17);
            assert_eq!(relay.levels.on().as_u8(), bit);
            assert_eq!(relay.levels.off().as_u8(), 1 - bit);
        }
    }

    #[test]
    fn test_conflicting_relay_off_state_is_overridden() {
        let config = Config {
            relay_gpio: RelayGpio::Line(17),
            relay_on_state: 1,
            relay_off_state: Some(1),
            ..with_sensor()
        };
        let relay = config.resolve().unwrap().relay.unwrap();
        assert_eq!(relay.levels.off(), Level::Low);
    }

    #[test]
    fn test_relay_without_line_is_fatal() {
        let config = Config {
            relay_gpio: RelayGpio::Enabled(true),
            ..with_sensor()
        };
        assert_eq!(config.resolve().unwrap_err(), ConfigError::MissingRelayLine);
    }

    #[test]
    fn test_invalid_relay_polarity_is_fatal() {
        let config = Config {
            relay_gpio: RelayGpio::Line(17),
            relay_on_state: 3,
            ..with_sensor()
        };
        assert_eq!(
            config.resolve().unwrap_err(),
            ConfigError::InvalidRelayOnState(3)
        );
    }

    #[test]
    fn test_relay_line_zero_is_a_real_line() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "sensorGpio": 25,
            "relayGpio": 0
        }))
        .unwrap();
        assert_eq!(config.relay_gpio, RelayGpio::Line(0));
        assert_eq!(config.resolve().unwrap().relay.unwrap().gpio, 0);
    }

    #[test]
    fn test_fractional_off_delay() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "sensorGpio": 25,
            "turnOffAfterSeconds": 2.5
        }))
        .unwrap();
        let settings = config.resolve().unwrap();
        assert_eq!(settings.turn_off_after, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_off_delay_is_fatal() {
        for seconds in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            let config = Config {
                turn_off_after_seconds: seconds,
                ..with_sensor()
            };
            assert!(matches!(
                config.resolve(),
                Err(ConfigError::InvalidOffDelay(_))
            ));
        }
    }

    #[test]
    fn test_polarity_ignored_without_relay() {
        let config = Config {
            relay_on_state: 3,
            ..with_sensor()
        };
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            sensorGpio = 4
            relayGpio = 17
            powerSaving = false
            relayOnState = 0
            turnOffAfterSeconds = 5
            debug = true
            gpioChip = "gpiochip1"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sensor_gpio, Some(4));
        assert_eq!(config.relay_gpio, RelayGpio::Line(17));
        assert!(!config.power_saving);
        assert_eq!(config.relay_on_state, 0);
        assert!((config.turn_off_after_seconds - 5.0).abs() < f64::EPSILON);
        assert!(config.debug);
        assert_eq!(config.gpio_chip, "gpiochip1");
        assert_eq!(config.display_off_command, DEFAULT_DISPLAY_OFF_COMMAND);
    }

    #[test]
    fn test_parse_relay_disabled_flag() {
        let config: Config = toml::from_str("sensorGpio = 25\nrelayGpio = false\n").unwrap();
        assert_eq!(config.relay_gpio, RelayGpio::Enabled(false));
        assert_eq!(config.resolve().unwrap().relay, None);
    }

    #[test]
    fn test_parse_json_payload() {
        let payload = serde_json::json!({
            "sensorGpio": 25,
            "relayGpio": false,
            "powerSaving": true,
            "relayOnState": 1,
            "relayOffState": 0,
            "turnOffAfterSeconds": 30,
            "debug": false
        });

        let config: Config = serde_json::from_value(payload).unwrap();
        assert_eq!(config.sensor_gpio, Some(25));
        assert_eq!(config.relay_off_state, Some(0));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sensorGpio = 23").unwrap();
        writeln!(file, "turnOffAfterSeconds = 60").unwrap();

        let config = Config::load_optional(Some(file.path())).unwrap().unwrap();
        assert_eq!(config.sensor_gpio, Some(23));
        assert!((config.turn_off_after_seconds - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("nope.toml"));
        assert!(result.is_err());
    }
}
