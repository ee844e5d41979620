//! Display power backends.
//!
//! The backend is picked once from the settings: a relay when one is wired,
//! otherwise the external display commands.

use tracing::{debug, info};

use crate::command::{CommandRunner, DisplayCommands, ShellRunner};
use crate::config::Settings;
use crate::domain::RelayLevels;
use crate::relay::{DryRunRelay, RelayError, RelayOutput, SysfsRelay};

enum Driver {
    Relay {
        output: Box<dyn RelayOutput>,
        gpio: u32,
        levels: RelayLevels,
    },
    Command,
}

/// Side-effect port used by the display controller.
pub struct PowerBackend {
    driver: Driver,
    runner: Box<dyn CommandRunner>,
    commands: DisplayCommands,
}

impl PowerBackend {
    /// Drive the display through a relay.
    pub fn relay(
        output: Box<dyn RelayOutput>,
        gpio: u32,
        levels: RelayLevels,
        runner: Box<dyn CommandRunner>,
        commands: DisplayCommands,
    ) -> Self {
        Self {
            driver: Driver::Relay {
                output,
                gpio,
                levels,
            },
            runner,
            commands,
        }
    }

    /// Drive the display through the on/off shell commands.
    pub fn command(runner: Box<dyn CommandRunner>, commands: DisplayCommands) -> Self {
        Self {
            driver: Driver::Command,
            runner,
            commands,
        }
    }

    /// Build the production backend for `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, RelayError> {
        let runner = Box::new(ShellRunner::new(settings.dry_run));
        let commands = DisplayCommands::from_settings(settings);

        let Some(relay) = settings.relay else {
            info!("No relay configured, using display commands");
            return Ok(Self::command(runner, commands));
        };

        let output: Box<dyn RelayOutput> = if settings.dry_run {
            Box::new(DryRunRelay::new(relay.gpio))
        } else {
            Box::new(SysfsRelay::open(&settings.gpio_chip, relay.gpio)?)
        };

        Ok(Self::relay(output, relay.gpio, relay.levels, runner, commands))
    }

    pub fn uses_relay(&self) -> bool {
        matches!(self.driver, Driver::Relay { .. })
    }

    /// Startup sequence: with a relay, power it on and enable the display output once.
    pub fn power_up(&mut self) -> Result<(), RelayError> {
        if let Driver::Relay { .. } = self.driver {
            self.turn_on()?;
            self.display_on();
        }
        Ok(())
    }

    pub fn turn_on(&mut self) -> Result<(), RelayError> {
        match &mut self.driver {
            Driver::Relay {
                output,
                gpio,
                levels,
            } => {
                debug!("Executing Relay Gpio #{} ON", gpio);
                output.write(levels.on())
            }
            Driver::Command => {
                self.display_on();
                Ok(())
            }
        }
    }

    pub fn turn_off(&mut self) -> Result<(), RelayError> {
        match &mut self.driver {
            Driver::Relay {
                output,
                gpio,
                levels,
            } => {
                debug!("Executing Relay Gpio #{} OFF", gpio);
                output.write(levels.off())
            }
            Driver::Command => {
                debug!("Executing display OFF command");
                self.runner.run_detached(&self.commands.off);
                Ok(())
            }
        }
    }

    fn display_on(&self) {
        debug!("Executing display ON command");
        self.runner.run_detached(&self.commands.on);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::Level;
    use std::sync::{Arc, Mutex};

    /// Relay that records every level written.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingRelay {
        pub writes: Arc<Mutex<Vec<Level>>>,
        pub fail: Arc<Mutex<bool>>,
    }

    impl RelayOutput for RecordingRelay {
        fn write(&mut self, level: Level) -> Result<(), RelayError> {
            if *self.fail.lock().unwrap() {
                return Err(RelayError::Io {
                    gpio: 17,
                    source: std::io::Error::other("write failed"),
                });
            }
            self.writes.lock().unwrap().push(level);
            Ok(())
        }
    }

    pub fn commands() -> DisplayCommands {
        DisplayCommands {
            on: "display-on".to_string(),
            off: "display-off".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingRelay, commands};
    use super::*;
    use crate::command::testing::RecordingRunner;
    use crate::config::{Config, RelayGpio};
    use crate::domain::Level;

    fn relay_backend(on: Level) -> (PowerBackend, RecordingRelay, RecordingRunner) {
        let relay = RecordingRelay::default();
        let runner = RecordingRunner::default();
        let backend = PowerBackend::relay(
            Box::new(relay.clone()),
            17,
            RelayLevels::from_on_state(on),
            Box::new(runner.clone()),
            commands(),
        );
        (backend, relay, runner)
    }

    #[test]
    fn test_relay_power_up_writes_on_and_runs_on_command() {
        let (mut backend, relay, runner) = relay_backend(Level::High);

        backend.power_up().unwrap();

        assert_eq!(*relay.writes.lock().unwrap(), vec![Level::High]);
        assert_eq!(*runner.commands.lock().unwrap(), vec!["display-on"]);
    }

    #[test]
    fn test_relay_uses_inverted_polarity() {
        let (mut backend, relay, runner) = relay_backend(Level::Low);

        backend.turn_off().unwrap();
        backend.turn_on().unwrap();

        assert_eq!(*relay.writes.lock().unwrap(), vec![Level::High, Level::Low]);
        assert!(runner.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_command_backend() {
        let runner = RecordingRunner::default();
        let mut backend = PowerBackend::command(Box::new(runner.clone()), commands());

        backend.power_up().unwrap();
        assert!(runner.commands.lock().unwrap().is_empty());

        backend.turn_off().unwrap();
        backend.turn_on().unwrap();
        assert_eq!(
            *runner.commands.lock().unwrap(),
            vec!["display-off", "display-on"]
        );
        assert!(!backend.uses_relay());
    }

    #[test]
    fn test_from_settings_dry_run_relay() {
        let config = Config {
            sensor_gpio: Some(25),
            relay_gpio: RelayGpio::Line(17),
            dry_run: true,
            ..Default::default()
        };
        let backend = PowerBackend::from_settings(&config.resolve().unwrap()).unwrap();
        assert!(backend.uses_relay());
    }
}
