//! Fire-and-forget display power commands.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Settings;

/// Shell commands that switch the display output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayCommands {
    pub on: String,
    pub off: String,
}

impl DisplayCommands {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            on: settings.display_on_command.clone(),
            off: settings.display_off_command.clone(),
        }
    }
}

/// Starts a shell command without waiting for it.
///
/// Exit status is never observed; spawn failures are only logged.
pub trait CommandRunner: Send {
    fn run_detached(&self, command: &str);
}

/// Runs commands through `sh -c`.
#[derive(Debug, Default)]
pub struct ShellRunner {
    dry_run: bool,
}

impl ShellRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for ShellRunner {
    fn run_detached(&self, command: &str) {
        if self.dry_run {
            info!("[DRY RUN] Would execute: {}", command);
            return;
        }

        debug!("Executing: {}", command);

        // The child handle is dropped right away; tokio reaps it in the background.
        if let Err(e) = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            warn!("Failed to spawn display command: {}", e);
        }
    }
}
