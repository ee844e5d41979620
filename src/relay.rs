//! Relay output through the kernel sysfs GPIO interface.
//!
//! The relay is configured as a line offset on a GPIO chip, the same way the
//! sensor is. The legacy sysfs interface numbers lines globally, so the
//! offset is added to the chip's sysfs base (512 for the SoC chip on
//! Raspberry Pi kernels 6.6 and later, 0 before that).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::Level;

const SYSFS_ROOT: &str = "/sys";

/// Synchronous, write-only GPIO line driving the display relay.
pub trait RelayOutput: Send {
    fn write(&mut self, level: Level) -> Result<(), RelayError>;
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("GPIO #{gpio}: {source}")]
    Io {
        gpio: u32,
        #[source]
        source: io::Error,
    },

    #[error("No sysfs GPIO base found for {chip}")]
    UnknownChip { chip: String },
}

/// Relay line exported under `/sys/class/gpio`.
///
/// Unexports the line on drop if this process exported it.
#[derive(Debug)]
pub struct SysfsRelay {
    class_root: PathBuf,
    /// Offset on the chip, as configured.
    line: u32,
    /// Global sysfs number of the line.
    global: u32,
    exported: bool,
}

impl SysfsRelay {
    /// Export `line` of `chip` (if needed) and configure it as an output.
    pub fn open(chip: &str, line: u32) -> Result<Self, RelayError> {
        Self::open_at(Path::new(SYSFS_ROOT), chip, line)
    }

    fn open_at(sys_root: &Path, chip: &str, line: u32) -> Result<Self, RelayError> {
        let base = chip_base(sys_root, chip)?;
        let io_err = |source| RelayError::Io { gpio: line, source };
        let global = base.checked_add(line).ok_or_else(|| {
            io_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "line offset out of range",
            ))
        })?;
        let class_root = sys_root.join("class/gpio");
        let line_dir = class_root.join(format!("gpio{global}"));

        let exported = if line_dir.exists() {
            false
        } else {
            debug!("Exporting GPIO #{} as sysfs gpio{}", line, global);
            fs::write(class_root.join("export"), global.to_string()).map_err(io_err)?;
            true
        };

        let relay = Self {
            class_root,
            line,
            global,
            exported,
        };
        fs::write(line_dir.join("direction"), "out").map_err(io_err)?;

        info!("Relay ready on {} GPIO #{} (sysfs gpio{})", chip, line, global);
        Ok(relay)
    }

    fn value_path(&self) -> PathBuf {
        self.class_root
            .join(format!("gpio{}", self.global))
            .join("value")
    }
}

/// Find the sysfs base number of `chip` (`gpiochip0` or `/dev/gpiochip0`).
///
/// The character device and its legacy `gpiochipNNN` node share a parent
/// device, which holds the latter under `gpio/`.
fn chip_base(sys_root: &Path, chip: &str) -> Result<u32, RelayError> {
    let unknown = || RelayError::UnknownChip {
        chip: chip.to_string(),
    };

    let name = Path::new(chip).file_name().ok_or_else(unknown)?;
    let device = fs::canonicalize(sys_root.join("bus/gpio/devices").join(name))
        .map_err(|_| unknown())?;

    let mut candidates = vec![device.join("gpio")];
    if let Some(parent) = device.parent() {
        candidates.push(parent.join("gpio"));
    }

    for dir in candidates {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with("gpiochip") {
                continue;
            }
            let base = fs::read_to_string(entry.path().join("base"))
                .ok()
                .and_then(|base| base.trim().parse::<u32>().ok());
            if let Some(base) = base {
                debug!("Sysfs base of {} is {}", chip, base);
                return Ok(base);
            }
        }
    }

    Err(unknown())
}

impl RelayOutput for SysfsRelay {
    fn write(&mut self, level: Level) -> Result<(), RelayError> {
        fs::write(self.value_path(), level.as_u8().to_string()).map_err(|source| {
            RelayError::Io {
                gpio: self.line,
                source,
            }
        })
    }
}

impl Drop for SysfsRelay {
    fn drop(&mut self) {
        if !self.exported {
            return;
        }

        debug!("Unexporting relay GPIO #{}", self.line);
        if let Err(e) = fs::write(self.class_root.join("unexport"), self.global.to_string()) {
            warn!("Failed to unexport GPIO #{}: {}", self.line, e);
        }
    }
}

/// Relay stand-in for dry runs: logs every write.
#[derive(Debug)]
pub struct DryRunRelay {
    gpio: u32,
}

impl DryRunRelay {
    pub fn new(gpio: u32) -> Self {
        Self { gpio }
    }
}

impl RelayOutput for DryRunRelay {
    fn write(&mut self, level: Level) -> Result<(), RelayError> {
        info!("[DRY RUN] Would write {} to GPIO #{}", level.as_u8(), self.gpio);
        Ok(())
    }
}
