//! libgpiod `gpiomon` edge source.
//!
//! Runs `gpiomon` on one line and reads one edge event per stdout line. The
//! chip argument moved behind `-c` in libgpiod v2, so `gpiomon --version` is
//! checked once before starting the watch.

use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, trace, warn};

use super::{SensorError, SensorInput};

const GPIOMON_BIN: &str = "gpiomon";

/// Matches the edge kind in both libgpiod v1 (`RISING EDGE`) and v2 (`rising`)
/// output.
static EDGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(rising|falling)\b").expect("edge regex is valid")
});

/// Matches the major version in `gpiomon (libgpiod) v2.1.3`.
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bv(\d+)\.").expect("version regex is valid"));

/// Command-line dialect of the installed libgpiod tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolVersion {
    /// `gpiomon <chip> <offset>`
    V1,
    /// `gpiomon -c <chip> <offset>`
    V2,
}

/// Sensor backed by a long-running `gpiomon` child process.
pub struct GpiomonSensor {
    child: Child,
    lines: FramedRead<ChildStdout, LinesCodec>,
}

impl GpiomonSensor {
    /// Start watching both edges of `line` on `chip`.
    pub async fn spawn(chip: &str, line: u32) -> Result<Self, SensorError> {
        let version = detect_version().await;
        info!(
            "Starting {} ({:?}) on {} line {}",
            GPIOMON_BIN, version, chip, line
        );

        let mut child = Command::new(GPIOMON_BIN)
            .args(build_args(version, chip, line))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SensorError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SensorError::Spawn("gpiomon stdout not captured".to_string()))?;

        Ok(Self {
            child,
            lines: FramedRead::new(stdout, LinesCodec::new()),
        })
    }
}

#[async_trait]
impl SensorInput for GpiomonSensor {
    async fn next_edge(&mut self) -> Result<bool, SensorError> {
        match self.lines.next().await {
            Some(Ok(line)) => {
                trace!("Received line: {}", line.trim());
                parse_edge_line(&line)
            }
            Some(Err(e)) => Err(SensorError::Read(e.to_string())),
            None => Err(SensorError::Closed),
        }
    }

    async fn release(&mut self) -> Result<(), SensorError> {
        debug!("Stopping {}", GPIOMON_BIN);
        self.child
            .kill()
            .await
            .map_err(|e| SensorError::Release(e.to_string()))
    }
}

/// Ask `gpiomon --version` which dialect it speaks, assuming v1 if unsure.
async fn detect_version() -> ToolVersion {
    let output = match Command::new(GPIOMON_BIN)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to run {} --version: {}", GPIOMON_BIN, e);
            return ToolVersion::V1;
        }
    };

    let text = String::from_utf8_lossy(&output.stdout);
    parse_version(&text).unwrap_or_else(|| {
        warn!(
            "Unrecognized {} version {:?}, assuming libgpiod v1",
            GPIOMON_BIN,
            text.trim()
        );
        ToolVersion::V1
    })
}

/// Parse the first line of `gpiomon --version`.
fn parse_version(text: &str) -> Option<ToolVersion> {
    let caps = VERSION_RE.captures(text)?;
    match caps[1].parse::<u32>().ok()? {
        1 => Some(ToolVersion::V1),
        n if n >= 2 => Some(ToolVersion::V2),
        _ => None,
    }
}

/// Arguments that watch both edges of `line` on `chip`.
fn build_args(version: ToolVersion, chip: &str, line: u32) -> Vec<String> {
    match version {
        ToolVersion::V1 => vec![chip.to_string(), line.to_string()],
        ToolVersion::V2 => vec!["-c".to_string(), chip.to_string(), line.to_string()],
    }
}

/// Parse one `gpiomon` output line into the new line value.
fn parse_edge_line(line: &str) -> Result<bool, SensorError> {
    let Some(caps) = EDGE_RE.captures(line) else {
        return Err(SensorError::Parse(line.trim().to_string()));
    };

    Ok(caps[1].eq_ignore_ascii_case("rising"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1_rising() {
        let line = "event:  RISING EDGE offset: 25 timestamp: [1700000000.123456789]";
        assert!(parse_edge_line(line).unwrap());
    }

    #[test]
    fn test_parse_v1_falling() {
        let line = "event: FALLING EDGE offset: 25 timestamp: [1700000003.000000001]";
        assert!(!parse_edge_line(line).unwrap());
    }

    #[test]
    fn test_parse_v2_format() {
        assert!(parse_edge_line("1700000000.123456789\trising\t\"GPIO25\"").unwrap());
        assert!(!parse_edge_line("1700000001.000000000\tfalling\t\"GPIO25\"").unwrap());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("gpiomon (libgpiod) v1.6.3\nCopyright (C) 2017-2018 Bartosz Golaszewski"),
            Some(ToolVersion::V1)
        );
        assert_eq!(
            parse_version("gpiomon (libgpiod) v2.1.3\nCopyright (C) 2017-2023 Bartosz Golaszewski"),
            Some(ToolVersion::V2)
        );
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("gpiomon (libgpiod) v0.3.1"), None);
    }

    #[test]
    fn test_build_args_v1() {
        assert_eq!(build_args(ToolVersion::V1, "gpiochip0", 25), vec!["gpiochip0", "25"]);
    }

    #[test]
    fn test_build_args_v2_names_chip_with_flag() {
        assert_eq!(
            build_args(ToolVersion::V2, "gpiochip0", 25),
            vec!["-c", "gpiochip0", "25"]
        );
    }

    #[test]
    fn test_parse_unrecognized_line() {
        let result = parse_edge_line("gpiomon: unable to request lines");
        assert!(matches!(result, Err(SensorError::Parse(_))));
    }

    #[test]
    fn test_parse_ignores_partial_words() {
        assert!(parse_edge_line("uprising").is_err());
    }
}
