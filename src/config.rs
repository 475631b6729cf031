//! Host configuration for the flasher
//!
//! Settings cover the handful of host paths and tunables the flasher needs
//! (Klipper tree, katapult checkout, CAN interface, Moonraker endpoint).
//! A YAML file is optional; every field has a sensible printer-host default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FlashError, Result};

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"))
}

fn default_printer_data_dir() -> PathBuf {
    home().join("printer_data")
}

fn default_klippy_log() -> PathBuf {
    default_printer_data_dir().join("logs/klippy.log")
}

fn default_serial_by_id_dir() -> PathBuf {
    PathBuf::from("/dev/serial/by-id")
}

fn default_katapult_dir() -> PathBuf {
    home().join("katapult")
}

fn default_klipper_dir() -> PathBuf {
    home().join("klipper")
}

fn default_klippy_env_python() -> PathBuf {
    home().join("klippy-env/bin/python")
}

fn default_can_interface() -> String {
    "can0".to_string()
}

fn default_moonraker_url() -> String {
    "http://localhost:7125".to_string()
}

fn default_release_repo() -> String {
    "Cartographer3D/cartographer-klipper".to_string()
}

fn default_settle_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_dfu_poll_interval_ms() -> u64 {
    1000
}

/// Flasher settings, loaded from YAML or defaulted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_printer_data_dir")]
    pub printer_data_dir: PathBuf,

    #[serde(default = "default_klippy_log")]
    pub klippy_log: PathBuf,

    #[serde(default = "default_serial_by_id_dir")]
    pub serial_by_id_dir: PathBuf,

    #[serde(default = "default_katapult_dir")]
    pub katapult_dir: PathBuf,

    #[serde(default = "default_klipper_dir")]
    pub klipper_dir: PathBuf,

    #[serde(default = "default_klippy_env_python")]
    pub klippy_env_python: PathBuf,

    #[serde(default = "default_can_interface")]
    pub can_interface: String,

    #[serde(default = "default_moonraker_url")]
    pub moonraker_url: String,

    /// GitHub `owner/repo` hosting the firmware release tree
    #[serde(default = "default_release_repo")]
    pub release_repo: String,

    /// Minimum settle window after a mode transition (seconds)
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Re-probe interval inside a settle window (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Poll interval for the DFU presence watcher (milliseconds)
    #[serde(default = "default_dfu_poll_interval_ms")]
    pub dfu_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            printer_data_dir: default_printer_data_dir(),
            klippy_log: default_klippy_log(),
            serial_by_id_dir: default_serial_by_id_dir(),
            katapult_dir: default_katapult_dir(),
            klipper_dir: default_klipper_dir(),
            klippy_env_python: default_klippy_env_python(),
            can_interface: default_can_interface(),
            moonraker_url: default_moonraker_url(),
            release_repo: default_release_repo(),
            settle_secs: default_settle_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            dfu_poll_interval_ms: default_dfu_poll_interval_ms(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, or from the default location
    /// under the printer config directory when none is given. A missing
    /// default file falls back to `Settings::default()`; a missing explicit
    /// path is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (
                default_printer_data_dir().join("config/cartoflash.yaml"),
                false,
            ),
        };

        if !path.exists() {
            if required {
                return Err(FlashError::ConfigReadFailed {
                    path: path.display().to_string(),
                    reason: "file does not exist".to_string(),
                });
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| FlashError::ConfigReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_yaml::from_str(&raw).map_err(|e| FlashError::ConfigParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dfu_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dfu_poll_interval_ms)
    }

    /// Advisory lock file guarding against a second concurrent session
    pub fn session_lock_path(&self) -> PathBuf {
        self.printer_data_dir.join(".cartoflash.lock")
    }

    /// Tarball URL for a release channel. `stable` is an alias for the
    /// default branch; any other channel is taken as a git ref verbatim.
    pub fn tarball_url(&self, channel: &str) -> String {
        let git_ref = if channel == "stable" { "master" } else { channel };
        format!(
            "https://api.github.com/repos/{}/tarball/{git_ref}",
            self.release_repo
        )
    }
}
