//! USB serial probing
//!
//! Probes show up under `/dev/serial/by-id` either as a katapult serial
//! bootloader or under their application name. An application-mode device is
//! asked to reboot into its bootloader through the Klipper flash helper,
//! after which the directory is re-scanned until the bootloader name
//! appears.

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::proc::{args, CommandRunner};
use crate::wait::poll_until;

const BOOTLOADER_FRAGMENT: &str = "katapult";
const APPLICATION_FRAGMENT: &str = "cartographer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbMode {
    Bootloader,
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub path: PathBuf,
    pub mode: UsbMode,
}

/// Scan the by-id directory for probe devices, sorted by name so repeated
/// scans list identically.
pub fn scan(dir: &Path) -> Result<Vec<UsbDevice>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut devices = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        let mode = if name.contains(BOOTLOADER_FRAGMENT) {
            UsbMode::Bootloader
        } else if name.contains(APPLICATION_FRAGMENT) {
            UsbMode::Application
        } else {
            continue;
        };
        devices.push(UsbDevice {
            path: entry.path(),
            mode,
        });
    }
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(devices)
}

/// Classify a device path by its by-id name. Paths naming neither mode are
/// taken at the operator's word and treated as bootloader devices.
pub fn classify(path: &Path) -> UsbMode {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.contains(APPLICATION_FRAGMENT) && !name.contains(BOOTLOADER_FRAGMENT) {
        UsbMode::Application
    } else {
        UsbMode::Bootloader
    }
}

/// One discovery pass. A bootloader-mode device wins over an
/// application-mode one.
pub fn probe(settings: &Settings) -> Result<Option<UsbDevice>> {
    let devices = scan(&settings.serial_by_id_dir)?;
    Ok(devices
        .iter()
        .find(|d| d.mode == UsbMode::Bootloader)
        .or_else(|| devices.first())
        .cloned())
}

/// Reboot an application-mode device into its serial bootloader and wait for
/// it to re-enumerate under the bootloader name. Returns the new device
/// path.
pub fn enter_bootloader(
    runner: &dyn CommandRunner,
    settings: &Settings,
    device: &Path,
) -> Result<PathBuf> {
    let script = format!(
        "import flash_usb as u; u.enter_bootloader('{}')",
        device.display()
    );
    tracing::info!(device = %device.display(), "requesting bootloader reboot");
    let out = runner.run(
        &settings.klippy_env_python.display().to_string(),
        args(["-c", &script]),
        Some(settings.klipper_dir.join("scripts")),
    )?;
    if !out.success {
        tracing::debug!(stderr = %out.stderr.trim(), "bootloader reboot helper failed");
    }

    let dir = settings.serial_by_id_dir.clone();
    let mut rebooted = None;
    poll_until(settings.settle_window(), settings.poll_interval(), || {
        rebooted = scan(&dir)
            .ok()
            .and_then(|ds| ds.into_iter().find(|d| d.mode == UsbMode::Bootloader));
        rebooted.is_some()
    });

    rebooted
        .map(|d| d.path)
        .ok_or_else(|| FlashError::BootloaderEntryFailed {
            uuid: device.display().to_string(),
        })
}
