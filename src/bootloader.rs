//! CAN bootloader-entry sequencing
//!
//! An application-mode bus device is asked to reboot into its bootloader
//! with a flashtool reset request, then the bus is re-queried inside the
//! settle window until the same UUID answers with a bootloader role. A
//! device that never re-enumerates is discarded so the operator starts the
//! identification step over.

use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::katapult::FLASHTOOL;
use crate::probe::can;
use crate::proc::{args, CommandRunner};
use crate::wait::poll_until;

/// Marker the flash tooling prints when a request was acknowledged
pub const SUCCESS_MARKER: &str = "Flash Success";

/// Send the bootloader reset request for `uuid`. The tool's exit code is
/// unreliable; the acknowledgment marker in its output is what counts.
fn request_entry(runner: &dyn CommandRunner, settings: &Settings, uuid: &str) -> Result<()> {
    let flashtool = settings.katapult_dir.join(FLASHTOOL);
    let out = runner.run(
        "python3",
        args([
            &flashtool.display().to_string(),
            "-i",
            &settings.can_interface,
            "-u",
            uuid,
            "-r",
        ]),
        None,
    )?;

    if !out.stdout.contains(SUCCESS_MARKER) {
        tracing::warn!(uuid, "bootloader request not acknowledged");
        return Err(FlashError::BootloaderEntryFailed {
            uuid: uuid.to_string(),
        });
    }
    Ok(())
}

/// Check whether `uuid` currently answers the bus query with a bootloader
/// role.
fn answers_as_bootloader(runner: &dyn CommandRunner, settings: &Settings, uuid: &str) -> bool {
    match can::query(runner, settings) {
        Ok(devices) => devices
            .iter()
            .any(|d| d.uuid == uuid && d.role.is_bootloader()),
        Err(_) => false,
    }
}

/// Move an application-mode device into its bootloader and verify the
/// transition on the bus. On failure the UUID must not be reused; the
/// caller restarts identification from scratch.
pub fn enter(runner: &dyn CommandRunner, settings: &Settings, uuid: &str) -> Result<()> {
    request_entry(runner, settings, uuid)?;

    tracing::info!(uuid, "waiting for bootloader re-enumeration");
    let confirmed = poll_until(settings.settle_window(), settings.poll_interval(), || {
        answers_as_bootloader(runner, settings, uuid)
    });

    if !confirmed {
        return Err(FlashError::BootloaderEntryFailed {
            uuid: uuid.to_string(),
        });
    }
    tracing::info!(uuid, "device re-enumerated in bootloader mode");
    Ok(())
}
