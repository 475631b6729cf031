//! Device discovery across the three transports
//!
//! Each transport probe is independent and records at most one candidate
//! into the session. CAN goes through the katapult query tool, USB through
//! the serial-by-id directory, DFU through `lsusb`. Probe failures on one
//! transport never abort discovery on the others.

pub mod can;
pub mod dfu;
pub mod usb;

use crate::config::Settings;
use crate::error::Result;
use crate::proc::CommandRunner;
use crate::session::{DeviceRecord, SessionState, TransportKind};

/// Probe every transport once and record what was found. Returns the number
/// of devices recorded.
pub fn discover(
    runner: &dyn CommandRunner,
    settings: &Settings,
    state: &mut SessionState,
) -> Result<usize> {
    let mut found = 0;

    match can::probe(runner, settings) {
        Ok(Some(device)) => {
            let kind = if device.role.is_bootloader() {
                TransportKind::CanBootloader
            } else {
                TransportKind::CanApplication
            };
            state.record_device(DeviceRecord::new(kind, device.uuid));
            found += 1;
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "CAN probe failed"),
    }

    match usb::probe(settings) {
        Ok(Some(device)) => {
            // An application-mode serial device must reboot into its
            // bootloader before it counts as a candidate.
            let path = match device.mode {
                usb::UsbMode::Bootloader => Some(device.path),
                usb::UsbMode::Application => {
                    match usb::enter_bootloader(runner, settings, &device.path) {
                        Ok(p) => Some(p),
                        Err(e) => {
                            tracing::warn!(error = %e, "USB bootloader entry failed");
                            None
                        }
                    }
                }
            };
            if let Some(path) = path {
                state.record_device(DeviceRecord::new(
                    TransportKind::UsbBootloader,
                    path.display().to_string(),
                ));
                found += 1;
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "USB probe failed"),
    }

    match dfu::probe(runner) {
        Ok(Some(id)) => {
            state.record_device(DeviceRecord::new(TransportKind::UsbDfu, id));
            found += 1;
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "DFU probe failed"),
    }

    tracing::info!(found, "discovery pass complete");
    Ok(found)
}
