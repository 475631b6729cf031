//! Transport-specific flash dispatch
//!
//! Each transport hands the firmware file to its external tool and judges
//! success from the tool's output, not just the exit code. The caller holds
//! the one-shot dispatch latch; nothing here re-checks it.

use std::path::Path;

use crate::bootloader::SUCCESS_MARKER;
use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::katapult::FLASH_CAN;
use crate::proc::{args, CommandRunner};

/// `dfu-util` noise that does not indicate a failed download
const DFU_IGNORED_WARNINGS: [&str; 3] = [
    "Invalid DFU suffix signature",
    "A valid DFU suffix",
    "can't detach",
];

/// Flash over the CAN bus through the katapult serial bootloader
pub fn flash_can(
    runner: &dyn CommandRunner,
    settings: &Settings,
    uuid: &str,
    firmware: &Path,
) -> Result<()> {
    let script = settings.katapult_dir.join(FLASH_CAN);
    tracing::info!(uuid, firmware = %firmware.display(), "flashing over CAN");
    let out = runner.run(
        "python3",
        args([
            &script.display().to_string(),
            "-i",
            &settings.can_interface,
            "-f",
            &firmware.display().to_string(),
            "-u",
            uuid,
        ]),
        None,
    )?;

    if !out.stdout.contains(SUCCESS_MARKER) {
        return Err(FlashError::FlashFailed {
            transport: "CAN".to_string(),
            reason: tail(&out),
        });
    }
    Ok(())
}

/// Flash a serial bootloader device over USB
pub fn flash_usb(
    runner: &dyn CommandRunner,
    settings: &Settings,
    device: &Path,
    firmware: &Path,
) -> Result<()> {
    let script = settings.katapult_dir.join(FLASH_CAN);
    tracing::info!(device = %device.display(), firmware = %firmware.display(), "flashing over USB");
    let out = runner.run(
        "python3",
        args([
            &script.display().to_string(),
            "-d",
            &device.display().to_string(),
            "-f",
            &firmware.display().to_string(),
        ]),
        None,
    )?;

    if !out.stdout.contains(SUCCESS_MARKER) {
        return Err(FlashError::FlashFailed {
            transport: "USB".to_string(),
            reason: tail(&out),
        });
    }
    Ok(())
}

/// Flash a device sitting in DFU mode with `dfu-util`. The tool prints
/// well-known suffix warnings on unsigned images and can exit non-zero even
/// after a complete download, so those are filtered before judging.
pub fn flash_dfu(
    runner: &dyn CommandRunner,
    device_id: &str,
    firmware: &Path,
) -> Result<()> {
    tracing::info!(device_id, firmware = %firmware.display(), "flashing over DFU");
    let out = runner.run(
        "dfu-util",
        args([
            "--device",
            device_id,
            "-R",
            "-a",
            "0",
            "-s",
            "0x08000000:leave",
            "-D",
            &firmware.display().to_string(),
        ]),
        None,
    )?;

    let real_errors: Vec<&str> = out
        .stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !DFU_IGNORED_WARNINGS.iter().any(|w| line.contains(w)))
        .collect();

    if out.success || real_errors.is_empty() {
        return Ok(());
    }

    Err(FlashError::FlashFailed {
        transport: "DFU".to_string(),
        reason: real_errors.join("; "),
    })
}

fn tail(out: &crate::proc::CmdOutput) -> String {
    let text = if out.stderr.trim().is_empty() {
        &out.stdout
    } else {
        &out.stderr
    };
    text.lines().last().unwrap_or("no output").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{CmdOutput, MockCommandRunner};
    use std::path::PathBuf;

    #[test]
    fn test_can_flash_requires_marker() {
        let settings = Settings::default();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| Ok(CmdOutput::ok("Flashing...\nFlash Success\n")));
        assert!(flash_can(&runner, &settings, "aabbccddeeff", Path::new("fw.bin")).is_ok());

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| Ok(CmdOutput::ok("Flashing...\nTimeout waiting for ACK\n")));
        let err = flash_can(&runner, &settings, "aabbccddeeff", Path::new("fw.bin"))
            .expect_err("must fail");
        assert!(matches!(err, FlashError::FlashFailed { ref transport, .. } if transport == "CAN"));
    }

    #[test]
    fn test_usb_flash_passes_device_path() {
        let settings = Settings::default();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, a, _| {
                program == "python3"
                    && a.contains(&"-d".to_string())
                    && a.contains(&"/dev/serial/by-id/usb-katapult-if00".to_string())
            })
            .returning(|_, _, _| Ok(CmdOutput::ok("Flash Success\n")));
        assert!(flash_usb(
            &runner,
            &settings,
            &PathBuf::from("/dev/serial/by-id/usb-katapult-if00"),
            Path::new("fw_usb.bin"),
        )
        .is_ok());
    }

    #[test]
    fn test_dfu_suffix_warnings_are_ignored() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(CmdOutput {
                success: false,
                stdout: "Download done.\n".to_string(),
                stderr: "dfu-util: Invalid DFU suffix signature\n\
                         dfu-util: A valid DFU suffix will be required\n\
                         dfu-util: can't detach\n"
                    .to_string(),
            })
        });
        assert!(flash_dfu(&runner, "0483:df11", Path::new("combined.bin")).is_ok());
    }

    #[test]
    fn test_dfu_real_error_still_fails() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(CmdOutput {
                success: false,
                stdout: String::new(),
                stderr: "dfu-util: Invalid DFU suffix signature\n\
                         dfu-util: No DFU capable USB device available\n"
                    .to_string(),
            })
        });
        let err =
            flash_dfu(&runner, "0483:df11", Path::new("combined.bin")).expect_err("must fail");
        assert!(matches!(err, FlashError::FlashFailed { ref transport, .. } if transport == "DFU"));
    }
}
