//! Error types and handling for cartoflash
//!
//! Uses `thiserror` for error definitions and `miette` for pretty diagnostics.
//!
//! Errors split into two classes: fatal errors abort the whole session
//! (after the Klipper service has been restored), recoverable errors print a
//! message and hand control back to the caller for another attempt.

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for flashing operations
#[derive(Error, Diagnostic, Debug)]
pub enum FlashError {
    // Precondition errors
    #[error("Printer is busy (state: {state}); refusing to flash")]
    #[diagnostic(
        code(cartoflash::precondition::printer_busy),
        help("Wait for the current print job to finish or cancel it, then retry")
    )]
    PrinterBusy { state: String },

    #[error("Another flashing session is already running")]
    #[diagnostic(
        code(cartoflash::precondition::session_locked),
        help("Wait for the other session to finish or remove the stale lock file")
    )]
    SessionLocked { lock_path: String },

    // Discovery errors
    #[error("No flashable device found on any transport")]
    #[diagnostic(
        code(cartoflash::discovery::empty),
        help("Check wiring and power, then retry discovery")
    )]
    DiscoveryEmpty,

    #[error("Device {uuid} did not re-enumerate in bootloader mode")]
    #[diagnostic(
        code(cartoflash::bootloader::entry_failed),
        help("Power-cycle the probe and supply the identifier again")
    )]
    BootloaderEntryFailed { uuid: String },

    // Artifact resolution errors
    #[error("No firmware file matched the requested filters")]
    #[diagnostic(
        code(cartoflash::resolver::artifact_not_found),
        help("Try a different release channel or relax the variant filters")
    )]
    ArtifactNotFound { pattern: String },

    // Flash dispatch errors
    #[error("Flashing over {transport} failed: {reason}")]
    #[diagnostic(
        code(cartoflash::flash::failed),
        help("The device was not damaged; retry from the top-level menu")
    )]
    FlashFailed { transport: String, reason: String },

    // Setup errors (fatal, happen before any device interaction)
    #[error("Failed to retrieve the firmware release tree: {reason}")]
    #[diagnostic(
        code(cartoflash::setup::failed),
        help("Check network connectivity and the release channel name")
    )]
    SetupFailed { reason: String },

    #[error("Katapult checkout is unusable: {reason}")]
    #[diagnostic(
        code(cartoflash::katapult::install_failed),
        help("Remove ~/katapult and retry to re-clone the flash tooling")
    )]
    KatapultInstallFailed { reason: String },

    #[error("Katapult checkout points at an unexpected origin: {url}")]
    #[diagnostic(
        code(cartoflash::katapult::origin_mismatch),
        help("Remove the directory so it can be re-cloned from the official repository")
    )]
    KatapultOriginMismatch { url: String },

    // External process errors
    #[error("Failed to run '{program}': {reason}")]
    #[diagnostic(
        code(cartoflash::proc::spawn_failed),
        help("Check that the tool is installed and on PATH")
    )]
    CommandSpawnFailed { program: String, reason: String },

    #[error("Could not query print status: {reason}")]
    #[diagnostic(
        code(cartoflash::service::status_unavailable),
        help("Check that Moonraker is running and reachable")
    )]
    PrintStatusUnavailable { reason: String },

    // Log inspection errors
    #[error("Klippy log not found: {path}")]
    #[diagnostic(
        code(cartoflash::klippy::log_not_found),
        help("Enter the device identifier manually instead")
    )]
    KlippyLogNotFound { path: String },

    // Configuration errors
    #[error("Failed to read configuration file: {path}")]
    #[diagnostic(code(cartoflash::config::read_failed))]
    ConfigReadFailed { path: String, reason: String },

    #[error("Failed to parse configuration file: {path}")]
    #[diagnostic(code(cartoflash::config::parse_failed))]
    ConfigParseFailed { path: String, reason: String },

    // Interaction errors
    #[error("Session aborted by operator")]
    #[diagnostic(code(cartoflash::prompt::aborted))]
    Aborted,

    #[error("Prompt failed: {reason}")]
    #[diagnostic(code(cartoflash::prompt::failed))]
    PromptFailed { reason: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(cartoflash::fs::io_error))]
    IoError { message: String },
}

impl FlashError {
    /// Fatal errors terminate the whole session; recoverable ones return
    /// control to the caller so the operator can retry a different path.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FlashError::PrinterBusy { .. }
                | FlashError::SetupFailed { .. }
                | FlashError::ConfigReadFailed { .. }
                | FlashError::ConfigParseFailed { .. }
        )
    }
}

impl From<std::io::Error> for FlashError {
    fn from(err: std::io::Error) -> Self {
        FlashError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for FlashError {
    fn from(err: serde_yaml::Error) -> Self {
        FlashError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FlashError {
    fn from(err: serde_json::Error) -> Self {
        FlashError::PrintStatusUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<git2::Error> for FlashError {
    fn from(err: git2::Error) -> Self {
        FlashError::KatapultInstallFailed {
            reason: err.to_string(),
        }
    }
}

impl From<inquire::InquireError> for FlashError {
    fn from(err: inquire::InquireError) -> Self {
        match err {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => FlashError::Aborted,
            other => FlashError::PromptFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias using miette for error handling
pub type Result<T> = miette::Result<T, FlashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlashError::PrinterBusy {
            state: "printing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Printer is busy (state: printing); refusing to flash"
        );
    }

    #[test]
    fn test_error_code() {
        let err = FlashError::DiscoveryEmpty;
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("cartoflash::discovery::empty".to_string())
        );
    }

    #[test]
    fn test_fatal_split() {
        assert!(FlashError::PrinterBusy {
            state: "paused".into()
        }
        .is_fatal());
        assert!(FlashError::SetupFailed {
            reason: "curl exited 6".into()
        }
        .is_fatal());
        assert!(!FlashError::SessionLocked {
            lock_path: "/tmp/.lock".into()
        }
        .is_fatal());
        assert!(!FlashError::DiscoveryEmpty.is_fatal());
        assert!(!FlashError::BootloaderEntryFailed {
            uuid: "aabbccddeeff".into()
        }
        .is_fatal());
        assert!(!FlashError::FlashFailed {
            transport: "CAN".into(),
            reason: "no ack".into()
        }
        .is_fatal());
        assert!(!FlashError::ArtifactNotFound {
            pattern: "*500k*".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlashError = io_err.into();
        assert!(matches!(err, FlashError::IoError { .. }));
    }

    #[test]
    fn test_inquire_cancel_maps_to_aborted() {
        let err: FlashError = inquire::InquireError::OperationCanceled.into();
        assert!(matches!(err, FlashError::Aborted));
    }
}
