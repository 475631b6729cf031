//! Print-service gate and Klipper lifecycle
//!
//! Firmware must never be written while a job is printing or paused, so the
//! session opens with a read-only status query against Moonraker. The
//! Klipper service itself is stopped for the duration of the flash (it holds
//! the serial/CAN devices open) and restarted unconditionally afterwards.

use serde::Deserialize;

use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::proc::{args, CommandRunner};

/// Reported state of the active print job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintState {
    Printing,
    Paused,
    Standby,
    Complete,
    Error,
    Other(String),
}

impl PrintState {
    fn from_moonraker(state: &str) -> Self {
        match state {
            "printing" => PrintState::Printing,
            "paused" => PrintState::Paused,
            "standby" => PrintState::Standby,
            "complete" => PrintState::Complete,
            "error" => PrintState::Error,
            other => PrintState::Other(other.to_string()),
        }
    }

    /// Only an active or paused job blocks flashing
    pub fn blocks_flashing(&self) -> bool {
        matches!(self, PrintState::Printing | PrintState::Paused)
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    result: StatusResult,
}

#[derive(Deserialize)]
struct StatusResult {
    status: StatusObjects,
}

#[derive(Deserialize)]
struct StatusObjects {
    print_stats: PrintStats,
}

#[derive(Deserialize)]
struct PrintStats {
    state: String,
}

/// Moonraker status queries and Klipper service control
pub struct PrintService<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a Settings,
}

impl<'a> PrintService<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a Settings) -> Self {
        Self { runner, settings }
    }

    /// Read the current job state through the Moonraker HTTP API
    pub fn print_state(&self) -> Result<PrintState> {
        let url = format!(
            "{}/printer/objects/query?print_stats=state",
            self.settings.moonraker_url
        );
        let out = self.runner.run("curl", args(["-sf", &url]), None)?;
        if !out.success {
            return Err(FlashError::PrintStatusUnavailable {
                reason: format!("Moonraker query failed: {}", out.stderr.trim()),
            });
        }

        let parsed: StatusResponse = serde_json::from_str(&out.stdout)?;
        let state = PrintState::from_moonraker(&parsed.result.status.print_stats.state);
        tracing::debug!(?state, "print state queried");
        Ok(state)
    }

    /// Precondition gate: refuse the whole session while a job is active.
    /// Runs before any device interaction and has no side effects. A status
    /// query that cannot be answered counts as a stopped print service, so
    /// the session proceeds; Klipper is stopped before flashing either way.
    pub fn assert_idle(&self) -> Result<()> {
        let state = match self.print_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "print service unreachable, assuming it is stopped");
                return Ok(());
            }
        };
        if state.blocks_flashing() {
            let label = match state {
                PrintState::Printing => "printing",
                PrintState::Paused => "paused",
                _ => unreachable!(),
            };
            return Err(FlashError::PrinterBusy {
                state: label.to_string(),
            });
        }
        Ok(())
    }

    pub fn stop_klipper(&self) -> Result<()> {
        self.lifecycle("stop")
    }

    pub fn restart_klipper(&self) -> Result<()> {
        self.lifecycle("restart")
    }

    fn lifecycle(&self, action: &str) -> Result<()> {
        let out = self
            .runner
            .run("sudo", args(["service", "klipper", action]), None)?;
        if !out.success {
            tracing::warn!(action, stderr = %out.stderr.trim(), "klipper service call failed");
        }
        // Fire-and-forget: the exit code is logged but a failed stop/start
        // never aborts the session on its own.
        Ok(())
    }
}
