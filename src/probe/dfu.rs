//! USB-DFU probing
//!
//! A probe held in DFU negotiation shows up in `lsusb` as a line mentioning
//! "DFU Mode"; the vendor:product token identifies it to `dfu-util`. The
//! watcher polls for that line until a device appears or the operator
//! cancels.

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::proc::{args, CommandRunner};

const DFU_MARKER: &str = "DFU Mode";
/// `lsusb` line shape: `Bus 001 Device 004: ID 0483:df11 STMicro...`;
/// the ID value sits at this whitespace-token index.
const ID_TOKEN_INDEX: usize = 5;

/// List the vendor:product IDs of every device currently in DFU mode
pub fn list(runner: &dyn CommandRunner) -> Result<Vec<String>> {
    let out = runner.run("lsusb", vec![], None)?;
    if !out.success {
        return Ok(Vec::new());
    }
    Ok(parse_lsusb(&out.stdout))
}

fn parse_lsusb(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(DFU_MARKER))
        .filter_map(|line| line.split_whitespace().nth(ID_TOKEN_INDEX))
        .map(str::to_string)
        .collect()
}

/// One discovery pass
pub fn probe(runner: &dyn CommandRunner) -> Result<Option<String>> {
    Ok(list(runner)?.into_iter().next())
}

/// Poll until a DFU device appears. The idle hook runs between polls and
/// owns the pause; callers watch for operator cancellation there and trip
/// the token. Returns `None` when the token is cancelled first.
pub fn wait_for_device(
    runner: &dyn CommandRunner,
    interval: Duration,
    cancel: &CancelToken,
    mut idle: impl FnMut(Duration),
) -> Result<Option<String>> {
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(id) = probe(runner)? {
            return Ok(Some(id));
        }
        idle(interval);
    }
}
