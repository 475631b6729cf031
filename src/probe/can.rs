//! CAN bus probing through the katapult query tool
//!
//! The bus is queried with `flashtool.py -q`, which lists every node as a
//! `Detected UUID: <uuid>, Application: <role>` line and closes with a
//! `Query Complete` marker. Role names decide the device's mode: `CanBoot`
//! and `Katapult` answer from the bootloader, `Klipper` nodes are other
//! MCUs and are skipped, anything else is treated as the probe running its
//! application firmware.

use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::katapult::FLASHTOOL;
use crate::proc::{args, CommandRunner};

const DETECTED_PREFIX: &str = "Detected UUID:";
const APPLICATION_KEY: &str = "Application:";
const QUERY_COMPLETE: &str = "Query Complete";

/// Role reported by a bus node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanRole {
    CanBoot,
    Katapult,
    Klipper,
    Application(String),
}

impl CanRole {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "CanBoot" => CanRole::CanBoot,
            "Katapult" => CanRole::Katapult,
            "Klipper" => CanRole::Klipper,
            other => CanRole::Application(other.to_string()),
        }
    }

    pub fn is_bootloader(&self) -> bool {
        matches!(self, CanRole::CanBoot | CanRole::Katapult)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanDevice {
    pub uuid: String,
    pub role: CanRole,
}

/// Map a CAN link bitrate to the firmware variant tag it selects
pub fn bitrate_tag(bitrate: u64) -> Option<&'static str> {
    match bitrate {
        1_000_000 => Some("1m"),
        500_000 => Some("500k"),
        250_000 => Some("250k"),
        _ => None,
    }
}

/// Check the CAN link and report its bitrate tag when one is configured.
/// Returns `Ok(None)` when the interface does not exist at all.
pub fn link_info(runner: &dyn CommandRunner, settings: &Settings) -> Result<Option<Option<&'static str>>> {
    let out = runner.run("ip", args(["-s", "-d", "link"]), None)?;
    if !out.success {
        return Ok(None);
    }
    Ok(parse_link(&out.stdout, &settings.can_interface))
}

fn parse_link(output: &str, interface: &str) -> Option<Option<&'static str>> {
    // `ip link` headers are unindented "N: name: <flags>" lines; the detail
    // lines below them are indented.
    let needle = format!(" {interface}:");
    let mut in_section = false;
    let mut seen = false;
    for line in output.lines() {
        if !line.starts_with(' ') {
            in_section = line.contains(&needle);
            seen |= in_section;
            continue;
        }
        if !in_section {
            continue;
        }
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "bitrate" {
                if let Some(rate) = tokens.next().and_then(|t| t.parse::<u64>().ok()) {
                    return Some(bitrate_tag(rate));
                }
            }
        }
    }
    if seen {
        Some(None)
    } else {
        None
    }
}

/// Query every node on the bus. The output is trusted only when the closing
/// marker is present; a truncated listing is treated as a failed query.
pub fn query(runner: &dyn CommandRunner, settings: &Settings) -> Result<Vec<CanDevice>> {
    let flashtool = settings.katapult_dir.join(FLASHTOOL);
    let out = runner.run(
        "python3",
        args([
            &flashtool.display().to_string(),
            "-i",
            &settings.can_interface,
            "-q",
        ]),
        None,
    )?;

    if !out.stdout.contains(QUERY_COMPLETE) {
        return Err(FlashError::FlashFailed {
            transport: "CAN".to_string(),
            reason: format!("bus query did not complete: {}", out.stderr.trim()),
        });
    }

    Ok(parse_query(&out.stdout))
}

fn parse_query(output: &str) -> Vec<CanDevice> {
    let mut devices = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix(DETECTED_PREFIX) else {
            continue;
        };
        let Some((uuid_part, role_part)) = rest.split_once(',') else {
            continue;
        };
        let uuid = uuid_part.trim().to_string();
        let role = role_part
            .trim()
            .strip_prefix(APPLICATION_KEY)
            .map(CanRole::parse)
            .unwrap_or_else(|| CanRole::Application(role_part.trim().to_string()));
        if uuid.is_empty() {
            continue;
        }
        devices.push(CanDevice { uuid, role });
    }
    devices
}

/// One discovery pass over the bus. Picks the strongest candidate:
/// bootloader-mode nodes first (`CanBoot` ahead of `Katapult`), then
/// application-mode nodes. `Klipper` nodes are other MCUs and never match.
pub fn probe(runner: &dyn CommandRunner, settings: &Settings) -> Result<Option<CanDevice>> {
    if link_info(runner, settings)?.is_none() {
        tracing::debug!(interface = settings.can_interface, "CAN link not present");
        return Ok(None);
    }

    let devices = match query(runner, settings) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!(error = %e, "CAN query failed during discovery");
            return Ok(None);
        }
    };

    let pick = devices
        .iter()
        .find(|d| d.role == CanRole::CanBoot)
        .or_else(|| devices.iter().find(|d| d.role == CanRole::Katapult))
        .or_else(|| {
            devices
                .iter()
                .find(|d| matches!(d.role, CanRole::Application(_)))
        });

    Ok(pick.cloned())
}
