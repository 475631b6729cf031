//! Klippy startup-log inspection
//!
//! The printer's startup log echoes the active configuration, including the
//! probe's `canbus_uuid`. UUIDs declared under a `[mcu scanner]` block are
//! the strongest signal, `[scanner]` blocks are a likely match, and UUIDs
//! with no probe section nearby are offered last. The log repeats the
//! configuration on every restart, so within a tier the most recent
//! declaration ranks first.

use std::path::Path;

use crate::error::{FlashError, Result};

/// Section header that identifies the probe MCU directly
const MCU_SCANNER_SECTION: &str = "[mcu scanner]";
/// Section header of the probe object itself
const SCANNER_SECTION: &str = "[scanner]";

const UUID_KEY: &str = "canbus_uuid =";

/// Candidate bus identifiers from the log, strongest signal first. Within a
/// tier the most recently declared block ranks first, since the log echoes
/// the configuration anew on every restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCandidate {
    pub uuid: String,
    /// Section header the UUID was declared under, when it was a probe one
    pub section: Option<&'static str>,
}

/// Scan the klippy log for bus UUIDs, ordered by how likely each one is to
/// be the probe: `[mcu scanner]` declarations, then `[scanner]`, then
/// unattributed UUIDs. Duplicates keep their first (strongest) slot.
pub fn find_bus_uuids(log_path: &Path) -> Result<Vec<LogCandidate>> {
    if !log_path.exists() {
        return Err(FlashError::KlippyLogNotFound {
            path: log_path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(log_path)?;
    Ok(scan_log(&content))
}

fn scan_log(content: &str) -> Vec<LogCandidate> {
    let mut mcu_scanner = Vec::new();
    let mut scanner = Vec::new();
    let mut unattributed = Vec::new();

    let mut previous: Option<&str> = None;
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(raw) = trimmed.strip_prefix(UUID_KEY) {
            let uuid = raw.trim().to_string();
            if !uuid.is_empty() {
                match previous.map(str::trim) {
                    Some(p) if p.starts_with(MCU_SCANNER_SECTION) => {
                        push_unique(&mut mcu_scanner, uuid);
                    }
                    Some(p) if p.starts_with(SCANNER_SECTION) => {
                        push_unique(&mut scanner, uuid);
                    }
                    _ => push_unique(&mut unattributed, uuid),
                }
            }
        }
        previous = Some(line);
    }

    // Newest declaration first within each tier
    mcu_scanner.reverse();
    scanner.reverse();
    unattributed.reverse();

    let mut candidates = Vec::new();
    for uuid in mcu_scanner {
        candidates.push(LogCandidate {
            uuid,
            section: Some(MCU_SCANNER_SECTION),
        });
    }
    for uuid in scanner {
        if !candidates.iter().any(|c| c.uuid == uuid) {
            candidates.push(LogCandidate {
                uuid,
                section: Some(SCANNER_SECTION),
            });
        }
    }
    for uuid in unattributed {
        if !candidates.iter().any(|c| c.uuid == uuid) {
            candidates.push(LogCandidate {
                uuid,
                section: None,
            });
        }
    }
    candidates
}

fn push_unique(list: &mut Vec<String>, uuid: String) {
    // A repeated declaration moves to the end, so the reverse below ranks
    // the latest one first
    list.retain(|u| u != &uuid);
    list.push(uuid);
}
