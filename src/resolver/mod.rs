//! Firmware artifact resolution
//!
//! Given the extracted release tree and the active transport, produce an
//! ordered candidate list. Two packaging styles are recognized:
//!
//! - **Deployer layout**: one flat directory of katapult deployer images,
//!   ordered by transport priority (`1m`, `500k`, `250k`, `usb`, other).
//! - **Versioned layout**: per-version subfolders, walked newest-first so
//!   the "always pick latest" policy is simply the first entry.
//!
//! DFU resolution additionally restricts candidates to the combined full
//! images, which carry a distinct name prefix.

pub mod version;

use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use wax::{Glob, Pattern};

use crate::error::{FlashError, Result};
use crate::session::Transport;
pub use version::Version;

/// Transport priority rank for deployer images: substring match against the
/// filename, first match wins, unmatched files sort last.
const PRIORITY_TAGS: [&str; 4] = ["1m", "500k", "250k", "usb"];

/// Name prefix of the combined full images used for DFU flashing
const COMBINED_PREFIX: &str = "combined";

/// Relative locations of the two layouts inside the release tree
pub const DEPLOYER_SUBDIR: &str = "firmware/v2-v3/katapult-deployer";
pub const VERSIONED_SUBDIR: &str = "firmware/v2-v3/survey";
pub const COMBINED_SUBDIR: &str = "firmware/v2-v3/combined-firmware";

/// One flashable firmware file from the release tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareArtifact {
    /// Path relative to the scanned tree root
    pub relative_path: PathBuf,
    pub file_name: String,
    /// Version folder the file came from, absent in the flat layout
    pub version: Option<Version>,
}

impl fmt::Display for FirmwareArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path.display())
    }
}

/// How the release tree packages its candidate files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeLayout {
    Deployer,
    Versioned,
}

/// Variant filters applied while scanning
#[derive(Debug, Clone, Default)]
pub struct VariantFilter {
    /// Include glob against the filename (`None` keeps everything)
    pub include: Option<String>,
    /// Exclude globs against the filename
    pub exclude: Vec<String>,
    /// Restrict to (or away from) the `HT` high-temperature subfolders
    pub high_temp: bool,
    /// Restrict to combined full images (DFU only)
    pub combined_only: bool,
}

impl VariantFilter {
    /// Build the filter the same way the flasher menus derive it: CAN uses
    /// the detected bitrate tag when the link reports one and otherwise
    /// excludes serial and K-series images; USB picks the serial images
    /// (K-series swaps in the K1 pattern); DFU keeps only combined images.
    pub fn for_transport(
        transport: Transport,
        bitrate_tag: Option<&str>,
        kseries: bool,
        high_temp: bool,
    ) -> Self {
        match transport {
            Transport::Can => match bitrate_tag {
                Some(tag) => Self {
                    include: Some(format!("*{tag}*")),
                    high_temp,
                    ..Self::default()
                },
                None => Self {
                    exclude: vec!["*usb*".to_string(), "*K1*".to_string()],
                    high_temp,
                    ..Self::default()
                },
            },
            Transport::Usb => {
                if kseries {
                    Self {
                        include: Some("*K1*usb*".to_string()),
                        high_temp,
                        ..Self::default()
                    }
                } else {
                    Self {
                        include: Some("*usb*".to_string()),
                        exclude: vec!["*K1*".to_string()],
                        high_temp,
                        ..Self::default()
                    }
                }
            }
            Transport::Dfu => Self {
                combined_only: true,
                high_temp,
                ..Self::default()
            },
        }
    }

    fn matches(&self, file_name: &str) -> Result<bool> {
        let lowered = file_name.to_lowercase();

        if self.combined_only && !lowered.starts_with(COMBINED_PREFIX) {
            return Ok(false);
        }

        if let Some(ref pattern) = self.include {
            if !glob_match(pattern, &lowered)? {
                return Ok(false);
            }
        }

        for pattern in &self.exclude {
            if glob_match(pattern, &lowered)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn glob_match(pattern: &str, name: &str) -> Result<bool> {
    let lowered = pattern.to_lowercase();
    let glob = Glob::new(&lowered).map_err(|e| FlashError::ArtifactNotFound {
        pattern: format!("{pattern}: {e}"),
    })?;
    Ok(glob.is_match(name))
}

/// Rank a filename by transport priority; unmatched names sort last.
fn transport_priority(file_name: &str) -> usize {
    let lowered = file_name.to_lowercase();
    PRIORITY_TAGS
        .iter()
        .position(|tag| lowered.contains(tag))
        .unwrap_or(PRIORITY_TAGS.len())
}

/// Resolve the ordered candidate list for one transport.
///
/// Ordering key is (transport priority, descending version, name), which is
/// total: the same tree always yields the same list no matter the directory
/// listing order.
pub fn resolve(root: &Path, layout: TreeLayout, filter: &VariantFilter) -> Result<Vec<FirmwareArtifact>> {
    let mut artifacts = scan_tree(root, filter)?;

    match layout {
        TreeLayout::Deployer => {
            artifacts.sort_by(|a, b| {
                transport_priority(&a.file_name)
                    .cmp(&transport_priority(&b.file_name))
                    .then_with(|| a.file_name.cmp(&b.file_name))
            });
        }
        TreeLayout::Versioned => {
            // Newest version folder first; unversioned stragglers last.
            artifacts.sort_by(|a, b| {
                b.version
                    .cmp(&a.version)
                    .then_with(|| {
                        transport_priority(&a.file_name).cmp(&transport_priority(&b.file_name))
                    })
                    .then_with(|| a.file_name.cmp(&b.file_name))
            });
        }
    }

    tracing::debug!(count = artifacts.len(), ?layout, "resolved firmware candidates");
    Ok(artifacts)
}

/// Walk the tree collecting `.bin` files that pass the variant filter and
/// the high-temperature subfolder rule.
fn scan_tree(root: &Path, filter: &VariantFilter) -> Result<Vec<FirmwareArtifact>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !name.ends_with(".bin") {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        // High-temp firmware lives in HT subfolders; the flag must agree
        // with the folder, in both directions.
        let subdir = relative.parent().map(Path::to_path_buf).unwrap_or_default();
        let in_ht_folder = subdir
            .components()
            .any(|c| c.as_os_str().to_string_lossy().contains("HT"));
        if filter.high_temp != in_ht_folder {
            continue;
        }

        if !filter.matches(name)? {
            continue;
        }

        let version = subdir
            .components()
            .find_map(|c| Version::parse(&c.as_os_str().to_string_lossy()));

        tracing::debug!(file = %relative.display(), "firmware candidate found");
        found.push(FirmwareArtifact {
            relative_path: relative,
            file_name: name.to_string(),
            version,
        });
    }

    Ok(found)
}
