//! Firmware release-tree retrieval
//!
//! Release trees are published as GitHub tarballs per channel. The tarball
//! is downloaded and unpacked into a temporary directory that lives exactly
//! as long as the session; resolution then walks the unpacked tree. Any
//! failure here is fatal since it happens before device interaction.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::proc::{args, CommandRunner};

/// An unpacked release tree; the backing temp directory is removed on drop
#[derive(Debug)]
pub struct ReleaseTree {
    _workdir: TempDir,
    root: PathBuf,
    pub channel: String,
}

impl ReleaseTree {
    /// Filesystem root of the unpacked release
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Download and unpack the release tarball for `channel`
pub fn fetch(runner: &dyn CommandRunner, settings: &Settings, channel: &str) -> Result<ReleaseTree> {
    let workdir = TempDir::new().map_err(|e| FlashError::SetupFailed {
        reason: format!("could not create temp directory: {e}"),
    })?;

    let url = settings.tarball_url(channel);
    let tarball = workdir.path().join("release.tar.gz");
    tracing::info!(channel, url, "fetching firmware release tree");

    let out = runner.run(
        "curl",
        args(["-sSfL", "-o", &tarball.display().to_string(), &url]),
        None,
    )?;
    if !out.success {
        return Err(FlashError::SetupFailed {
            reason: format!("download of {url} failed: {}", out.stderr.trim()),
        });
    }

    let out = runner.run(
        "tar",
        args([
            "-xzf",
            &tarball.display().to_string(),
            "-C",
            &workdir.path().display().to_string(),
        ]),
        None,
    )?;
    if !out.success {
        return Err(FlashError::SetupFailed {
            reason: format!("unpack failed: {}", out.stderr.trim()),
        });
    }

    let root = unpacked_root(workdir.path())?;
    tracing::debug!(root = %root.display(), "release tree unpacked");

    Ok(ReleaseTree {
        _workdir: workdir,
        root,
        channel: channel.to_string(),
    })
}

/// GitHub tarballs unpack into a single `owner-repo-sha` directory; find it.
fn unpacked_root(workdir: &Path) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(workdir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.into_iter()
        .next()
        .ok_or_else(|| FlashError::SetupFailed {
            reason: "tarball unpacked to an empty tree".to_string(),
        })
}
