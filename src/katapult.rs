//! Katapult flash-tool checkout
//!
//! CAN and serial-bootloader flashing go through the katapult scripts, so a
//! checkout of the upstream repository must exist on the host. An existing
//! checkout is verified against the official origin URL before use; anything
//! else on that path is refused rather than updated.

use std::path::Path;

use git2::Repository;

use crate::error::{FlashError, Result};

/// Official upstream; an existing checkout must point here to be trusted
pub const KATAPULT_ORIGIN: &str = "https://github.com/arksine/katapult";

/// Scripts used out of the checkout
pub const FLASHTOOL: &str = "scripts/flashtool.py";
pub const FLASH_CAN: &str = "scripts/flash_can.py";

/// Make sure a usable katapult checkout exists at `dir`, cloning it when the
/// directory is missing. Returns the open repository.
pub fn ensure_checkout(dir: &Path) -> Result<Repository> {
    if dir.join(".git").exists() {
        let repo = Repository::open(dir)?;
        verify_origin(&repo)?;
        tracing::debug!(path = %dir.display(), "reusing katapult checkout");
        return Ok(repo);
    }

    if dir.exists() {
        return Err(FlashError::KatapultInstallFailed {
            reason: format!("{} exists but is not a git checkout", dir.display()),
        });
    }

    tracing::info!(path = %dir.display(), "cloning katapult");
    let repo = Repository::clone(KATAPULT_ORIGIN, dir)?;
    Ok(repo)
}

/// Fetch and fast-forward the default branch. Network failures are logged
/// and tolerated so an offline host can still flash with what it has.
pub fn refresh(repo: &Repository) -> Result<()> {
    let mut remote = repo.find_remote("origin")?;
    if let Err(e) = remote.fetch(&["master"], None, None) {
        tracing::warn!(error = %e, "katapult fetch failed, using existing checkout");
        return Ok(());
    }

    let fetch_head = match repo.find_reference("FETCH_HEAD") {
        Ok(r) => r,
        Err(_) => return Ok(()),
    };
    let fetched = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched])?;

    if analysis.is_up_to_date() {
        return Ok(());
    }
    if analysis.is_fast_forward() {
        let refname = "refs/heads/master";
        let mut reference = repo.find_reference(refname)?;
        reference.set_target(fetched.id(), "fast-forward to origin/master")?;
        repo.set_head(refname)?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
        tracing::info!("katapult checkout fast-forwarded");
    } else {
        tracing::warn!("katapult checkout has diverged from origin, leaving as-is");
    }
    Ok(())
}

fn verify_origin(repo: &Repository) -> Result<()> {
    let remote = repo
        .find_remote("origin")
        .map_err(|_| FlashError::KatapultInstallFailed {
            reason: "checkout has no 'origin' remote".to_string(),
        })?;
    let url = remote.url().unwrap_or_default();
    if url.trim_end_matches(".git") != KATAPULT_ORIGIN {
        return Err(FlashError::KatapultOriginMismatch {
            url: url.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo_with_origin(dir: &Path, url: &str) -> Repository {
        let repo = Repository::init(dir).expect("init");
        repo.remote("origin", url).expect("remote");
        repo
    }

    #[test]
    fn test_official_origin_is_accepted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = init_repo_with_origin(temp.path(), KATAPULT_ORIGIN);
        assert!(verify_origin(&repo).is_ok());
    }

    #[test]
    fn test_dot_git_suffix_is_accepted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo =
            init_repo_with_origin(temp.path(), "https://github.com/arksine/katapult.git");
        assert!(verify_origin(&repo).is_ok());
    }

    #[test]
    fn test_foreign_origin_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = init_repo_with_origin(temp.path(), "https://example.com/evil/katapult");
        let err = verify_origin(&repo).expect_err("must refuse");
        assert!(matches!(err, FlashError::KatapultOriginMismatch { .. }));
    }

    #[test]
    fn test_missing_origin_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repository::init(temp.path()).expect("init");
        let err = verify_origin(&repo).expect_err("must refuse");
        assert!(matches!(err, FlashError::KatapultInstallFailed { .. }));
    }

    #[test]
    fn test_non_git_directory_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("katapult");
        std::fs::create_dir(&dir).expect("mkdir");
        std::fs::write(dir.join("README"), "not a checkout").expect("write");

        let err = ensure_checkout(&dir).err().expect("must refuse");
        assert!(matches!(err, FlashError::KatapultInstallFailed { .. }));
    }
}
