//! Shared helpers for CLI integration tests

use assert_cmd::Command;

/// Command for the cartoflash binary
pub fn cartoflash() -> Command {
    Command::cargo_bin("cartoflash").expect("binary builds")
}

/// Write a minimal settings file into `dir` and return its path. Moonraker
/// points at a closed port and the release repo does not exist, so sessions
/// driven with it never get past setup.
pub fn write_settings(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("cartoflash.yaml");
    std::fs::write(
        &path,
        format!(
            "printer_data_dir: {}\n\
             moonraker_url: http://127.0.0.1:1\n\
             release_repo: Cartographer3D/no-such-release-tree\n",
            dir.join("printer_data").display()
        ),
    )
    .expect("write settings");
    path
}
