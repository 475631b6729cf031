//! External process execution
//!
//! The bootloader tools, `dfu-util`, `lsusb`, `ip`, `curl` and the service
//! manager are all driven as black-box processes. Success for several of
//! them is a marker string in their output text, so the runner is a narrow
//! trait that tests can replace with canned output.

use std::path::PathBuf;
use std::process::Command;

#[cfg(test)]
use mockall::automock;

use crate::error::{FlashError, Result};

/// Captured output of one external process run
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

// Canned-output constructors for tests driving a mocked runner
#[cfg(test)]
impl CmdOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Abstraction over external command execution
#[cfg_attr(test, automock)]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion and capture its output. A non-zero exit
    /// code is not an error at this level; callers inspect `success` and the
    /// captured text.
    fn run(&self, program: &str, args: Vec<String>, cwd: Option<PathBuf>) -> Result<CmdOutput>;
}

/// Real implementation delegating to `std::process::Command`
#[derive(Debug, Default)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&self, program: &str, args: Vec<String>, cwd: Option<PathBuf>) -> Result<CmdOutput> {
        let mut cmd = Command::new(program);
        cmd.args(&args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(program, ?args, "running external command");

        let output = cmd.output().map_err(|e| FlashError::CommandSpawnFailed {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        let result = CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            program,
            success = result.success,
            stdout_len = result.stdout.len(),
            "command finished"
        );

        Ok(result)
    }
}

/// Convenience for building `Vec<String>` argument lists
pub fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_runner_captures_stdout() {
        let out = HostRunner
            .run("echo", args(["hello"]), None)
            .expect("echo should run");
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_host_runner_missing_program() {
        let err = HostRunner
            .run("definitely-not-a-real-tool", vec![], None)
            .expect_err("should fail to spawn");
        assert!(matches!(err, FlashError::CommandSpawnFailed { .. }));
    }

    #[test]
    fn test_host_runner_nonzero_exit_is_not_an_error() {
        let out = HostRunner
            .run("sh", args(["-c", "echo oops >&2; exit 3"]), None)
            .expect("sh should run");
        assert!(!out.success);
        assert_eq!(out.stderr.trim(), "oops");
    }
}
