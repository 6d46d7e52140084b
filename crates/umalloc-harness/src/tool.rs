//! External tool invocation.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use crate::config::ToolCommand;

/// Captured result of one external tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external tools to completion.
///
/// A nonzero exit is reported through [`ToolOutput::exit_code`], never as an
/// `Err`. `Err` means the tool could not be started or waited on.
pub trait ToolRunner {
    fn run(&mut self, cmd: &ToolCommand, extra: &[OsString]) -> std::io::Result<ToolOutput>;
}

/// Spawns real child processes and blocks until they exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, cmd: &ToolCommand, extra: &[OsString]) -> std::io::Result<ToolOutput> {
        let output = Command::new(&cmd.program)
            .args(cmd.argv(extra))
            .stdin(Stdio::null())
            .output()?;
        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
