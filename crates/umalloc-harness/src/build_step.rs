//! One-shot rebuild of the external tools before evaluation.

use std::time::{Duration, Instant};

use crate::config::ToolCommand;
use crate::error::HarnessError;
use crate::tool::ToolRunner;

/// Lines of build stderr kept in a [`HarnessError::Build`] diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// A build that exited zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub command: String,
    pub elapsed: Duration,
}

/// Run the build command; any failure aborts the run.
pub fn run_build<R: ToolRunner + ?Sized>(
    runner: &mut R,
    cmd: &ToolCommand,
) -> Result<BuildReport, HarnessError> {
    let command = cmd.display();
    let started = Instant::now();
    let out = runner.run(cmd, &[]).map_err(|err| HarnessError::Build {
        command: command.clone(),
        exit_code: None,
        stderr: err.to_string(),
    })?;
    if !out.success() {
        return Err(HarnessError::Build {
            command,
            exit_code: out.exit_code,
            stderr: tail(&out.stderr, STDERR_TAIL_LINES),
        });
    }
    Ok(BuildReport {
        command,
        elapsed: started.elapsed(),
    })
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::ScriptedRunner;
    use crate::tool::ToolOutput;

    #[test]
    fn successful_build_reports_command() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, "gcc -o runner ...\n");
        let cmd = ToolCommand::new("make").with_args(["all"]);
        let report = run_build(&mut runner, &cmd).unwrap();
        assert_eq!(report.command, "make all");
        assert_eq!(runner.calls, vec![("make".to_string(), vec!["all".to_string()])]);
    }

    #[test]
    fn nonzero_build_is_fatal_with_stderr_tail() {
        let mut runner = ScriptedRunner::default();
        let stderr: String = (0..30).map(|i| format!("err {i}\n")).collect();
        runner.outputs.push_back(ToolOutput {
            exit_code: Some(2),
            stdout: String::new(),
            stderr,
        });
        let err = run_build(&mut runner, &ToolCommand::new("make")).unwrap_err();
        match err {
            HarnessError::Build {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(stderr.lines().count(), STDERR_TAIL_LINES);
                assert!(stderr.starts_with("err 10"));
                assert!(stderr.ends_with("err 29"));
            }
            other => panic!("expected build error, got {other:?}"),
        }
    }

    #[test]
    fn unstartable_build_is_fatal() {
        let mut runner = ScriptedRunner::default();
        let err = run_build(&mut runner, &ToolCommand::new("make")).unwrap_err();
        assert!(matches!(err, HarnessError::Build { exit_code: None, .. }));
    }
}
