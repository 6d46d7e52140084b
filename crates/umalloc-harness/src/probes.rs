//! The three per-trace probes: correctness, utilization, performance.

use std::ffi::OsString;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{HarnessConfig, ToolCommand};
use crate::error::HarnessError;
use crate::parse;
use crate::tool::{ToolOutput, ToolRunner};

/// Checker flag selecting correctness mode.
pub const CORRECTNESS_FLAG: &str = "-r";
/// Checker flag selecting utilization-report mode.
pub const UTILIZATION_FLAG: &str = "-ru";

/// Outcome of a measuring probe.
///
/// Both non-measured states render as `-1` in the text table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Measurement<T> {
    Measured(T),
    /// Skipped because the trace failed correctness.
    NotMeasured,
    /// The probe ran and its tool reported failure.
    Failed,
}

impl<T: Copy> Measurement<T> {
    #[must_use]
    pub fn value(&self) -> Option<T> {
        match self {
            Self::Measured(v) => Some(*v),
            Self::NotMeasured | Self::Failed => None,
        }
    }

    #[must_use]
    pub fn is_measured(&self) -> bool {
        matches!(self, Self::Measured(_))
    }
}

/// A probe result together with the exit code of the last tool run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probed<T> {
    pub value: T,
    pub exit_code: Option<i32>,
}

impl<T> Probed<T> {
    fn new(value: T, out: &ToolOutput) -> Self {
        Self {
            value,
            exit_code: out.exit_code,
        }
    }
}

fn invoke<R: ToolRunner + ?Sized>(
    runner: &mut R,
    cmd: &ToolCommand,
    extra: &[OsString],
) -> Result<ToolOutput, HarnessError> {
    runner.run(cmd, extra).map_err(|source| HarnessError::Spawn {
        program: cmd.display(),
        source,
    })
}

/// Run the checker in correctness mode. A single run is authoritative.
pub fn check_correctness<R: ToolRunner + ?Sized>(
    runner: &mut R,
    cfg: &HarnessConfig,
    trace: &Path,
) -> Result<Probed<bool>, HarnessError> {
    let out = invoke(
        runner,
        &cfg.checker,
        &[OsString::from(CORRECTNESS_FLAG), trace.as_os_str().to_owned()],
    )?;
    let passed = out.success() && parse::passed_correctness(&out.stdout, &cfg.correctness_marker);
    Ok(Probed::new(passed, &out))
}

/// Run the checker in utilization mode.
///
/// A nonzero exit yields [`Measurement::Failed`]; malformed output on a
/// successful exit is a hard error.
pub fn measure_utilization<R: ToolRunner + ?Sized>(
    runner: &mut R,
    cfg: &HarnessConfig,
    trace: &Path,
) -> Result<Probed<Measurement<f64>>, HarnessError> {
    let out = invoke(
        runner,
        &cfg.checker,
        &[OsString::from(UTILIZATION_FLAG), trace.as_os_str().to_owned()],
    )?;
    if !out.success() {
        return Ok(Probed::new(Measurement::Failed, &out));
    }
    let pct = parse::parse_utilization(&out.stdout).map_err(|source| HarnessError::Parse {
        trace: trace.to_path_buf(),
        probe: "utilization",
        source,
    })?;
    Ok(Probed::new(Measurement::Measured(pct), &out))
}

/// Run `cfg.trials` timing trials and return the floored mean in microseconds.
///
/// Any failed trial aborts the probe with [`Measurement::Failed`]; remaining
/// trials are not run. The reported exit code is that of the last trial run.
pub fn measure_performance<R: ToolRunner + ?Sized>(
    runner: &mut R,
    cfg: &HarnessConfig,
    trace: &Path,
) -> Result<Probed<Measurement<u64>>, HarnessError> {
    let mut samples = Vec::with_capacity(cfg.trials as usize);
    let mut exit_code = None;
    for _ in 0..cfg.trials {
        let out = invoke(runner, &cfg.timer, &[trace.as_os_str().to_owned()])?;
        exit_code = out.exit_code;
        if !out.success() {
            return Ok(Probed::new(Measurement::Failed, &out));
        }
        let sample = parse::parse_performance_sample(&out.stdout, &cfg.performance_marker)
            .map_err(|source| HarnessError::Parse {
                trace: trace.to_path_buf(),
                probe: "performance",
                source,
            })?;
        match sample {
            Some(us) => samples.push(us),
            None => return Ok(Probed::new(Measurement::Failed, &out)),
        }
    }
    Ok(Probed {
        value: floor_mean(&samples).map_or(Measurement::Failed, Measurement::Measured),
        exit_code,
    })
}

/// Integer mean with floor division; `None` for an empty slice.
#[must_use]
pub fn floor_mean(samples: &[u64]) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    let total: u128 = samples.iter().map(|&s| u128::from(s)).sum();
    u64::try_from(total / samples.len() as u128).ok()
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::config::DEFAULT_CORRECTNESS_MARKER;

    fn cfg(trials: u32) -> HarnessConfig {
        HarnessConfig {
            trials,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn correctness_passes_on_marker_and_zero_exit() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, DEFAULT_CORRECTNESS_MARKER);
        let got = check_correctness(&mut runner, &cfg(1), Path::new("t/a.rep")).unwrap();
        assert_eq!(
            got,
            Probed {
                value: true,
                exit_code: Some(0)
            }
        );
        assert_eq!(runner.calls[0].0, "./runner");
        assert_eq!(runner.calls[0].1, vec!["-r", "t/a.rep"]);
    }

    #[test]
    fn correctness_nonzero_exit_fails_even_with_marker() {
        let mut runner = ScriptedRunner::default();
        runner.push(1, DEFAULT_CORRECTNESS_MARKER);
        let got = check_correctness(&mut runner, &cfg(1), Path::new("a.rep")).unwrap();
        assert!(!got.value);
        assert_eq!(got.exit_code, Some(1));
    }

    #[test]
    fn correctness_empty_output_fails() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, "");
        assert!(!check_correctness(&mut runner, &cfg(1), Path::new("a.rep")).unwrap().value);
    }

    #[test]
    fn utilization_uses_ru_flag_and_parses() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, &util_stdout("87.5"));
        let got = measure_utilization(&mut runner, &cfg(1), Path::new("a.rep")).unwrap();
        assert_eq!(got.value, Measurement::Measured(87.5));
        assert_eq!(runner.calls[0].1, vec!["-ru", "a.rep"]);
    }

    #[test]
    fn utilization_nonzero_exit_is_failed() {
        let mut runner = ScriptedRunner::default();
        runner.push(2, &util_stdout("87.5"));
        let got = measure_utilization(&mut runner, &cfg(1), Path::new("a.rep")).unwrap();
        assert_eq!(
            got,
            Probed {
                value: Measurement::Failed,
                exit_code: Some(2)
            }
        );
    }

    #[test]
    fn utilization_garbage_is_parse_error() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, "garbage");
        let err = measure_utilization(&mut runner, &cfg(1), Path::new("a.rep")).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Parse {
                probe: "utilization",
                ..
            }
        ));
    }

    #[test]
    fn performance_floor_mean_of_trials() {
        let mut runner = ScriptedRunner::default();
        for us in [1000, 2000, 3000] {
            runner.push(0, &perf_stdout(us));
        }
        let got = measure_performance(&mut runner, &cfg(3), Path::new("a.rep")).unwrap();
        assert_eq!(got.value, Measurement::Measured(2000));
        assert_eq!(runner.calls.len(), 3);
        assert!(runner.calls.iter().all(|(p, a)| p == "./performance" && a == &["a.rep"]));
    }

    #[test]
    fn performance_mean_floors() {
        let mut runner = ScriptedRunner::default();
        for us in [1, 2] {
            runner.push(0, &perf_stdout(us));
        }
        let got = measure_performance(&mut runner, &cfg(2), Path::new("a.rep")).unwrap();
        assert_eq!(got.value, Measurement::Measured(1));
    }

    #[test]
    fn performance_single_failed_trial_aborts() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, &perf_stdout(1000));
        runner.push(0, "Error\n");
        runner.push(0, &perf_stdout(3000));
        let got = measure_performance(&mut runner, &cfg(3), Path::new("a.rep")).unwrap();
        assert_eq!(got.value, Measurement::Failed);
        assert_eq!(runner.calls.len(), 2, "remaining trials are skipped");
    }

    #[test]
    fn performance_nonzero_exit_aborts() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, &perf_stdout(1000));
        runner.push(139, &perf_stdout(1000));
        let got = measure_performance(&mut runner, &cfg(3), Path::new("a.rep")).unwrap();
        assert_eq!(
            got,
            Probed {
                value: Measurement::Failed,
                exit_code: Some(139)
            }
        );
        assert_eq!(runner.calls.len(), 2);
    }

    #[test]
    fn performance_bad_duration_is_parse_error() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, "Time: soon Success\n");
        let err = measure_performance(&mut runner, &cfg(1), Path::new("a.rep")).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Parse {
                probe: "performance",
                ..
            }
        ));
    }

    #[test]
    fn spawn_failure_surfaces() {
        let mut runner = ScriptedRunner::default();
        let err = check_correctness(&mut runner, &cfg(1), Path::new("a.rep")).unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }

    #[test]
    fn floor_mean_handles_empty_and_large() {
        assert_eq!(floor_mean(&[]), None);
        assert_eq!(floor_mean(&[u64::MAX, u64::MAX]), Some(u64::MAX));
    }
}
