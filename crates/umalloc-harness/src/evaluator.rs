//! Per-trace evaluation and the top-level run.
//!
//! Each trace moves through
//! `Start -> CorrectnessChecked -> {Measured | SkippedMeasurement} -> RowRecorded`.
//! Expensive timing trials only run for traces that passed correctness.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::build_step::run_build;
use crate::config::HarnessConfig;
use crate::discovery::discover_traces;
use crate::error::HarnessError;
use crate::probes::{Measurement, Probed, check_correctness, measure_performance, measure_utilization};
use crate::report::{ReportTable, TraceReportRow};
use crate::structured_log::{LogEmitter, LogLevel, Outcome};
use crate::tool::ToolRunner;

/// Sequentially evaluates traces against one configuration.
pub struct TraceEvaluator<'a, R: ToolRunner + ?Sized> {
    runner: &'a mut R,
    config: &'a HarnessConfig,
    log: &'a mut LogEmitter,
}

impl<'a, R: ToolRunner + ?Sized> TraceEvaluator<'a, R> {
    pub fn new(runner: &'a mut R, config: &'a HarnessConfig, log: &'a mut LogEmitter) -> Self {
        Self {
            runner,
            config,
            log,
        }
    }

    /// Evaluate one trace and produce its row.
    pub fn evaluate(&mut self, trace: &Path) -> Result<TraceReportRow, HarnessError> {
        let started = Instant::now();
        let correctness = check_correctness(&mut *self.runner, self.config, trace)?;
        let passed = correctness.value;
        self.log_probe(
            trace,
            "correctness",
            if passed { Outcome::Pass } else { Outcome::Fail },
            started,
            correctness.exit_code,
            serde_json::json!({ "passed": passed }),
        )?;

        let row = if passed {
            let started = Instant::now();
            let Probed {
                value: utilization,
                exit_code,
            } = measure_utilization(&mut *self.runner, self.config, trace)?;
            self.log_probe(
                trace,
                "utilization",
                outcome_of(&utilization),
                started,
                exit_code,
                serde_json::json!({ "utilization": utilization }),
            )?;

            let started = Instant::now();
            let Probed {
                value: performance,
                exit_code,
            } = measure_performance(&mut *self.runner, self.config, trace)?;
            self.log_probe(
                trace,
                "performance",
                outcome_of(&performance),
                started,
                exit_code,
                serde_json::json!({ "trials": self.config.trials, "performance": performance }),
            )?;

            TraceReportRow {
                trace: trace.to_path_buf(),
                passed: true,
                utilization,
                performance,
            }
        } else {
            for probe in ["utilization", "performance"] {
                let entry = self
                    .log
                    .entry(LogLevel::Debug, "probe_skipped")
                    .with_trace_file(trace)
                    .with_probe(probe)
                    .with_outcome(Outcome::Skip);
                self.log.emit_entry(entry).map_err(HarnessError::Log)?;
            }
            TraceReportRow::failed(trace.to_path_buf())
        };

        let entry = self
            .log
            .entry(LogLevel::Info, "trace_done")
            .with_trace_file(trace)
            .with_outcome(if row.passed { Outcome::Pass } else { Outcome::Fail })
            .with_duration(started.elapsed())
            .with_details(serde_json::to_value(&row)?);
        self.log.emit_entry(entry).map_err(HarnessError::Log)?;
        Ok(row)
    }

    /// Fold traces into a table, preserving input order.
    ///
    /// `on_row` sees each row as soon as it is recorded.
    pub fn evaluate_all<I, F>(
        &mut self,
        traces: I,
        mut on_row: F,
    ) -> Result<ReportTable, HarnessError>
    where
        I: IntoIterator<Item = PathBuf>,
        F: FnMut(&TraceReportRow),
    {
        let mut rows = Vec::new();
        for trace in traces {
            let row = self.evaluate(&trace)?;
            on_row(&row);
            rows.push(row);
        }
        Ok(ReportTable::new(rows))
    }

    fn log_probe(
        &mut self,
        trace: &Path,
        probe: &str,
        outcome: Outcome,
        started: Instant,
        exit_code: Option<i32>,
        details: serde_json::Value,
    ) -> Result<(), HarnessError> {
        let level = if outcome == Outcome::Pass {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        let mut entry = self
            .log
            .entry(level, "probe_done")
            .with_trace_file(trace)
            .with_probe(probe)
            .with_outcome(outcome)
            .with_duration(started.elapsed())
            .with_details(details);
        if let Some(code) = exit_code {
            entry = entry.with_exit_code(code);
        }
        self.log.emit_entry(entry).map_err(HarnessError::Log)
    }
}

fn outcome_of<T>(m: &Measurement<T>) -> Outcome {
    match m {
        Measurement::Measured(_) => Outcome::Pass,
        Measurement::Failed => Outcome::Fail,
        Measurement::NotMeasured => Outcome::Skip,
    }
}

/// Build, discover and evaluate every trace.
///
/// `on_row` is called after each trace is recorded.
pub fn run_harness<R, F>(
    runner: &mut R,
    config: &HarnessConfig,
    log: &mut LogEmitter,
    on_row: F,
) -> Result<ReportTable, HarnessError>
where
    R: ToolRunner + ?Sized,
    F: FnMut(&TraceReportRow),
{
    config.validate()?;

    match &config.build {
        Some(cmd) => {
            let entry = log
                .entry(LogLevel::Info, "build_start")
                .with_probe("build")
                .with_details(serde_json::json!({ "command": cmd.display() }));
            log.emit_entry(entry).map_err(HarnessError::Log)?;
            let built = match run_build(&mut *runner, cmd) {
                Ok(built) => built,
                Err(err) => {
                    let entry = log
                        .entry(LogLevel::Error, "build_done")
                        .with_probe("build")
                        .with_outcome(Outcome::Error)
                        .with_details(serde_json::json!({ "error": err.to_string() }));
                    log.emit_entry(entry).map_err(HarnessError::Log)?;
                    log.flush().map_err(HarnessError::Log)?;
                    return Err(err);
                }
            };
            let entry = log
                .entry(LogLevel::Info, "build_done")
                .with_probe("build")
                .with_outcome(Outcome::Pass)
                .with_duration(built.elapsed);
            log.emit_entry(entry).map_err(HarnessError::Log)?;
        }
        None => {
            log.emit(LogLevel::Info, "build_skipped")
                .map_err(HarnessError::Log)?;
        }
    }

    let traces = discover_traces(&config.trace_dir, &config.trace_extension, config.order)?;
    let entry = log
        .entry(LogLevel::Info, "discovery")
        .with_details(serde_json::json!({
            "trace_dir": config.trace_dir.display().to_string(),
            "extension": config.trace_extension,
            "count": traces.len(),
        }));
    log.emit_entry(entry).map_err(HarnessError::Log)?;

    let result =
        TraceEvaluator::new(&mut *runner, config, &mut *log).evaluate_all(traces, on_row);
    let (level, details) = match &result {
        Ok(table) => (LogLevel::Info, serde_json::to_value(table.summary())?),
        Err(err) => (
            LogLevel::Error,
            serde_json::json!({ "error": err.to_string() }),
        ),
    };
    let entry = log.entry(level, "run_done").with_details(details);
    log.emit_entry(entry).map_err(HarnessError::Log)?;
    log.flush().map_err(HarnessError::Log)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CORRECTNESS_MARKER;
    use crate::probes::testing::{ScriptedRunner, perf_stdout, util_stdout};

    fn cfg(trials: u32) -> HarnessConfig {
        HarnessConfig {
            trials,
            build: None,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn failed_correctness_short_circuits_measurement() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, "umalloc package failed.");
        let config = cfg(20);
        let mut log = LogEmitter::sink("test");
        let row = TraceEvaluator::new(&mut runner, &config, &mut log)
            .evaluate(Path::new("a.rep"))
            .unwrap();
        assert_eq!(row, TraceReportRow::failed(PathBuf::from("a.rep")));
        assert_eq!(runner.calls.len(), 1, "only the correctness probe runs");
    }

    #[test]
    fn passed_trace_runs_each_probe_once() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, DEFAULT_CORRECTNESS_MARKER);
        runner.push(0, &util_stdout("91.25"));
        for us in [10, 20, 30, 41] {
            runner.push(0, &perf_stdout(us));
        }
        let config = cfg(4);
        let mut log = LogEmitter::sink("test");
        let row = TraceEvaluator::new(&mut runner, &config, &mut log)
            .evaluate(Path::new("a.rep"))
            .unwrap();
        assert!(row.passed);
        assert_eq!(row.utilization, Measurement::Measured(91.25));
        assert_eq!(row.performance, Measurement::Measured(25));

        let flags: Vec<&str> = runner.calls.iter().map(|(_, a)| a[0].as_str()).collect();
        assert_eq!(flags, vec!["-r", "-ru", "a.rep", "a.rep", "a.rep", "a.rep"]);
    }

    #[test]
    fn failed_utilization_still_runs_performance() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, DEFAULT_CORRECTNESS_MARKER);
        runner.push(1, "");
        runner.push(0, &perf_stdout(7));
        let config = cfg(1);
        let mut log = LogEmitter::sink("test");
        let row = TraceEvaluator::new(&mut runner, &config, &mut log)
            .evaluate(Path::new("a.rep"))
            .unwrap();
        assert!(row.passed);
        assert_eq!(row.passed_label(), "Yes");
        assert_eq!(row.utilization, Measurement::Failed);
        assert_eq!(row.performance, Measurement::Measured(7));
    }

    #[test]
    fn log_entries_carry_tool_exit_codes() {
        let dir = std::env::temp_dir().join(format!("umalloc-eval-exit-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let log_path = dir.join("probes.jsonl");

        let mut runner = ScriptedRunner::default();
        runner.push(0, DEFAULT_CORRECTNESS_MARKER);
        runner.push(3, "");
        runner.push(0, &perf_stdout(7));
        runner.push(139, "");
        let config = cfg(2);
        let mut log = LogEmitter::to_file(&log_path, "test").unwrap();
        TraceEvaluator::new(&mut runner, &config, &mut log)
            .evaluate(Path::new("a.rep"))
            .unwrap();
        log.flush().unwrap();
        drop(log);

        let content = std::fs::read_to_string(&log_path).unwrap();
        let codes: Vec<(String, Option<i64>)> = content
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
            .filter(|v| v["event"] == "probe_done")
            .map(|v| (v["probe"].as_str().unwrap().to_string(), v["exit_code"].as_i64()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("correctness".to_string(), Some(0)),
                ("utilization".to_string(), Some(3)),
                ("performance".to_string(), Some(139)),
            ]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn evaluate_all_preserves_input_order() {
        let mut runner = ScriptedRunner::default();
        runner.push(1, "");
        runner.push(0, DEFAULT_CORRECTNESS_MARKER);
        runner.push(0, &util_stdout("50"));
        runner.push(0, &perf_stdout(5));
        let config = cfg(1);
        let mut log = LogEmitter::sink("test");
        let mut seen = Vec::new();
        let table = TraceEvaluator::new(&mut runner, &config, &mut log)
            .evaluate_all(
                vec![PathBuf::from("z.rep"), PathBuf::from("a.rep")],
                |row| seen.push(row.trace.clone()),
            )
            .unwrap();
        let order: Vec<&Path> = table.rows().iter().map(|r| r.trace.as_path()).collect();
        assert_eq!(order, vec![Path::new("z.rep"), Path::new("a.rep")]);
        assert_eq!(seen, vec![PathBuf::from("z.rep"), PathBuf::from("a.rep")]);
        assert!(!table.rows()[0].passed);
        assert!(table.rows()[1].passed);
    }

    #[test]
    fn parse_failure_aborts_the_run() {
        let mut runner = ScriptedRunner::default();
        runner.push(0, DEFAULT_CORRECTNESS_MARKER);
        runner.push(0, "truncated\n");
        let config = cfg(1);
        let mut log = LogEmitter::sink("test");
        let err = TraceEvaluator::new(&mut runner, &config, &mut log)
            .evaluate_all(vec![PathBuf::from("a.rep"), PathBuf::from("b.rep")], |_| {})
            .unwrap_err();
        assert!(matches!(err, HarnessError::Parse { .. }));
    }

    #[test]
    fn run_harness_stops_on_build_failure() {
        let mut runner = ScriptedRunner::default();
        runner.push(2, "");
        let config = HarnessConfig {
            trace_dir: PathBuf::from("/nonexistent-umalloc-traces"),
            ..HarnessConfig::default()
        };
        let mut log = LogEmitter::sink("test");
        let err = run_harness(&mut runner, &config, &mut log, |_| {}).unwrap_err();
        assert!(matches!(err, HarnessError::Build { .. }));
        assert_eq!(runner.calls.len(), 1);
    }

    #[test]
    fn run_harness_rejects_invalid_config() {
        let mut runner = ScriptedRunner::default();
        let config = HarnessConfig {
            trials: 0,
            ..cfg(1)
        };
        let mut log = LogEmitter::sink("test");
        let err = run_harness(&mut runner, &config, &mut log, |_| {}).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
        assert!(runner.calls.is_empty());
    }
}
