//! Benchmark and correctness harness for umalloc.
//!
//! This crate provides:
//! - Build step: rebuild the checker and timing tools, aborting on failure
//! - Trace discovery: enumerate `.rep` trace files from the corpus directory
//! - Probes: correctness, utilization and averaged performance per trace
//! - Evaluation: short-circuit per-trace sequencing folded into one table
//! - Report generation: aligned text table plus markdown/JSON reports

#![forbid(unsafe_code)]

pub mod build_step;
pub mod config;
pub mod discovery;
pub mod error;
pub mod evaluator;
pub mod parse;
pub mod probes;
pub mod report;
pub mod structured_log;
pub mod tool;

pub use config::{HarnessConfig, ToolCommand, TraceOrder};
pub use error::{ConfigError, HarnessError, ParseError};
pub use evaluator::{TraceEvaluator, run_harness};
pub use probes::{Measurement, Probed};
pub use report::{ReportSummary, ReportTable, TraceReportRow};
pub use tool::{ProcessRunner, ToolOutput, ToolRunner};
