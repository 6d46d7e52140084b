//! CLI entrypoint for the umalloc trace harness.
//!
//! With no arguments: `make all`, then evaluate every `./traces/*.rep` and
//! print the summary table to stdout.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use umalloc_harness::structured_log::{LogEmitter, now_utc};
use umalloc_harness::{HarnessConfig, ProcessRunner, TraceOrder, run_harness};

/// Correctness, utilization and performance harness for umalloc.
#[derive(Debug, Parser)]
#[command(name = "umalloc-harness")]
#[command(about = "Evaluate umalloc against a corpus of allocation traces")]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Trace corpus directory.
    #[arg(long)]
    traces: Option<PathBuf>,
    /// Timing trials averaged per trace (also `UMALLOC_HARNESS_TRIALS`).
    #[arg(long)]
    trials: Option<u32>,
    /// Do not run the build step.
    #[arg(long)]
    skip_build: bool,
    /// Report traces in raw directory listing order instead of sorted.
    #[arg(long)]
    listing_order: bool,
    /// Structured JSONL log output path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Markdown report path; JSON is written beside it.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Exit nonzero if any trace fails correctness.
    #[arg(long)]
    require_all_pass: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut cfg = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };
    cfg.apply_env()?;
    if let Some(dir) = cli.traces {
        cfg.trace_dir = dir;
    }
    if let Some(trials) = cli.trials {
        cfg.trials = trials;
    }
    if cli.skip_build {
        cfg.build = None;
    }
    if cli.listing_order {
        cfg.order = TraceOrder::Listing;
    }

    let run_id = format!(
        "run-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    );
    let mut log = match &cli.log {
        Some(path) => LogEmitter::to_file(path, &run_id)?,
        None => LogEmitter::sink(&run_id),
    };

    eprintln!(
        "Evaluating traces in {} ({} timing trials each)",
        cfg.trace_dir.display(),
        cfg.trials
    );
    let table = run_harness(&mut ProcessRunner, &cfg, &mut log, |row| {
        eprintln!(
            "  {}: passed={} utilization={} performance={}",
            row.trace.display(),
            row.passed_label(),
            row.utilization_cell(),
            row.performance_cell()
        );
    })?;

    print!("{}", table.render());

    let summary = table.summary();
    eprintln!(
        "Evaluation complete: total={}, passed={}, failed={}",
        summary.total, summary.passed, summary.failed
    );
    if let Some(u) = summary.mean_utilization {
        eprintln!("Mean utilization over measured traces: {u:.2}");
    }
    if let Some(p) = summary.mean_performance_us {
        eprintln!("Mean performance over measured traces: {p} microseconds");
    }

    if let Some(report_path) = cli.report {
        let timestamp = now_utc();
        let json_path = table.write_reports(&report_path, "umalloc Trace Report", &timestamp)?;
        eprintln!(
            "Wrote reports to {} and {}",
            report_path.display(),
            json_path.display()
        );
    }

    if cli.require_all_pass && !summary.all_passed() {
        return Err(format!(
            "{} of {} trace(s) failed correctness",
            summary.failed, summary.total
        )
        .into());
    }

    Ok(())
}
