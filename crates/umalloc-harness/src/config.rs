//! Harness configuration.
//!
//! Defaults reproduce the classic driver layout: `./runner` as the checker,
//! `./performance` as the timing tool, `make all` as the build step and
//! `./traces/*.rep` as the corpus.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Success marker printed by the checker in correctness mode.
pub const DEFAULT_CORRECTNESS_MARKER: &str = "umalloc package passed correctness check.";
/// Success marker printed by the timing tool.
pub const DEFAULT_PERFORMANCE_MARKER: &str = "Success";
/// Number of timing trials averaged per trace.
pub const DEFAULT_TRIALS: u32 = 20;
/// Env override for the trial count.
pub const TRIALS_ENV: &str = "UMALLOC_HARNESS_TRIALS";

/// A program plus its leading arguments.
///
/// Probes append their own mode flags and the trace path after `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument vector: leading args followed by `extra`.
    #[must_use]
    pub fn argv(&self, extra: &[OsString]) -> Vec<OsString> {
        self.args
            .iter()
            .map(OsString::from)
            .chain(extra.iter().cloned())
            .collect()
    }

    /// Shell-ish rendering for diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Order in which discovered traces are evaluated and reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOrder {
    /// Lexicographic by path.
    #[default]
    Sorted,
    /// Raw directory listing order.
    Listing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub trace_dir: PathBuf,
    pub trace_extension: String,
    pub checker: ToolCommand,
    pub timer: ToolCommand,
    /// `None` skips the build step.
    pub build: Option<ToolCommand>,
    pub trials: u32,
    pub correctness_marker: String,
    pub performance_marker: String,
    pub order: TraceOrder,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            trace_dir: PathBuf::from("./traces"),
            trace_extension: String::from("rep"),
            checker: ToolCommand::new("./runner"),
            timer: ToolCommand::new("./performance"),
            build: Some(ToolCommand::new("make").with_args(["all"])),
            trials: DEFAULT_TRIALS,
            correctness_marker: String::from(DEFAULT_CORRECTNESS_MARKER),
            performance_marker: String::from(DEFAULT_PERFORMANCE_MARKER),
            order: TraceOrder::Sorted,
        }
    }
}

impl HarnessConfig {
    /// Load from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Apply `UMALLOC_HARNESS_TRIALS` if it is set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        match std::env::var(TRIALS_ENV) {
            Ok(raw) => {
                self.trials = parse_trials(&raw)?;
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials == 0 {
            return Err(invalid("trials", "must be at least 1"));
        }
        if self.trace_extension.trim().is_empty() {
            return Err(invalid("trace_extension", "must not be empty"));
        }
        if self.checker.program.trim().is_empty() {
            return Err(invalid("checker", "program must not be empty"));
        }
        if self.timer.program.trim().is_empty() {
            return Err(invalid("timer", "program must not be empty"));
        }
        if let Some(build) = &self.build
            && build.program.trim().is_empty()
        {
            return Err(invalid("build", "program must not be empty"));
        }
        if self.correctness_marker.is_empty() {
            return Err(invalid("correctness_marker", "must not be empty"));
        }
        if self.performance_marker.is_empty() {
            return Err(invalid("performance_marker", "must not be empty"));
        }
        Ok(())
    }
}

/// Parse a trial count, allowing `_` separators.
pub fn parse_trials(raw: &str) -> Result<u32, ConfigError> {
    let trials = raw
        .trim()
        .replace('_', "")
        .parse::<u32>()
        .map_err(|e| invalid("trials", format!("{raw:?}: {e}")))?;
    if trials == 0 {
        return Err(invalid("trials", "must be at least 1"));
    }
    Ok(trials)
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}
