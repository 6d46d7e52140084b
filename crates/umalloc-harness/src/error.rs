//! Error types for the harness.

use std::path::PathBuf;

use thiserror::Error;

/// A tool's stdout did not have the shape the parser expects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("utilization output has {lines} line(s), expected at least {expected}")]
    MissingLine { lines: usize, expected: usize },
    #[error("utilization line {line:?} has no token at index {index}")]
    MissingToken { line: String, index: usize },
    #[error("utilization token {token:?} is not a number")]
    BadUtilization { token: String },
    #[error("performance output has no duration token at index {index}")]
    MissingDuration { index: usize },
    #[error("performance token {token:?} is not an integer microsecond count")]
    BadDuration { token: String },
}

/// Invalid harness configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config field '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Failures that abort the whole run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot read trace directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("build step `{command}` failed (exit code {exit_code:?}): {stderr}")]
    Build {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("unparseable {probe} output for {trace}: {source}")]
    Parse {
        trace: PathBuf,
        probe: &'static str,
        #[source]
        source: ParseError,
    },
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("structured log write failed: {0}")]
    Log(#[source] std::io::Error),
    #[error("io: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reencode(text: &str) -> Result<String, HarnessError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Ok(serde_json::to_string(&value)?)
    }

    #[test]
    fn json_failures_propagate_as_harness_errors() {
        assert_eq!(reencode("{\"a\": 1}").unwrap(), "{\"a\":1}");
        let err = reencode("{\"a\": ").unwrap_err();
        assert!(matches!(err, HarnessError::Json(_)));
        assert!(err.to_string().starts_with("json serialization failed: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}
