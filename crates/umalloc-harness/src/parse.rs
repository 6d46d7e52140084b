//! Parsers for checker and timing tool stdout.
//!
//! These are deliberately separate from process invocation so the expected
//! output layout can change without touching orchestration.
//!
//! Expected shapes:
//! - correctness: stdout contains the success marker verbatim.
//! - utilization: line index 4, whitespace token index 3 is a float,
//!   e.g. `Utilization: averaged at 87.5 percent`.
//! - performance: stdout contains the success marker and whitespace token
//!   index 1 (counted across the whole output) is an integer microsecond count.

use crate::error::ParseError;

/// Line index (0-based) holding the utilization figure.
pub const UTILIZATION_LINE: usize = 4;
/// Token index (0-based) of the utilization figure within its line.
pub const UTILIZATION_TOKEN: usize = 3;
/// Token index (0-based) of the duration within performance output.
pub const DURATION_TOKEN: usize = 1;

/// True iff `marker` appears verbatim in `stdout`.
#[must_use]
pub fn passed_correctness(stdout: &str, marker: &str) -> bool {
    stdout.contains(marker)
}

pub fn parse_utilization(stdout: &str) -> Result<f64, ParseError> {
    let lines: Vec<&str> = stdout.split('\n').collect();
    let line = lines.get(UTILIZATION_LINE).ok_or(ParseError::MissingLine {
        lines: lines.len(),
        expected: UTILIZATION_LINE + 1,
    })?;
    let token = line
        .split_whitespace()
        .nth(UTILIZATION_TOKEN)
        .ok_or_else(|| ParseError::MissingToken {
            line: (*line).to_string(),
            index: UTILIZATION_TOKEN,
        })?;
    let value = token
        .parse::<f64>()
        .map_err(|_| ParseError::BadUtilization {
            token: token.to_string(),
        })?;
    if !value.is_finite() {
        return Err(ParseError::BadUtilization {
            token: token.to_string(),
        });
    }
    Ok(value)
}

/// Parse one timing trial.
///
/// `Ok(None)` when the success marker is absent (the trial failed).
pub fn parse_performance_sample(stdout: &str, marker: &str) -> Result<Option<u64>, ParseError> {
    if !stdout.contains(marker) {
        return Ok(None);
    }
    let token = stdout
        .split_whitespace()
        .nth(DURATION_TOKEN)
        .ok_or(ParseError::MissingDuration {
            index: DURATION_TOKEN,
        })?;
    token
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ParseError::BadDuration {
            token: token.to_string(),
        })
}
