//! Report generation for harness results.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::probes::Measurement;

/// Fixed column headers of the text table.
pub const HEADERS: [&str; 4] = ["Trace", "Passed", "Utilization", "Performance (microseconds)"];

/// Rendered in place of a utilization or performance figure that was not taken.
pub const SENTINEL: &str = "-1";

/// One evaluated trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceReportRow {
    pub trace: PathBuf,
    pub passed: bool,
    pub utilization: Measurement<f64>,
    /// Floored mean microseconds over all trials.
    pub performance: Measurement<u64>,
}

impl TraceReportRow {
    /// Row for a trace that failed correctness.
    #[must_use]
    pub fn failed(trace: PathBuf) -> Self {
        Self {
            trace,
            passed: false,
            utilization: Measurement::NotMeasured,
            performance: Measurement::NotMeasured,
        }
    }

    #[must_use]
    pub fn passed_label(&self) -> &'static str {
        if self.passed { "Yes" } else { "No" }
    }

    #[must_use]
    pub fn utilization_cell(&self) -> String {
        self.utilization
            .value()
            .map_or_else(|| SENTINEL.to_string(), |pct| pct.to_string())
    }

    #[must_use]
    pub fn performance_cell(&self) -> String {
        self.performance
            .value()
            .map_or_else(|| SENTINEL.to_string(), |us| us.to_string())
    }

    fn cells(&self) -> [String; 4] {
        [
            self.trace.display().to_string(),
            self.passed_label().to_string(),
            self.utilization_cell(),
            self.performance_cell(),
        ]
    }
}

/// Aggregate figures over all rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Mean over traces with a measured utilization.
    pub mean_utilization: Option<f64>,
    /// Floored mean over traces with a measured performance.
    pub mean_performance_us: Option<u64>,
}

impl ReportSummary {
    #[must_use]
    pub fn from_rows(rows: &[TraceReportRow]) -> Self {
        let total = rows.len();
        let passed = rows.iter().filter(|r| r.passed).count();
        let utils: Vec<f64> = rows.iter().filter_map(|r| r.utilization.value()).collect();
        let perfs: Vec<u64> = rows.iter().filter_map(|r| r.performance.value()).collect();
        let mean_utilization =
            (!utils.is_empty()).then(|| utils.iter().sum::<f64>() / utils.len() as f64);
        Self {
            total,
            passed,
            failed: total - passed,
            mean_utilization,
            mean_performance_us: crate::probes::floor_mean(&perfs),
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// SHA-256 fingerprint of one trace input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceArtifact {
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Ordered rows plus fixed headers. Built once at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    rows: Vec<TraceReportRow>,
}

impl ReportTable {
    #[must_use]
    pub fn new(rows: Vec<TraceReportRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[TraceReportRow] {
        &self.rows
    }

    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_rows(&self.rows)
    }

    /// Render as an aligned plain-text table.
    ///
    /// Text columns are left-aligned. Numeric columns are right-aligned on
    /// their decimal point. Each column is underlined with dashes and
    /// separated by two spaces.
    #[must_use]
    pub fn render(&self) -> String {
        let numeric = [false, false, true, true];
        let mut cells: Vec<[String; 4]> = self.rows.iter().map(TraceReportRow::cells).collect();
        for col in (0..4).filter(|&c| numeric[c]) {
            align_decimal(cells.iter_mut().map(|row| &mut row[col]));
        }
        let mut widths = HEADERS.map(str::len);
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let mut push_line = |fields: [&str; 4]| {
            let mut line = String::new();
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    line.push_str("  ");
                }
                let w = widths[i];
                if numeric[i] {
                    line.push_str(&format!("{field:>w$}"));
                } else {
                    line.push_str(&format!("{field:<w$}"));
                }
            }
            out.push_str(line.trim_end());
            out.push('\n');
        };

        push_line(HEADERS);
        let rules = widths.map(|w| "-".repeat(w));
        push_line([&rules[0], &rules[1], &rules[2], &rules[3]]);
        for row in &cells {
            push_line([&row[0], &row[1], &row[2], &row[3]]);
        }
        out
    }

    /// Render as a markdown report with a summary block.
    #[must_use]
    pub fn to_markdown(&self, title: &str, timestamp: &str) -> String {
        let summary = self.summary();
        let mut out = String::new();
        out.push_str(&format!("# {title}\n\n"));
        out.push_str(&format!("- Timestamp: {timestamp}\n"));
        out.push_str(&format!("- Traces: {}\n", summary.total));
        out.push_str(&format!("- Passed: {}\n", summary.passed));
        out.push_str(&format!("- Failed: {}\n", summary.failed));
        if let Some(u) = summary.mean_utilization {
            out.push_str(&format!("- Mean utilization: {u:.2}\n"));
        }
        if let Some(p) = summary.mean_performance_us {
            out.push_str(&format!("- Mean performance (microseconds): {p}\n"));
        }
        out.push('\n');

        out.push_str(&format!("| {} |\n", HEADERS.join(" | ")));
        out.push_str("|-------|--------|-------------|----------------------------|\n");
        for r in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.trace.display(),
                r.passed_label(),
                r.utilization_cell(),
                r.performance_cell()
            ));
        }
        out
    }

    /// Fingerprint every trace file in row order.
    pub fn artifact_index(&self) -> Result<Vec<TraceArtifact>, HarnessError> {
        self.rows
            .iter()
            .map(|r| {
                let data = std::fs::read(&r.trace).map_err(|source| HarnessError::Io {
                    path: r.trace.clone(),
                    source,
                })?;
                Ok(TraceArtifact {
                    path: r.trace.display().to_string(),
                    sha256: sha256_hex(&data),
                    size_bytes: data.len() as u64,
                })
            })
            .collect()
    }

    /// Machine-readable report: rows, summary and trace fingerprints.
    pub fn to_json(&self, title: &str, timestamp: &str) -> Result<String, HarnessError> {
        let doc = serde_json::json!({
            "title": title,
            "timestamp": timestamp,
            "headers": HEADERS,
            "summary": self.summary(),
            "rows": self.rows,
            "artifacts": self.artifact_index()?,
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Write `<path>` as markdown and `<path>.json` beside it.
    pub fn write_reports(
        &self,
        path: &Path,
        title: &str,
        timestamp: &str,
    ) -> Result<PathBuf, HarnessError> {
        std::fs::write(path, self.to_markdown(title, timestamp)).map_err(|source| {
            HarnessError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let json_path = path.with_extension("json");
        let json = self.to_json(title, timestamp)?;
        std::fs::write(&json_path, json).map_err(|source| HarnessError::Io {
            path: json_path.clone(),
            source,
        })?;
        Ok(json_path)
    }
}

/// Pad numeric cells on the right so their decimal points share a column
/// once right-aligned. Cells without a fraction are treated as ending in `.`.
fn align_decimal<'a>(cells: impl Iterator<Item = &'a mut String>) {
    let mut cells: Vec<&mut String> = cells.collect();
    let fraction = |cell: &str| cell.find('.').map_or(0, |dot| cell.len() - dot);
    let widest = cells.iter().map(|c| fraction(c)).max().unwrap_or(0);
    for cell in &mut cells {
        let pad = widest - fraction(cell);
        cell.extend(std::iter::repeat_n(' ', pad));
    }
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    use std::fmt::Write;
    let digest = sha2::Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}
