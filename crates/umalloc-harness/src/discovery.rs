//! Trace corpus discovery.

use std::path::{Path, PathBuf};

use crate::config::TraceOrder;
use crate::error::HarnessError;

/// Enumerate regular files in `dir` whose name ends with `.{extension}`.
///
/// A bare `.rep` file name counts as a trace. Paths are returned joined onto
/// `dir`. Subdirectories are not descended.
pub fn discover_traces(
    dir: &Path,
    extension: &str,
    order: TraceOrder,
) -> Result<Vec<PathBuf>, HarnessError> {
    let discovery_err = |source: std::io::Error| HarnessError::Discovery {
        path: dir.to_path_buf(),
        source,
    };
    let suffix = format!(".{}", extension.trim_start_matches('.'));

    let mut traces = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(discovery_err)? {
        let entry = entry.map_err(discovery_err)?;
        let name = entry.file_name();
        if !name.to_str().is_some_and(|n| n.ends_with(&suffix)) {
            continue;
        }
        if entry.file_type().map_err(discovery_err)?.is_dir() {
            continue;
        }
        traces.push(entry.path());
    }

    if order == TraceOrder::Sorted {
        traces.sort();
    }
    Ok(traces)
}
