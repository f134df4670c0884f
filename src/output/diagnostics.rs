//! Append-only failure log, one line per retry-exhausted token id.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Appends one diagnostic line per failure. The file is only created when
/// there is something to report.
pub fn append_failures(path: &Path, failures: &[(u64, String)]) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open diagnostic log {}", path.display()))?;

    for (token_id, reason) in failures {
        writeln!(file, "Error fetching owner for token ID {token_id}: {reason}")
            .context("failed to append diagnostic line")?;
    }

    Ok(())
}
