//! Persists the owner table as CSV, ascending by token id.
//!
//! The table is written to a temporary sibling and renamed into place so an
//! aborted run can never leave a truncated or unsorted file behind. Failed
//! ids are excluded here; they live in the diagnostic log.

use crate::output::sink::TokenOutcome;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const OWNER_COLUMN: &str = "Owner Address";
pub const TOKEN_ID_COLUMN: &str = "Token ID";

/// Writes the full owner table in one pass. `rows` must already be sorted
/// ascending by token id (the sink guarantees this).
pub fn write_owner_table(path: &Path, rows: &[(u64, TokenOutcome)]) -> Result<()> {
    let staging = staging_path(path);

    let mut writer = csv::Writer::from_path(&staging)
        .with_context(|| format!("failed to create owner table {}", staging.display()))?;

    writer
        .write_record([OWNER_COLUMN, TOKEN_ID_COLUMN])
        .context("failed to write owner table header")?;

    for (token_id, outcome) in rows {
        let owner = match outcome {
            TokenOutcome::Owned { owner } => owner.to_checksum(None),
            TokenOutcome::Absent => String::new(),
            TokenOutcome::Failed { .. } => continue,
        };
        let token_id_field = token_id.to_string();
        writer
            .write_record([owner.as_str(), token_id_field.as_str()])
            .with_context(|| format!("failed to write owner row for token {token_id}"))?;
    }

    writer.flush().context("failed to flush owner table")?;
    drop(writer);

    std::fs::rename(&staging, path).with_context(|| {
        format!(
            "failed to move owner table into place at {}",
            path.display()
        )
    })?;

    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
