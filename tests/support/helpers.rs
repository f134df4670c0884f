use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ownerscan::ScanConfigBuilder;

pub const CONTRACT: &str = "0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D";

pub fn init_tracing() {
    ownerscan::init_tracing();
}

/// Builder preset with test-friendly timings: fast retries, short pacing,
/// outputs routed into the given directory.
pub fn test_config(url: &str, dir: &Path, start_id: u64, end_id: u64) -> ScanConfigBuilder {
    ownerscan::ScanConfig::builder()
        .rpc_url(url)
        .contract_address(CONTRACT)
        .start_id(start_id)
        .end_id(end_id)
        .pacing_delay(Duration::from_millis(5))
        .base_backoff(Duration::from_millis(5))
        .max_backoff(Duration::from_millis(20))
        .request_timeout(Duration::from_secs(2))
        .output_path(dir.join("owners.csv"))
        .error_log_path(dir.join("owner_errors.log"))
}

/// Reads the persisted owner table back as `(owner, token_id)` pairs,
/// asserting the expected header on the way.
pub fn read_table(path: &Path) -> Result<Vec<(String, u64)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open owner table {}", path.display()))?;

    let headers = reader.headers().context("owner table has no header")?;
    anyhow::ensure!(
        headers.iter().collect::<Vec<_>>() == vec!["Owner Address", "Token ID"],
        "unexpected owner table header: {headers:?}"
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read owner table row")?;
        let owner = record.get(0).unwrap_or_default().to_string();
        let token_id = record
            .get(1)
            .unwrap_or_default()
            .parse::<u64>()
            .context("owner table row has a non-numeric token id")?;
        rows.push((owner, token_id));
    }

    Ok(rows)
}

pub fn assert_strictly_ascending(rows: &[(String, u64)]) {
    for pair in rows.windows(2) {
        assert!(
            pair[0].1 < pair[1].1,
            "owner table rows out of order: {} before {}",
            pair[0].1,
            pair[1].1
        );
    }
}
