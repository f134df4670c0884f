//! Drives the token range through the fetchers, one bounded batch at a
//! time.
//!
//! Batches are a pacing mechanism, not a correctness one: every id still
//! reaches exactly one terminal outcome whatever the batch size, and the
//! sink re-establishes token-id order on the way out. The barrier between
//! batches (wait for every fetcher, then pause) is what bounds concurrent
//! outstanding calls and smooths the call rate against rate limits.

use crate::runtime::telemetry::Telemetry;
use crate::scanner::backoff::sleep_with_cancellation;
use crate::scanner::fetcher::ItemFetcher;
use anyhow::{bail, Result};
use futures::future::join_all;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct BatchSchedulerParams {
    pub fetcher: ItemFetcher,
    pub telemetry: Arc<Telemetry>,
    pub start_id: u64,
    pub end_id: u64,
    pub batch_size: usize,
    pub pacing_delay: Duration,
    pub cancellation: CancellationToken,
}

pub struct BatchScheduler {
    fetcher: ItemFetcher,
    telemetry: Arc<Telemetry>,
    start_id: u64,
    end_id: u64,
    batch_size: usize,
    pacing_delay: Duration,
    cancellation: CancellationToken,
}

impl BatchScheduler {
    pub fn new(params: BatchSchedulerParams) -> Self {
        let BatchSchedulerParams {
            fetcher,
            telemetry,
            start_id,
            end_id,
            batch_size,
            pacing_delay,
            cancellation,
        } = params;

        Self {
            fetcher,
            telemetry,
            start_id,
            end_id,
            batch_size: batch_size.max(1),
            pacing_delay,
            cancellation,
        }
    }

    /// Runs every batch to completion in ascending id order. Returns an
    /// error only when the run is cancelled; per-token failures are
    /// terminal outcomes in the sink, not errors here.
    pub async fn run(&self) -> Result<()> {
        let windows = token_windows(self.start_id, self.end_id, self.batch_size);
        let total_batches = windows.len();

        for (index, window) in windows.into_iter().enumerate() {
            if self.cancellation.is_cancelled() {
                bail!("scan cancelled");
            }

            tracing::debug!(
                batch = index + 1,
                batches = total_batches,
                first = *window.start(),
                last = *window.end(),
                "dispatching batch"
            );

            let fetches = window.map(|token_id| self.fetcher.resolve_and_record(token_id));
            let results = join_all(fetches).await;

            if results.iter().any(Result::is_err) {
                bail!("scan cancelled");
            }

            self.telemetry.record_batch_completed();

            if index + 1 < total_batches {
                sleep_with_cancellation(self.pacing_delay, &self.cancellation).await?;
            }
        }

        Ok(())
    }
}

/// Splits `[start_id, end_id]` into consecutive windows of `batch_size`
/// ids; the final window may be shorter.
pub(crate) fn token_windows(
    start_id: u64,
    end_id: u64,
    batch_size: usize,
) -> Vec<RangeInclusive<u64>> {
    debug_assert!(start_id <= end_id);
    debug_assert!(batch_size > 0);

    let step = batch_size.max(1) as u64;
    let mut windows = Vec::new();
    let mut first = start_id;

    while first <= end_id {
        let last = first.saturating_add(step - 1).min(end_id);
        windows.push(first..=last);
        if last == end_id {
            break;
        }
        first = last + 1;
    }

    windows
}
