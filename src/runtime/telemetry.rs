use crate::output::sink::TokenOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    owners_found: AtomicU64,
    tokens_absent: AtomicU64,
    tokens_failed: AtomicU64,
    call_retries: AtomicU64,
    call_timeouts: AtomicU64,
    batches_completed: AtomicU64,
}

impl Telemetry {
    pub fn record_outcome(&self, outcome: &TokenOutcome) {
        let counter = match outcome {
            TokenOutcome::Owned { .. } => &self.owners_found,
            TokenOutcome::Absent => &self.tokens_absent,
            TokenOutcome::Failed { .. } => &self.tokens_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.call_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_timeout(&self) {
        self.call_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_completed(&self) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Tokens that have reached a terminal outcome so far.
    pub fn completed(&self) -> u64 {
        self.owners_found.load(Ordering::Relaxed)
            + self.tokens_absent.load(Ordering::Relaxed)
            + self.tokens_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            owners_found: self.owners_found.load(Ordering::Relaxed),
            tokens_absent: self.tokens_absent.load(Ordering::Relaxed),
            tokens_failed: self.tokens_failed.load(Ordering::Relaxed),
            call_retries: self.call_retries.load(Ordering::Relaxed),
            call_timeouts: self.call_timeouts.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub owners_found: u64,
    pub tokens_absent: u64,
    pub tokens_failed: u64,
    pub call_retries: u64,
    pub call_timeouts: u64,
    pub batches_completed: u64,
}

impl TelemetrySnapshot {
    pub fn completed(&self) -> u64 {
        self.owners_found + self.tokens_absent + self.tokens_failed
    }
}

/// Spawns a background task that periodically logs scan progress, retry
/// pressure, and failure counts.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    total_tokens: u64,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "ownerscan::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let completed_delta = current.completed().saturating_sub(last_snapshot.completed());
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        completed_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "ownerscan::metrics",
                        completed = current.completed(),
                        total = total_tokens,
                        throughput = format!("{throughput:.2}"),
                        owners_found = current.owners_found,
                        tokens_absent = current.tokens_absent,
                        tokens_failed = current.tokens_failed,
                        call_retries = current.call_retries,
                        call_timeouts = current.call_timeouts,
                        batches_completed = current.batches_completed,
                        "scan metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
