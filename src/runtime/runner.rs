use crate::output::{append_failures, write_owner_table, SnapshotSink};
use crate::rpc::abi::OwnerCall;
use crate::rpc::classify::CallClassifier;
use crate::rpc::AsyncRpcClient;
use crate::runtime::config::ScanConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::scanner::fetcher::ItemFetcher;
use crate::scanner::scheduler::{BatchScheduler, BatchSchedulerParams};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Summary of a completed scan. `tokens_failed > 0` does not make the run
/// itself a failure; exhausted ids are reported here and in the diagnostic
/// log.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub total_tokens: u64,
    pub owners_found: u64,
    pub tokens_absent: u64,
    pub tokens_failed: u64,
    pub output_path: PathBuf,
}

/// Coordinates one scan end to end: setup, batched fetching, and the final
/// persistence pass. Handles OS signals for graceful aborts.
pub struct Runner {
    config: ScanConfig,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
}

impl Runner {
    /// Creates a runner with its own root [`CancellationToken`].
    pub fn new(config: ScanConfig) -> Self {
        Self::with_cancellation_token(config, CancellationToken::new())
    }

    /// Creates a runner wired to an existing shutdown token so callers can
    /// integrate their own signal handling or cancellation strategy.
    pub fn with_cancellation_token(config: ScanConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            telemetry: Arc::new(Telemetry::default()),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Returns a clone of the root shutdown token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs the scan to completion and persists the results.
    ///
    /// Setup failures (bad descriptor, unreachable endpoint) and
    /// cancellation abort before anything is written; per-token failures do
    /// not. The owner table only ever appears complete and sorted.
    pub async fn run(&self) -> Result<ScanReport> {
        let config = &self.config;

        let call = OwnerCall::load(
            config.abi(),
            config.owner_function(),
            config.contract_address(),
        )
        .context("failed to load ABI descriptor")?;

        let client =
            Arc::new(AsyncRpcClient::from_config(config).context("failed to build RPC client")?);

        let head = client
            .block_number()
            .await
            .context("rpc endpoint is unreachable")?;

        tracing::info!(
            contract = %config.contract_address(),
            start_id = config.start_id(),
            end_id = config.end_id(),
            batch_size = config.batch_size(),
            chain_head = head,
            "starting owner scan"
        );

        let sink = Arc::new(SnapshotSink::new());
        let reporter_token = self.shutdown.child_token();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            config.total_tokens(),
            reporter_token.clone(),
            config.metrics_interval(),
        );

        let fetcher = ItemFetcher::new(
            client,
            Arc::new(call),
            CallClassifier::new(config.absence_signature()),
            config.retry_policy(),
            sink.clone(),
            self.telemetry.clone(),
            self.shutdown.clone(),
        );
        let scheduler = BatchScheduler::new(BatchSchedulerParams {
            fetcher,
            telemetry: self.telemetry.clone(),
            start_id: config.start_id(),
            end_id: config.end_id(),
            batch_size: config.batch_size(),
            pacing_delay: config.pacing_delay(),
            cancellation: self.shutdown.clone(),
        });

        let scan_result = scheduler.run().await;
        reporter_token.cancel();
        let _ = reporter.await;
        scan_result?;

        sink.verify_complete(config.start_id(), config.end_id())
            .context("scan finished with an incomplete snapshot")?;

        let rows = sink.sorted_rows();
        let failures = sink.failures();

        write_owner_table(config.output_path(), &rows)
            .context("failed to persist owner table")?;
        append_failures(config.error_log_path(), &failures)
            .context("failed to persist diagnostic log")?;

        let snapshot = self.telemetry.snapshot();
        let report = ScanReport {
            total_tokens: config.total_tokens(),
            owners_found: snapshot.owners_found,
            tokens_absent: snapshot.tokens_absent,
            tokens_failed: snapshot.tokens_failed,
            output_path: config.output_path().clone(),
        };

        tracing::info!(
            owners_found = report.owners_found,
            tokens_absent = report.tokens_absent,
            tokens_failed = report.tokens_failed,
            output = %report.output_path.display(),
            "owner scan complete"
        );

        Ok(report)
    }

    /// Runs until completion or a Ctrl-C (SIGINT), whichever comes first.
    /// An interrupted scan leaves no output files behind.
    pub async fn run_until_ctrl_c(&self) -> Result<ScanReport> {
        tokio::select! {
            result = self.run() => result,
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; aborting scan");
                self.shutdown.cancel();
                Err(anyhow!("scan cancelled"))
            }
        }
    }
}
