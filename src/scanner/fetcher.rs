//! Per-token fetch loop.
//!
//! Each token id runs this loop independently: attempt the owner call,
//! classify any failure, and either finish with a terminal outcome or wait
//! out the retry schedule and try again. The loop owns its attempt counter
//! for its whole lifetime and shares nothing with sibling tokens except the
//! sink it appends its single terminal outcome to.

use crate::output::sink::{SnapshotSink, TokenOutcome};
use crate::rpc::abi::OwnerCall;
use crate::rpc::classify::{CallClassifier, CallDisposition};
use crate::rpc::client::{OwnerClient, RpcError};
use crate::runtime::telemetry::Telemetry;
use crate::scanner::backoff::{sleep_with_cancellation, RetryPolicy};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ItemFetcher {
    client: Arc<dyn OwnerClient>,
    call: Arc<OwnerCall>,
    classifier: CallClassifier,
    policy: RetryPolicy,
    sink: Arc<SnapshotSink>,
    telemetry: Arc<Telemetry>,
    cancellation: CancellationToken,
}

impl ItemFetcher {
    pub fn new(
        client: Arc<dyn OwnerClient>,
        call: Arc<OwnerCall>,
        classifier: CallClassifier,
        policy: RetryPolicy,
        sink: Arc<SnapshotSink>,
        telemetry: Arc<Telemetry>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            call,
            classifier,
            policy,
            sink,
            telemetry,
            cancellation,
        }
    }

    /// Drives one token id to a terminal outcome and appends it to the
    /// sink. Returns an error only when the run is cancelled mid-loop, in
    /// which case nothing is recorded.
    pub async fn resolve_and_record(&self, token_id: u64) -> Result<()> {
        let outcome = self.resolve(token_id).await?;
        self.telemetry.record_outcome(&outcome);
        self.sink.record(token_id, outcome);
        Ok(())
    }

    /// The retry loop itself, yielding exactly one outcome per invocation.
    pub async fn resolve(&self, token_id: u64) -> Result<TokenOutcome> {
        let mut attempt = 0usize;

        loop {
            attempt += 1;

            let error = match self.client.owner_of(&self.call, token_id).await {
                Ok(owner) => {
                    tracing::trace!(token_id, attempt, owner = %owner, "owner resolved");
                    return Ok(TokenOutcome::Owned { owner });
                }
                Err(error) => error,
            };

            if matches!(
                error.downcast_ref::<RpcError>(),
                Some(RpcError::Timeout { .. })
            ) {
                self.telemetry.record_call_timeout();
            }

            match self.classifier.classify(&error) {
                CallDisposition::PermanentAbsence => {
                    tracing::debug!(token_id, attempt, "token id reported absent");
                    return Ok(TokenOutcome::Absent);
                }
                CallDisposition::Transient | CallDisposition::Unclassified => {
                    if self.policy.is_exhausted(attempt + 1) {
                        tracing::warn!(
                            token_id,
                            attempt,
                            error = %error,
                            "retries exhausted; marking token failed"
                        );
                        return Ok(TokenOutcome::Failed {
                            reason: format!("{error:#}"),
                        });
                    }

                    let backoff = self.policy.delay_for(attempt);
                    self.telemetry.record_retry();
                    tracing::warn!(
                        token_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "owner call failed; retrying"
                    );
                    sleep_with_cancellation(backoff, &self.cancellation).await?;
                }
            }
        }
    }
}
