use crate::rpc::abi::AbiSource;
use crate::rpc::classify::AbsenceSignature;
use crate::runtime::telemetry;
use crate::scanner::backoff::RetryPolicy;
use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_PACING_DELAY_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ATTEMPTS: usize = 5;
const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
const DEFAULT_BACKOFF_GROWTH: u32 = 2;
const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;
const DEFAULT_OWNER_FUNCTION: &str = "ownerOf";
const DEFAULT_OUTPUT_PATH: &str = "owners.csv";
const DEFAULT_ERROR_LOG_PATH: &str = "owner_errors.log";

/// Runtime configuration for one owner scan.
///
/// All instances must be constructed via [`ScanConfig::builder`] or
/// [`ScanConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    rpc_url: String,
    contract_address: Address,
    abi: AbiSource,
    owner_function: String,
    start_id: u64,
    end_id: u64,
    batch_size: usize,
    pacing_delay: Duration,
    request_timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    backoff_growth: u32,
    max_backoff: Duration,
    absence_fragment: String,
    absence_code: Option<i64>,
    output_path: PathBuf,
    error_log_path: PathBuf,
    metrics_interval: Duration,
}

pub struct ScanConfigParams {
    pub rpc_url: String,
    pub contract_address: String,
    pub abi: AbiSource,
    pub owner_function: String,
    pub start_id: u64,
    pub end_id: u64,
    pub batch_size: usize,
    pub pacing_delay: Duration,
    pub request_timeout: Duration,
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub backoff_growth: u32,
    pub max_backoff: Duration,
    pub absence_fragment: String,
    pub absence_code: Option<i64>,
    pub output_path: PathBuf,
    pub error_log_path: PathBuf,
    pub metrics_interval: Duration,
}

impl ScanConfig {
    /// Returns a builder to incrementally construct and validate a
    /// configuration.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`ScanConfig::builder`] when many values use defaults.
    pub fn new(params: ScanConfigParams) -> Result<Self> {
        let ScanConfigParams {
            rpc_url,
            contract_address,
            abi,
            owner_function,
            start_id,
            end_id,
            batch_size,
            pacing_delay,
            request_timeout,
            max_attempts,
            base_backoff,
            backoff_growth,
            max_backoff,
            absence_fragment,
            absence_code,
            output_path,
            error_log_path,
            metrics_interval,
        } = params;

        let contract_address = Address::from_str(contract_address.trim())
            .with_context(|| format!("invalid contract address '{contract_address}'"))?;

        let config = Self {
            rpc_url: rpc_url.trim().to_owned(),
            contract_address,
            abi,
            owner_function: owner_function.trim().to_owned(),
            start_id,
            end_id,
            batch_size,
            pacing_delay,
            request_timeout,
            max_attempts,
            base_backoff,
            backoff_growth,
            max_backoff,
            absence_fragment,
            absence_code,
            output_path,
            error_log_path,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Full RPC URL (including scheme) of the Ethereum endpoint.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Address of the contract being enumerated.
    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Where the ABI descriptor JSON comes from.
    pub fn abi(&self) -> &AbiSource {
        &self.abi
    }

    /// Name of the owner accessor in the ABI descriptor.
    pub fn owner_function(&self) -> &str {
        &self.owner_function
    }

    /// First token id in the scanned range (inclusive).
    pub fn start_id(&self) -> u64 {
        self.start_id
    }

    /// Last token id in the scanned range (inclusive).
    pub fn end_id(&self) -> u64 {
        self.end_id
    }

    /// Number of token ids in the scanned range.
    pub fn total_tokens(&self) -> u64 {
        self.end_id - self.start_id + 1
    }

    /// Maximum number of owner calls in flight at once.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Pause inserted between batches. Zero disables pacing.
    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay
    }

    /// Time bound applied to each individual remote call.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Per-token retry budget, counting the first attempt.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay scheduled after the first failed attempt.
    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    /// Multiplier applied to the backoff delay between attempts.
    pub fn backoff_growth(&self) -> u32 {
        self.backoff_growth
    }

    /// Upper bound on the backoff delay.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Message fragment that marks a nonexistent-token revert.
    pub fn absence_fragment(&self) -> &str {
        &self.absence_fragment
    }

    /// Optional node error code that marks a nonexistent token.
    pub fn absence_code(&self) -> Option<i64> {
        self.absence_code
    }

    /// The configured absence signature as one value.
    pub fn absence_signature(&self) -> AbsenceSignature {
        AbsenceSignature::new(self.absence_fragment.clone(), self.absence_code)
    }

    /// The retry schedule derived from the backoff parameters.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.base_backoff,
            self.backoff_growth,
            self.max_backoff,
        )
    }

    /// Destination of the owner table.
    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }

    /// Destination of the diagnostic failure log.
    pub fn error_log_path(&self) -> &PathBuf {
        &self.error_log_path
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url)?;

        if self.owner_function.is_empty() {
            bail!("owner_function cannot be empty");
        }

        if self.start_id > self.end_id {
            bail!(
                "start_id ({}) must not exceed end_id ({})",
                self.start_id,
                self.end_id
            );
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.max_attempts == 0 {
            bail!("max_attempts must be greater than 0");
        }

        if self.base_backoff.is_zero() {
            bail!("base_backoff must be greater than 0");
        }

        if self.backoff_growth == 0 {
            bail!("backoff_growth must be at least 1");
        }

        if self.max_backoff < self.base_backoff {
            bail!("max_backoff must not be smaller than base_backoff");
        }

        if self.absence_fragment.is_empty() && self.absence_code.is_none() {
            bail!("absence signature requires a message fragment or an error code");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ScanConfigBuilder {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    abi: Option<AbiSource>,
    owner_function: Option<String>,
    start_id: Option<u64>,
    end_id: Option<u64>,
    batch_size: Option<usize>,
    pacing_delay: Option<Duration>,
    request_timeout: Option<Duration>,
    max_attempts: Option<usize>,
    base_backoff: Option<Duration>,
    backoff_growth: Option<u32>,
    max_backoff: Option<Duration>,
    absence_fragment: Option<String>,
    absence_code: Option<i64>,
    output_path: Option<PathBuf>,
    error_log_path: Option<PathBuf>,
    metrics_interval: Option<Duration>,
}

impl ScanConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    pub fn abi(mut self, abi: AbiSource) -> Self {
        self.abi = Some(abi);
        self
    }

    pub fn owner_function(mut self, name: impl Into<String>) -> Self {
        self.owner_function = Some(name.into());
        self
    }

    pub fn start_id(mut self, id: u64) -> Self {
        self.start_id = Some(id);
        self
    }

    pub fn end_id(mut self, id: u64) -> Self {
        self.end_id = Some(id);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = Some(delay);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = Some(delay);
        self
    }

    pub fn backoff_growth(mut self, factor: u32) -> Self {
        self.backoff_growth = Some(factor);
        self
    }

    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = Some(delay);
        self
    }

    pub fn absence_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.absence_fragment = Some(fragment.into());
        self
    }

    pub fn absence_code(mut self, code: i64) -> Self {
        self.absence_code = Some(code);
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn error_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log_path = Some(path.into());
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ScanConfig> {
        let params = ScanConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            contract_address: self
                .contract_address
                .context("contract_address is required")?,
            abi: self.abi.unwrap_or_default(),
            owner_function: self
                .owner_function
                .unwrap_or_else(|| DEFAULT_OWNER_FUNCTION.to_string()),
            start_id: self.start_id.context("start_id is required")?,
            end_id: self.end_id.context("end_id is required")?,
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            pacing_delay: self
                .pacing_delay
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_PACING_DELAY_MS)),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_backoff: self
                .base_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_BASE_BACKOFF_MS)),
            backoff_growth: self.backoff_growth.unwrap_or(DEFAULT_BACKOFF_GROWTH),
            max_backoff: self
                .max_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_MAX_BACKOFF_MS)),
            absence_fragment: self
                .absence_fragment
                .unwrap_or_else(|| AbsenceSignature::default().fragment().to_string()),
            absence_code: self.absence_code,
            output_path: self
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            error_log_path: self
                .error_log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_LOG_PATH)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        ScanConfig::new(params)
    }
}

fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}
