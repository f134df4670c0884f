use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ownerscan::{init_tracing, AbiSource, Runner, ScanConfig, ScanReport, Telemetry};
use tokio::task::JoinHandle;
use tokio::time::sleep;

const DEFAULT_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_START_ID: u64 = 1;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_PACING_MS: u64 = 1_000;
const DEFAULT_MAX_ATTEMPTS: usize = 5;
const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
const DEFAULT_BACKOFF_GROWTH: u32 = 2;
const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OUTPUT_PATH: &str = "owners.csv";
const DEFAULT_ERROR_LOG_PATH: &str = "owner_errors.log";
const DEFAULT_LOG_DIRECTIVE: &str = "warn";
const PROGRESS_REFRESH_INTERVAL: Duration = Duration::from_millis(150);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_snapshot_tracing();

    let args = SnapshotArgs::from_env()?;
    let config = args.to_scan_config()?;

    let bar = build_progress_bar(config.total_tokens());
    bar.println(format!(
        "Scanning owners of tokens {}..={} on {}",
        config.start_id(),
        config.end_id(),
        config.contract_address()
    ));

    let runner = Runner::new(config);
    let progress_handle = spawn_progress_updates(runner.telemetry(), bar.clone());

    let result = runner.run_until_ctrl_c().await;
    progress_handle.abort();

    match result {
        Ok(report) => {
            bar.finish_with_message("scan complete");
            print_summary(&bar, &report);
            Ok(())
        }
        Err(err) => {
            bar.finish_with_message("scan aborted");
            Err(err)
        }
    }
}

fn init_snapshot_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    init_tracing();
}

fn build_progress_bar(total_tokens: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(
        Some(total_tokens),
        ProgressDrawTarget::stdout_with_hz(12),
    );
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tokens ({per_sec:.2} tok/s) ETA {eta_precise}",
    )
    .expect("valid progress bar template")
    .progress_chars("=>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn spawn_progress_updates(telemetry: Arc<Telemetry>, bar: ProgressBar) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            bar.set_position(telemetry.completed());
            sleep(PROGRESS_REFRESH_INTERVAL).await;
        }
    })
}

fn print_summary(bar: &ProgressBar, report: &ScanReport) {
    bar.println(format!(
        "Resolved {} of {} tokens ({} owned, {} absent, {} failed) -> {}",
        report.owners_found + report.tokens_absent,
        report.total_tokens,
        report.owners_found,
        report.tokens_absent,
        report.tokens_failed,
        report.output_path.display()
    ));
    if report.tokens_failed > 0 {
        bar.println(format!(
            "{} token(s) exhausted their retries; see the diagnostic log",
            report.tokens_failed
        ));
    }
}

struct SnapshotArgs {
    rpc_url: String,
    contract_address: String,
    abi_path: Option<String>,
    owner_function: Option<String>,
    start_id: u64,
    end_id: u64,
    batch_size: usize,
    pacing_ms: u64,
    max_attempts: usize,
    base_backoff_ms: u64,
    backoff_growth: u32,
    max_backoff_ms: u64,
    rpc_timeout_secs: u64,
    absence_fragment: Option<String>,
    absence_code: Option<i64>,
    output_path: String,
    error_log_path: String,
}

impl SnapshotArgs {
    fn from_env() -> Result<Self> {
        let rpc_url = read_env_or_default("OWNERSCAN_RPC_URL", DEFAULT_RPC_URL);
        let contract_address = read_env_required("OWNERSCAN_CONTRACT")?;
        let abi_path = read_env_optional("OWNERSCAN_ABI_PATH");
        let owner_function = read_env_optional("OWNERSCAN_OWNER_FUNCTION");
        let start_id = parse_env_with_default::<u64>("OWNERSCAN_START_ID", DEFAULT_START_ID)?;
        let end_id = parse_env_required::<u64>("OWNERSCAN_END_ID")?;
        let batch_size =
            parse_env_with_default::<usize>("OWNERSCAN_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let pacing_ms = parse_env_with_default::<u64>("OWNERSCAN_PACING_MS", DEFAULT_PACING_MS)?;
        let max_attempts =
            parse_env_with_default::<usize>("OWNERSCAN_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let base_backoff_ms =
            parse_env_with_default::<u64>("OWNERSCAN_BASE_BACKOFF_MS", DEFAULT_BASE_BACKOFF_MS)?;
        let backoff_growth =
            parse_env_with_default::<u32>("OWNERSCAN_BACKOFF_GROWTH", DEFAULT_BACKOFF_GROWTH)?;
        let max_backoff_ms =
            parse_env_with_default::<u64>("OWNERSCAN_MAX_BACKOFF_MS", DEFAULT_MAX_BACKOFF_MS)?;
        let rpc_timeout_secs =
            parse_env_with_default::<u64>("OWNERSCAN_RPC_TIMEOUT_SECS", DEFAULT_RPC_TIMEOUT_SECS)?;
        let absence_fragment = read_env_optional("OWNERSCAN_ABSENCE_FRAGMENT");
        let absence_code = match read_env_optional("OWNERSCAN_ABSENCE_CODE") {
            Some(value) => Some(
                value
                    .parse::<i64>()
                    .with_context(|| format!("failed to parse OWNERSCAN_ABSENCE_CODE='{value}'"))?,
            ),
            None => None,
        };
        let output_path = read_env_or_default("OWNERSCAN_OUTPUT", DEFAULT_OUTPUT_PATH);
        let error_log_path = read_env_or_default("OWNERSCAN_ERROR_LOG", DEFAULT_ERROR_LOG_PATH);

        Ok(Self {
            rpc_url,
            contract_address,
            abi_path,
            owner_function,
            start_id,
            end_id,
            batch_size,
            pacing_ms,
            max_attempts,
            base_backoff_ms,
            backoff_growth,
            max_backoff_ms,
            rpc_timeout_secs,
            absence_fragment,
            absence_code,
            output_path,
            error_log_path,
        })
    }

    fn to_scan_config(&self) -> Result<ScanConfig> {
        let mut builder = ScanConfig::builder()
            .rpc_url(self.rpc_url.clone())
            .contract_address(self.contract_address.clone())
            .start_id(self.start_id)
            .end_id(self.end_id)
            .batch_size(self.batch_size)
            .pacing_delay(Duration::from_millis(self.pacing_ms))
            .max_attempts(self.max_attempts)
            .base_backoff(Duration::from_millis(self.base_backoff_ms))
            .backoff_growth(self.backoff_growth)
            .max_backoff(Duration::from_millis(self.max_backoff_ms))
            .request_timeout(Duration::from_secs(self.rpc_timeout_secs))
            .output_path(self.output_path.clone())
            .error_log_path(self.error_log_path.clone());

        if let Some(path) = &self.abi_path {
            builder = builder.abi(AbiSource::Path(path.into()));
        }
        if let Some(name) = &self.owner_function {
            builder = builder.owner_function(name.clone());
        }
        if let Some(fragment) = &self.absence_fragment {
            builder = builder.absence_fragment(fragment.clone());
        }
        if let Some(code) = self.absence_code {
            builder = builder.absence_code(code);
        }

        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn read_env_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_env_required(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{key} must be set"),
    }
}

fn parse_env_required<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = read_env_required(key)?;
    value
        .parse::<T>()
        .with_context(|| format!("failed to parse {key}='{value}'"))
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
