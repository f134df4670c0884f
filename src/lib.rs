pub mod output;
pub mod rpc;
pub mod runtime;
pub mod scanner;

pub use output::{SnapshotSink, TokenOutcome};
pub use rpc::{
    AbiSource, AbsenceSignature, AsyncRpcClient, CallClassifier, CallDisposition, GateSnapshot,
    GateState, OwnerCall, OwnerClient, RpcClientOptions, RpcError, RpcHealthGate,
    DEFAULT_OWNER_ABI,
};
pub use runtime::config::{ScanConfig, ScanConfigBuilder, ScanConfigParams};
pub use runtime::runner::{Runner, ScanReport};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use scanner::backoff::RetryPolicy;
pub use scanner::fetcher::ItemFetcher;
pub use scanner::scheduler::{BatchScheduler, BatchSchedulerParams};
