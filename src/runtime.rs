//! Run-level plumbing: validated configuration, the scan lifecycle, and
//! telemetry.

pub mod config;
pub mod runner;
pub mod telemetry;

pub use config::{ScanConfig, ScanConfigBuilder, ScanConfigParams};
pub use runner::{Runner, ScanReport};
pub use telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
