//! JSON-RPC client for read-only contract calls against an Ethereum
//! endpoint. Houses the `AsyncRpcClient`, the typed `RpcError` surface the
//! classifier inspects, and the `OwnerClient` trait consumed by fetchers.
//!
//! The client performs exactly one attempt per call; retry scheduling lives
//! in the scanner so each item's state machine owns its own budget.

use crate::rpc::abi::OwnerCall;
use crate::rpc::gate::{GateSnapshot, RpcHealthGate};
use crate::rpc::options::RpcClientOptions;
use crate::runtime::config::ScanConfig;
use alloy_primitives::{hex, Address, Bytes};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    params::ArrayParams,
};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;

/// Remote-call failures the scanner knows how to classify.
#[derive(Debug)]
pub enum RpcError {
    /// The call neither succeeded nor failed within the request timeout.
    Timeout { method: &'static str },
    /// The health gate is refusing traffic while the endpoint cools down.
    Paused,
    /// The node answered with a JSON-RPC error object (reverts included).
    Node { code: i64, message: String },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::Paused => write!(f, "rpc health gate is paused"),
            RpcError::Node { code, message } => {
                write!(f, "node error (code={code}): {message}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// The narrow transport contract the fetch loop depends on.
pub trait OwnerClient: Send + Sync {
    fn owner_of<'a>(&'a self, call: &'a OwnerCall, token_id: u64) -> BoxFuture<'a, Result<Address>>;
}

#[derive(Debug, Clone, Serialize)]
struct CallRequest {
    to: Address,
    data: Bytes,
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    gate: Arc<RpcHealthGate>,
}

impl OwnerClient for AsyncRpcClient {
    fn owner_of<'a>(&'a self, call: &'a OwnerCall, token_id: u64) -> BoxFuture<'a, Result<Address>> {
        Box::pin(self.owner_of(call, token_id))
    }
}

impl AsyncRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        Self::with_options_and_gate(url, options, Arc::new(RpcHealthGate::default()))
    }

    pub fn with_options_and_gate(
        url: impl Into<String>,
        options: RpcClientOptions,
        gate: Arc<RpcHealthGate>,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            gate,
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        config.validate()?;
        let options = RpcClientOptions {
            request_timeout: config.request_timeout(),
            max_concurrent_requests: std::cmp::max(32, config.batch_size().saturating_mul(2)),
        };
        Self::with_options(config.rpc_url().to_owned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    /// Issues a single `eth_call` for the owner of `token_id`.
    pub async fn owner_of(&self, call: &OwnerCall, token_id: u64) -> Result<Address> {
        let data = call.encode(token_id)?;
        let request = CallRequest {
            to: call.contract(),
            data: data.into(),
        };

        let raw: String = self
            .execute("eth_call", rpc_params![request, "latest"])
            .await?;
        let bytes = hex::decode(&raw)
            .with_context(|| format!("failed to decode eth_call response for token {token_id}"))?;

        call.decode_owner(&bytes)
    }

    /// Current chain head. Used once at startup as a reachability probe.
    pub async fn block_number(&self) -> Result<u64> {
        let raw: String = self.execute("eth_blockNumber", rpc_params![]).await?;
        let trimmed = raw.trim_start_matches("0x");
        u64::from_str_radix(trimmed, 16)
            .with_context(|| format!("failed to parse block number '{raw}'"))
    }

    /// One gate-guarded, time-bounded request. Node error objects count as a
    /// healthy endpoint; timeouts and transport errors count against it.
    async fn execute<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        if !self.gate.permit() {
            return Err(RpcError::Paused.into());
        }

        match timeout(
            self.options.request_timeout,
            self.client.request(method, params),
        )
        .await
        {
            Err(_) => {
                self.gate.record_failure();
                Err(RpcError::Timeout { method }.into())
            }
            Ok(Ok(value)) => {
                self.gate.record_success();
                Ok(value)
            }
            Ok(Err(JsonRpcError::Call(object))) => {
                self.gate.record_success();
                Err(RpcError::Node {
                    code: i64::from(object.code()),
                    message: object.message().to_string(),
                }
                .into())
            }
            Ok(Err(err)) => {
                self.gate.record_failure();
                Err(anyhow!("rpc {method} call failed: {err}"))
            }
        }
    }
}
