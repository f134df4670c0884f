use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use alloy_primitives::Address;
use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const OWNER_OF_SELECTOR: [u8; 4] = [0x63, 0x52, 0x21, 0x1e];
const ABSENCE_MESSAGE: &str = "execution reverted: ERC721: invalid token ID";
const RATE_LIMIT_MESSAGE: &str = "upstream rate limit exceeded";

/// Scriptable collection state served over a real HTTP JSON-RPC endpoint.
///
/// Ids without an owner behave like unminted tokens and revert with the
/// stock invalid-id message. Transient failures and per-id response delays
/// can be injected to exercise retry and ordering behavior.
#[derive(Clone)]
pub struct MockCollection {
    inner: Arc<RwLock<CollectionInner>>,
    eth_calls: Arc<AtomicU64>,
}

#[derive(Default)]
struct CollectionInner {
    owners: HashMap<u64, Address>,
    always_fail: HashSet<u64>,
    remaining_failures: HashMap<u64, u64>,
    delays: HashMap<u64, Duration>,
    calls_per_id: HashMap<u64, u64>,
}

impl Default for MockCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCollection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(CollectionInner::default())),
            eth_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Deterministic owner derived from the token id, so tests can predict
    /// every table row.
    pub fn owner_for(token_id: u64) -> Address {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&token_id.to_be_bytes());
        Address::from(bytes)
    }

    pub fn mint_range(&self, start_id: u64, end_id: u64) {
        let mut inner = self.inner.write().expect("mock collection poisoned");
        for token_id in start_id..=end_id {
            inner.owners.insert(token_id, Self::owner_for(token_id));
        }
    }

    pub fn burn(&self, token_id: u64) {
        self.inner
            .write()
            .expect("mock collection poisoned")
            .owners
            .remove(&token_id);
    }

    /// The next `count` calls for this id fail with a rate-limit error.
    pub fn fail_first(&self, token_id: u64, count: u64) {
        self.inner
            .write()
            .expect("mock collection poisoned")
            .remaining_failures
            .insert(token_id, count);
    }

    /// Every call for this id fails with a rate-limit error.
    pub fn always_fail(&self, token_id: u64) {
        self.inner
            .write()
            .expect("mock collection poisoned")
            .always_fail
            .insert(token_id);
    }

    /// Delays every response for this id to shuffle completion order.
    pub fn delay(&self, token_id: u64, delay: Duration) {
        self.inner
            .write()
            .expect("mock collection poisoned")
            .delays
            .insert(token_id, delay);
    }

    pub fn eth_calls(&self) -> u64 {
        self.eth_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, token_id: u64) -> u64 {
        self.inner
            .read()
            .expect("mock collection poisoned")
            .calls_per_id
            .get(&token_id)
            .copied()
            .unwrap_or(0)
    }

    fn respond_to_owner_call(&self, token_id: u64) -> OwnerResponse {
        let mut inner = self.inner.write().expect("mock collection poisoned");
        *inner.calls_per_id.entry(token_id).or_insert(0) += 1;

        if inner.always_fail.contains(&token_id) {
            return OwnerResponse::RateLimited;
        }

        if let Some(remaining) = inner.remaining_failures.get_mut(&token_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return OwnerResponse::RateLimited;
            }
        }

        match inner.owners.get(&token_id) {
            Some(owner) => OwnerResponse::Owner(*owner),
            None => OwnerResponse::Invalid,
        }
    }

    fn delay_for(&self, token_id: u64) -> Option<Duration> {
        self.inner
            .read()
            .expect("mock collection poisoned")
            .delays
            .get(&token_id)
            .copied()
    }

    fn best_block(&self) -> u64 {
        self.inner
            .read()
            .expect("mock collection poisoned")
            .owners
            .keys()
            .copied()
            .max()
            .unwrap_or(0)
            + 1_000
    }
}

enum OwnerResponse {
    Owner(Address),
    Invalid,
    RateLimited,
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(collection: MockCollection) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let collection = collection.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    serve_request(collection.clone(), req)
                }))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    collection: MockCollection,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let response_value = if let Some(calls) = payload.as_array() {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls.clone() {
            responses.push(handle_call(&collection, call).await);
        }
        Value::Array(responses)
    } else {
        handle_call(&collection, payload).await
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

async fn handle_call(collection: &MockCollection, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    match method.as_str() {
        "eth_blockNumber" => success(id, json!(format!("{:#x}", collection.best_block()))),
        "eth_call" => {
            collection.eth_calls.fetch_add(1, Ordering::SeqCst);
            match decode_owner_call(&params) {
                Some(token_id) => {
                    if let Some(delay) = collection.delay_for(token_id) {
                        tokio::time::sleep(delay).await;
                    }
                    match collection.respond_to_owner_call(token_id) {
                        OwnerResponse::Owner(owner) => {
                            let mut word = [0u8; 32];
                            word[12..].copy_from_slice(owner.as_slice());
                            success(id, json!(format!("0x{}", hex_encode(&word))))
                        }
                        OwnerResponse::Invalid => error(id, 3, ABSENCE_MESSAGE),
                        OwnerResponse::RateLimited => error(id, -32005, RATE_LIMIT_MESSAGE),
                    }
                }
                None => error(id, -32602, "malformed eth_call params"),
            }
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn decode_owner_call(params: &Value) -> Option<u64> {
    let data = params
        .as_array()?
        .first()?
        .get("data")?
        .as_str()?
        .strip_prefix("0x")?;
    let bytes = hex_decode(data)?;

    if bytes.len() != 4 + 32 || bytes[..4] != OWNER_OF_SELECTOR {
        return None;
    }

    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&bytes[4 + 24..]);
    Some(u64::from_be_bytes(id_bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&hex[index..index + 2], 16).ok())
        .collect()
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
