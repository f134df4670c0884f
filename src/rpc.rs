//! JSON-RPC plumbing: the contract-call client, ABI descriptor handling,
//! failure classification, and the endpoint health gate.

pub mod abi;
pub mod classify;
pub mod client;
pub mod gate;
pub mod options;

pub use abi::{AbiSource, OwnerCall, DEFAULT_OWNER_ABI};
pub use classify::{AbsenceSignature, CallClassifier, CallDisposition};
pub use client::{AsyncRpcClient, OwnerClient, RpcError};
pub use gate::{GateSnapshot, GateState, RpcHealthGate};
pub use options::RpcClientOptions;
