//! ABI descriptor loading and calldata encoding for the owner query.
//!
//! The contract call the scanner drives is a single read-only function
//! (`ownerOf(uint256) -> address` on stock ERC-721 contracts). The
//! descriptor is configuration: collections that rename the accessor can
//! point the scanner at their own ABI JSON and function name.

use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Minimal ERC-721 ABI carrying only the owner accessor. Used when no
/// external descriptor is configured.
pub const DEFAULT_OWNER_ABI: &str = r#"[
  {
    "name": "ownerOf",
    "type": "function",
    "stateMutability": "view",
    "inputs": [{ "name": "tokenId", "type": "uint256" }],
    "outputs": [{ "name": "owner", "type": "address" }]
  }
]"#;

/// Where the ABI descriptor JSON comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiSource {
    Path(PathBuf),
    Inline(String),
}

impl Default for AbiSource {
    fn default() -> Self {
        Self::Inline(DEFAULT_OWNER_ABI.to_string())
    }
}

/// A resolved owner query: contract address plus the validated ABI function
/// used to encode calldata and decode the returned address.
#[derive(Debug, Clone)]
pub struct OwnerCall {
    contract: Address,
    function: Function,
}

impl OwnerCall {
    /// Loads the descriptor, resolves `function_name`, and validates its
    /// shape. All failures here are setup errors that abort the run.
    pub fn load(source: &AbiSource, function_name: &str, contract: Address) -> Result<Self> {
        let json = match source {
            AbiSource::Path(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read ABI descriptor {}", path.display()))?,
            AbiSource::Inline(json) => json.clone(),
        };

        let abi: JsonAbi =
            serde_json::from_str(&json).context("failed to parse ABI descriptor JSON")?;

        let function = abi
            .function(function_name)
            .and_then(|overloads| overloads.first())
            .with_context(|| format!("ABI descriptor has no function `{function_name}`"))?
            .clone();

        Self::validate_shape(&function)?;

        Ok(Self { contract, function })
    }

    fn validate_shape(function: &Function) -> Result<()> {
        if function.inputs.len() != 1 || function.inputs[0].ty != "uint256" {
            bail!(
                "owner function `{}` must take exactly one uint256 token id",
                function.name
            );
        }

        match function.outputs.first() {
            Some(output) if output.ty == "address" => Ok(()),
            _ => bail!(
                "owner function `{}` must return an address",
                function.name
            ),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn function_name(&self) -> &str {
        &self.function.name
    }

    /// ABI-encodes the full calldata (selector + token id) for one query.
    pub fn encode(&self, token_id: u64) -> Result<Vec<u8>> {
        self.function
            .abi_encode_input(&[DynSolValue::Uint(U256::from(token_id), 256)])
            .with_context(|| format!("failed to encode owner call for token id {token_id}"))
    }

    /// Decodes the raw `eth_call` return data into the owner address.
    pub fn decode_owner(&self, raw: &[u8]) -> Result<Address> {
        let values = self
            .function
            .abi_decode_output(raw, true)
            .context("failed to decode owner call return data")?;

        values
            .first()
            .and_then(DynSolValue::as_address)
            .context("owner call returned no address")
    }
}
