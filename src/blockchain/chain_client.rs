use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChainQueryError;
use crate::models::{Address, Hash, HexData, RawBlock};

/// `{ address }` account reference as returned by the node's GraphQL schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountRef {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockRef {
    pub number: String,
    pub hash: String,
}

/// Log entry attached to a transaction record, in emission order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub index: u64,
    pub account: AccountRef,
    pub topics: Vec<String>,
    pub data: String,
}

/// Transaction detail as returned by the GraphQL `transaction(hash:)` query.
///
/// Numeric fields arrive as variable-width hex strings and are decoded by the
/// transaction monitor, never here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub status: String,
    pub block: BlockRef,
    pub index: u64,
    pub nonce: String,
    pub from: AccountRef,
    pub to: Option<AccountRef>,
    pub value: String,
    pub gas: String,
    #[serde(default = "zero_quantity")]
    pub gas_price: String,
    pub gas_used: String,
    pub cumulative_gas_used: String,
    pub created_contract: Option<AccountRef>,
    pub input_data: String,
    pub private_input_data: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

fn zero_quantity() -> String {
    "0x0".to_string()
}

/// One frame of a `callTracer` trace. The root frame is the transaction itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

impl CallFrame {
    /// Nested frames in depth-first pre-order, excluding `self`.
    pub fn flatten(&self) -> Vec<&CallFrame> {
        let mut out = Vec::new();
        let mut stack: Vec<&CallFrame> = self.calls.iter().rev().collect();
        while let Some(frame) = stack.pop() {
            out.push(frame);
            stack.extend(frame.calls.iter().rev());
        }
        out
    }
}

/// Read-only access to a chain node.
///
/// Implementations must be safe to share between concurrent in-flight calls.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Execute a read-only call against `address` as of `block_number`.
    ///
    /// A reverted call yields empty return data rather than an error.
    async fn call_contract(
        &self,
        address: Address,
        input: &[u8],
        block_number: u64,
    ) -> Result<HexData, ChainQueryError>;

    /// Deployed bytecode of `address` at the block identified by `block_hash`.
    async fn get_code(&self, address: Address, block_hash: Hash) -> Result<HexData, ChainQueryError>;

    async fn query_transaction(&self, hash: Hash) -> Result<TransactionRecord, ChainQueryError>;

    async fn get_block_by_number(&self, number: u64) -> Result<RawBlock, ChainQueryError>;

    /// Call trace of a mined transaction. Returns the root frame.
    async fn trace_internal_calls(&self, hash: Hash) -> Result<CallFrame, ChainQueryError>;
}

#[async_trait]
impl<C: ChainClient + ?Sized> ChainClient for std::sync::Arc<C> {
    async fn call_contract(
        &self,
        address: Address,
        input: &[u8],
        block_number: u64,
    ) -> Result<HexData, ChainQueryError> {
        (**self).call_contract(address, input, block_number).await
    }

    async fn get_code(&self, address: Address, block_hash: Hash) -> Result<HexData, ChainQueryError> {
        (**self).get_code(address, block_hash).await
    }

    async fn query_transaction(&self, hash: Hash) -> Result<TransactionRecord, ChainQueryError> {
        (**self).query_transaction(hash).await
    }

    async fn get_block_by_number(&self, number: u64) -> Result<RawBlock, ChainQueryError> {
        (**self).get_block_by_number(number).await
    }

    async fn trace_internal_calls(&self, hash: Hash) -> Result<CallFrame, ChainQueryError> {
        (**self).trace_internal_calls(hash).await
    }
}
