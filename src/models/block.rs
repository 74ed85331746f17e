use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::models::{decode_uint64, Hash};

/// Block header as returned by `eth_getBlockByNumber` with hashes only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawBlock {
    pub hash: String,
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    #[serde(rename = "stateRoot")]
    pub state_root: String,
    #[serde(rename = "transactionsRoot")]
    pub tx_root: String,
    #[serde(rename = "receiptsRoot")]
    pub receipt_root: String,
    pub number: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    #[serde(rename = "gasUsed")]
    pub gas_used: String,
    pub timestamp: String,
    #[serde(rename = "extraData")]
    pub extra_data: String,
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub hash: Hash,
    pub parent_hash: Hash,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub receipt_root: Hash,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: String,
    pub transactions: Vec<Hash>,
}

impl TryFrom<RawBlock> for Block {
    type Error = DecodeError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let transactions = raw
            .transactions
            .iter()
            .map(|h| Hash::parse("block.transactions", h))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Block {
            hash: Hash::parse("block.hash", &raw.hash)?,
            parent_hash: Hash::parse("block.parentHash", &raw.parent_hash)?,
            state_root: Hash::parse("block.stateRoot", &raw.state_root)?,
            tx_root: Hash::parse("block.transactionsRoot", &raw.tx_root)?,
            receipt_root: Hash::parse("block.receiptsRoot", &raw.receipt_root)?,
            number: decode_uint64("block.number", &raw.number)?,
            gas_limit: decode_uint64("block.gasLimit", &raw.gas_limit)?,
            gas_used: decode_uint64("block.gasUsed", &raw.gas_used)?,
            timestamp: decode_uint64("block.timestamp", &raw.timestamp)?,
            extra_data: raw.extra_data,
            transactions,
        })
    }
}
