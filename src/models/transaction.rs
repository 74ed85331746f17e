use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Address, Hash, HexData};

/// Canonical, storage-ready transaction record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: Hash,
    pub status: bool,
    pub block_number: u64,
    pub block_hash: Hash,
    pub index: u64,
    pub nonce: u64,
    pub from: Address,
    pub to: Address,
    pub value: u64,
    pub gas: u64,
    pub gas_price: u64,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    /// Zero unless this transaction deployed a contract
    pub created_contract: Address,
    pub data: HexData,
    pub private_data: HexData,
    pub is_private: bool,
    pub timestamp: u64,
    pub events: Vec<Event>,
    pub internal_calls: Vec<InternalCall>,
}

impl Transaction {
    pub fn is_contract_creation(&self) -> bool {
        !self.created_contract.is_zero()
    }
}

/// Call-type tag of a traced internal call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    Call,
    StaticCall,
    DelegateCall,
    CallCode,
    Create,
    Create2,
    SelfDestruct,
    Other(String),
}

impl CallType {
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "CALL" => CallType::Call,
            "STATICCALL" => CallType::StaticCall,
            "DELEGATECALL" => CallType::DelegateCall,
            "CALLCODE" => CallType::CallCode,
            "CREATE" => CallType::Create,
            "CREATE2" => CallType::Create2,
            "SELFDESTRUCT" => CallType::SelfDestruct,
            _ => CallType::Other(tag.to_string()),
        }
    }

    /// `CREATE` and `CREATE2` frames deploy a new contract at their `to` address.
    pub fn is_creation(&self) -> bool {
        matches!(self, CallType::Create | CallType::Create2)
    }

    pub fn as_str(&self) -> &str {
        match self {
            CallType::Call => "CALL",
            CallType::StaticCall => "STATICCALL",
            CallType::DelegateCall => "DELEGATECALL",
            CallType::CallCode => "CALLCODE",
            CallType::Create => "CREATE",
            CallType::Create2 => "CREATE2",
            CallType::SelfDestruct => "SELFDESTRUCT",
            CallType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalCall {
    pub from: Address,
    pub to: Address,
    pub gas: u64,
    pub gas_used: u64,
    pub value: u64,
    pub input: HexData,
    pub output: HexData,
    pub call_type: CallType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub index: u64,
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: HexData,
    pub block_number: u64,
    pub block_hash: Hash,
    pub transaction_hash: Hash,
    pub transaction_index: u64,
    pub timestamp: u64,
}
