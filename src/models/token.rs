use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::models::{Address, Hash};

/// `supportsInterface(bytes4)`, also the ERC-165 interface id itself
pub const SUPPORTS_INTERFACE_SELECTOR: [u8; 4] = [0x01, 0xff, 0xc9, 0xa7];
pub const ERC165_INTERFACE_ID: [u8; 4] = [0x01, 0xff, 0xc9, 0xa7];
/// Compliant ERC-165 implementations must answer false for this id
pub const INVALID_INTERFACE_ID: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
pub const ERC20_INTERFACE_ID: [u8; 4] = [0x36, 0x37, 0x2b, 0x07];
pub const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];

/// Selectors of the ERC-20 methods, in interface order
pub const ERC20_METHOD_SELECTORS: &[&str] = &[
    "18160ddd", // totalSupply()
    "70a08231", // balanceOf(address)
    "a9059cbb", // transfer(address,uint256)
    "23b872dd", // transferFrom(address,address,uint256)
    "095ea7b3", // approve(address,uint256)
    "dd62ed3e", // allowance(address,address)
];

pub const ERC20_EVENT_SIGNATURES: &[&str] = &[
    // Transfer(address,address,uint256)
    "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
    // Approval(address,address,uint256)
    "8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925",
];

pub const ERC721_METHOD_SELECTORS: &[&str] = &[
    "01ffc9a7", // supportsInterface(bytes4)
    "70a08231", // balanceOf(address)
    "6352211e", // ownerOf(uint256)
    "42842e0e", // safeTransferFrom(address,address,uint256)
    "b88d4fde", // safeTransferFrom(address,address,uint256,bytes)
    "23b872dd", // transferFrom(address,address,uint256)
    "095ea7b3", // approve(address,uint256)
    "a22cb465", // setApprovalForAll(address,bool)
    "081812fc", // getApproved(uint256)
    "e985e9c5", // isApprovedForAll(address,address)
];

pub const ERC721_EVENT_SIGNATURES: &[&str] = &[
    // Transfer(address,address,uint256)
    "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
    // Approval(address,address,uint256)
    "8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925",
    // ApprovalForAll(address,address,bool)
    "17307eab39ab6107e8899845ad3d59bd9653f200f220920489ca2b5937696c31",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenStandard {
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "ERC721")]
    Erc721,
}

impl TokenStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "ERC20",
            TokenStandard::Erc721 => "ERC721",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ERC20" => Some(TokenStandard::Erc20),
            "ERC721" => Some(TokenStandard::Erc721),
            _ => None,
        }
    }

    /// ERC-165 interface id advertised by implementations of this standard.
    pub fn interface_id(&self) -> [u8; 4] {
        match self {
            TokenStandard::Erc20 => ERC20_INTERFACE_ID,
            TokenStandard::Erc721 => ERC721_INTERFACE_ID,
        }
    }

    pub fn signatures(&self) -> &'static TokenSignatures {
        match self {
            TokenStandard::Erc20 => &ERC20_SIGNATURES,
            TokenStandard::Erc721 => &ERC721_SIGNATURES,
        }
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standards in the order they are checked.
pub const KNOWN_STANDARDS: [TokenStandard; 2] = [TokenStandard::Erc20, TokenStandard::Erc721];

/// Decoded method selectors and event topics of a standard's reference interface.
#[derive(Debug)]
pub struct TokenSignatures {
    pub methods: Vec<[u8; 4]>,
    pub events: Vec<[u8; 32]>,
}

impl TokenSignatures {
    fn from_tables(methods: &[&str], events: &[&str]) -> Self {
        Self {
            methods: methods.iter().map(|m| decode_table_entry::<4>(m)).collect(),
            events: events.iter().map(|e| decode_table_entry::<32>(e)).collect(),
        }
    }

    /// True iff every selector and every event hash occurs in `bytecode` as an
    /// exact, byte-aligned sequence.
    ///
    /// This is a heuristic over compiled code: optimizers can split or hide
    /// constants (false negatives) and arbitrary data can embed them (rare false
    /// positives).
    pub fn matches(&self, bytecode: &[u8]) -> bool {
        self.methods.iter().all(|selector| contains_sequence(bytecode, selector))
            && self.events.iter().all(|topic| contains_sequence(bytecode, topic))
    }
}

fn decode_table_entry<const N: usize>(entry: &str) -> [u8; N] {
    let mut out = [0u8; N];
    // Tables are compile-time literals covered by tests
    hex::decode_to_slice(entry, &mut out).expect("malformed signature table entry");
    out
}

fn contains_sequence(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

static ERC20_SIGNATURES: Lazy<TokenSignatures> =
    Lazy::new(|| TokenSignatures::from_tables(ERC20_METHOD_SELECTORS, ERC20_EVENT_SIGNATURES));

static ERC721_SIGNATURES: Lazy<TokenSignatures> =
    Lazy::new(|| TokenSignatures::from_tables(ERC721_METHOD_SELECTORS, ERC721_EVENT_SIGNATURES));

/// Contract classified as a token, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContract {
    pub address: Address,
    pub standard: TokenStandard,
    pub creation_transaction: Hash,
    pub block_number: u64,
}
