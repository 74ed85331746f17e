pub mod block;
pub mod primitives;
pub mod token;
pub mod transaction;

pub use block::{Block, RawBlock};
pub use primitives::{decode_bytes, decode_uint64, encode_uint64, Address, Hash, HexData};
pub use token::{TokenContract, TokenSignatures, TokenStandard, KNOWN_STANDARDS};
pub use transaction::{CallType, Event, InternalCall, Transaction};
