//! Fixed-width chain primitives and the hex codecs used on the wire.
//!
//! Node responses carry every number and payload as a `0x`-prefixed string.
//! Everything in this module is strict: a malformed string is a
//! [`DecodeError`], never a silently defaulted value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

fn decode_fixed<const N: usize>(field: &str, s: &str) -> Result<[u8; N], DecodeError> {
    let digits = strip_hex_prefix(s.trim()).unwrap_or_else(|| s.trim());
    if digits.len() != N * 2 {
        return Err(DecodeError::InvalidLength {
            field: field.to_string(),
            expected: N,
            got: digits.len() / 2,
        });
    }

    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|_| DecodeError::InvalidHex {
        field: field.to_string(),
        value: s.to_string(),
    })?;
    Ok(out)
}

/// Decode a variable-width hex quantity (`0x0`, `0x1a4`, ...) into a `u64`.
///
/// Requires the `0x` prefix, at least one digit, no leading zero digits and at
/// most 64 bits of value.
pub fn decode_uint64(field: &str, s: &str) -> Result<u64, DecodeError> {
    let digits = strip_hex_prefix(s).ok_or_else(|| DecodeError::InvalidHex {
        field: field.to_string(),
        value: s.to_string(),
    })?;

    if digits.is_empty() {
        return Err(DecodeError::Empty {
            field: field.to_string(),
        });
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(DecodeError::LeadingZero {
            field: field.to_string(),
            value: s.to_string(),
        });
    }
    if digits.len() > 16 {
        return Err(DecodeError::Overflow {
            field: field.to_string(),
            value: s.to_string(),
        });
    }

    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidHex {
        field: field.to_string(),
        value: s.to_string(),
    })
}

/// Encode a `u64` as a minimal hex quantity.
pub fn encode_uint64(value: u64) -> String {
    format!("{:#x}", value)
}

/// Decode a `0x`-prefixed, even-length hex payload into raw bytes.
pub fn decode_bytes(field: &str, s: &str) -> Result<Vec<u8>, DecodeError> {
    if s.is_empty() {
        return Err(DecodeError::Empty {
            field: field.to_string(),
        });
    }
    let digits = strip_hex_prefix(s).ok_or_else(|| DecodeError::InvalidHex {
        field: field.to_string(),
        value: s.to_string(),
    })?;

    hex::decode(digits).map_err(|_| DecodeError::InvalidHex {
        field: field.to_string(),
        value: s.to_string(),
    })
}

/// 20-byte account identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Sentinel meaning "absent / not created".
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn parse(field: &str, s: &str) -> Result<Self, DecodeError> {
        decode_fixed::<20>(field, s).map(Address)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

/// 32-byte digest: block hash, transaction hash or log topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn parse(field: &str, s: &str) -> Result<Self, DecodeError> {
        decode_fixed::<32>(field, s).map(Hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Variable-length byte payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HexData(pub Vec<u8>);

impl HexData {
    pub fn parse(field: &str, s: &str) -> Result<Self, DecodeError> {
        decode_bytes(field, s).map(HexData)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for HexData {
    fn from(bytes: Vec<u8>) -> Self {
        HexData(bytes)
    }
}

macro_rules! impl_hex_traits {
    ($ty:ident, $field:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(&self.0))
            }
        }

        impl FromStr for $ty {
            type Err = DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::parse($field, s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hex_traits!(Address, "address");
impl_hex_traits!(Hash, "hash");
impl_hex_traits!(HexData, "data");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uint64() {
        assert_eq!(decode_uint64("n", "0x0").unwrap(), 0);
        assert_eq!(decode_uint64("n", "0x1234").unwrap(), 0x1234);
        assert_eq!(decode_uint64("n", "0xABC").unwrap(), 0xabc);
        assert_eq!(decode_uint64("n", "0xffffffffffffffff").unwrap(), u64::MAX);
    }

    #[test]
    fn test_decode_uint64_rejects_malformed() {
        assert!(matches!(decode_uint64("n", "1234"), Err(DecodeError::InvalidHex { .. })));
        assert!(matches!(decode_uint64("n", "0x"), Err(DecodeError::Empty { .. })));
        assert!(matches!(decode_uint64("n", "0x01"), Err(DecodeError::LeadingZero { .. })));
        assert!(matches!(
            decode_uint64("n", "0x10000000000000000"),
            Err(DecodeError::Overflow { .. })
        ));
        assert!(matches!(decode_uint64("n", "0xzz"), Err(DecodeError::InvalidHex { .. })));
        assert!(matches!(decode_uint64("n", ""), Err(DecodeError::InvalidHex { .. })));
    }

    #[test]
    fn test_uint64_hex_roundtrip_boundaries() {
        let samples = [
            0u64,
            1,
            15,
            16,
            255,
            256,
            u32::MAX as u64,
            u32::MAX as u64 + 1,
            0x0123_4567_89ab_cdef,
            u64::MAX - 1,
            u64::MAX,
        ];
        for value in samples {
            let encoded = encode_uint64(value);
            assert_eq!(decode_uint64("n", &encoded).unwrap(), value, "{}", encoded);
        }

        // Every bit position, plus its neighbours
        for shift in 0..64 {
            let value = 1u64 << shift;
            for v in [value - 1, value, value.wrapping_add(1)] {
                assert_eq!(decode_uint64("n", &encode_uint64(v)).unwrap(), v);
            }
        }
    }

    #[test]
    fn test_decode_bytes() {
        assert_eq!(decode_bytes("d", "0x").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_bytes("d", "0xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(decode_bytes("d", ""), Err(DecodeError::Empty { .. })));
        assert!(matches!(decode_bytes("d", "0xabc"), Err(DecodeError::InvalidHex { .. })));
        assert!(matches!(decode_bytes("d", "dead"), Err(DecodeError::InvalidHex { .. })));
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0xF977814e90dA44bFA03b6295A0616a897441aceC".parse().unwrap();
        assert_eq!(addr.to_string(), "0xf977814e90da44bfa03b6295a0616a897441acec");

        let no_prefix: Address = "f977814e90da44bfa03b6295a0616a897441acec".parse().unwrap();
        assert_eq!(addr, no_prefix);

        assert!(Address::ZERO.is_zero());
        assert!(!addr.is_zero());
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(DecodeError::InvalidLength { expected: 20, .. })
        ));
    }

    #[test]
    fn test_hash_parse() {
        let hash: Hash = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
            .parse()
            .unwrap();
        assert_eq!(hash.0[0], 0xdd);
        assert_eq!(hash.0[31], 0xef);
        assert!("0xddf252ad".parse::<Hash>().is_err());
        assert!("0xgg".repeat(16).parse::<Hash>().is_err());
    }

    #[test]
    fn test_serde_uses_hex_strings() {
        let addr = Address([0xaa; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "aa".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);

        let data = HexData(vec![1, 2, 3]);
        assert_eq!(serde_json::to_string(&data).unwrap(), "\"0x010203\"");
    }
}
