//! Murmur Core
//!
//! Generic types shared by all Murmur crates: chain identifiers, amount
//! conventions, and referral codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing chain identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid account address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid transaction hash: {0:?}")]
    InvalidTxHash(String),
}

/// USDC decimal places.
pub const USDC_DECIMALS: u8 = 6;

/// 1 USDC in micro-units. All amounts in Murmur are u64 micro-USDC.
pub const USDC_ONE: u64 = 1_000_000;

/// Format a micro-USDC amount as a decimal string ("0.050000").
pub fn format_usdc(micro: u64) -> String {
    format!("{}.{:06}", micro / USDC_ONE, micro % USDC_ONE)
}

/// An EVM account address: `0x` + 40 hex chars, lowercase-normalized.
///
/// Normalizing at parse time makes every later comparison a plain `==`;
/// callers never compare case-insensitively by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and lowercase-normalize an address string.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.trim();
        if is_hex_with_prefix(s, 40) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(IdError::InvalidAddress(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, IdError> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> String {
        a.0
    }
}

/// A transaction hash: `0x` + 64 hex chars, lowercase-normalized.
///
/// Used as the idempotency key for tips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.trim();
        if is_hex_with_prefix(s, 64) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(IdError::InvalidTxHash(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TxHash {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, IdError> {
        Self::parse(&s)
    }
}

impl From<TxHash> for String {
    fn from(h: TxHash) -> String {
        h.0
    }
}

fn is_hex_with_prefix(s: &str, hex_len: usize) -> bool {
    s.len() == hex_len + 2
        && s.starts_with("0x")
        && s.as_bytes()[2..].iter().all(u8::is_ascii_hexdigit)
}

/// Referral code length.
pub const REFERRAL_CODE_LEN: usize = 8;

// Unambiguous uppercase alphabet (no 0/O, 1/I/L).
const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate a random referral code, e.g. `"K7MPQ2WX"`.
pub fn generate_referral_code() -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_normalizes_case() {
        let a = Address::parse("0xAbCdEf0123456789aBcDeF0123456789abcdef01").unwrap();
        assert_eq!(a.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn address_equality_is_case_insensitive() {
        let upper = Address::parse("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        let lower = Address::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef0101").is_err());
        assert!(Address::parse("0xzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn tx_hash_parses_and_normalizes() {
        let h = TxHash::parse(&format!("0x{}", "AB".repeat(32))).unwrap();
        assert_eq!(h.as_str(), format!("0x{}", "ab".repeat(32)));
        assert!(TxHash::parse("0xab").is_err());
    }

    #[test]
    fn id_serde_round_trip() {
        let a = Address::parse("0xAbCdEf0123456789aBcDeF0123456789abcdef01").unwrap();
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"0xabcdef0123456789abcdef0123456789abcdef01\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);

        // Mixed case on the wire still normalizes.
        let mixed: Address =
            serde_json::from_str("\"0xABCDEF0123456789abcdef0123456789ABCDEF01\"").unwrap();
        assert_eq!(mixed, a);
    }

    #[test]
    fn format_usdc_pads_fraction() {
        assert_eq!(format_usdc(50_000), "0.050000");
        assert_eq!(format_usdc(USDC_ONE), "1.000000");
        assert_eq!(format_usdc(1_234_567), "1.234567");
        assert_eq!(format_usdc(0), "0.000000");
    }

    #[test]
    fn referral_codes_use_alphabet() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LEN);
        assert!(code.bytes().all(|b| REFERRAL_ALPHABET.contains(&b)));
    }
}
