//! Identifiers used throughout the custody rollup.
//!
//! On-chain identifiers (`SettlementId`, `BatchNumber`) are plain counters
//! assigned by the settlement contract. Off-chain commitments use [`Hash32`]
//! and content-store pointers use [`ContentHash`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SettlementId
// ---------------------------------------------------------------------------

/// Identifier of a settlement created on the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SettlementId(pub u64);

impl SettlementId {
    /// Big-endian 32-byte word, as the contract encodes a `uint256`.
    #[must_use]
    pub fn to_word(self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&self.0.to_be_bytes());
        word
    }
}

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "settlement:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchNumber
// ---------------------------------------------------------------------------

/// Monotonically increasing batch counter of the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchNumber(pub u64);

impl BatchNumber {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BatchNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Hash32
// ---------------------------------------------------------------------------

/// A 32-byte digest (Merkle roots, session fingerprints). Serialized as `0x` hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a hex string with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| crate::CustodyError::Serialization(e.to_string()))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            crate::CustodyError::Serialization(format!("expected 32 bytes: {s}"))
        })?;
        Ok(Self(arr))
    }
}

impl From<Hash32> for String {
    fn from(h: Hash32) -> Self {
        h.to_hex()
    }
}

impl TryFrom<String> for Hash32 {
    type Error = crate::CustodyError;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::from_hex(&s)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// Pointer into the content-addressed store (hex SHA-256 of the canonical payload).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// Identifies one bilateral session.
///
/// The pair is stored in canonical (sorted) order, so a message from A to B
/// and its reply from B to A resolve to the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionKey {
    low: String,
    high: String,
}

impl SessionKey {
    #[must_use]
    pub fn new(sender: impl Into<String>, target: impl Into<String>) -> Self {
        let (a, b) = (sender.into(), target.into());
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Returns `true` if `party` is one of the two counterparties.
    #[must_use]
    pub fn includes(&self, party: &str) -> bool {
        self.low == party || self.high == party
    }

    #[must_use]
    pub fn parties(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_number_next() {
        assert_eq!(BatchNumber(5).next(), BatchNumber(6));
    }

    #[test]
    fn settlement_id_word_is_big_endian() {
        let word = SettlementId(0x0102).to_word();
        assert_eq!(word[30], 0x01);
        assert_eq!(word[31], 0x02);
        assert!(word[..30].iter().all(|b| *b == 0));
    }

    #[test]
    fn session_key_is_direction_independent() {
        assert_eq!(SessionKey::new("ALICE", "BOB"), SessionKey::new("BOB", "ALICE"));
        let key = SessionKey::new("BOB", "ALICE");
        assert!(key.includes("ALICE"));
        assert!(!key.includes("CAROL"));
        assert_eq!(key.parties(), ("ALICE", "BOB"));
    }

    #[test]
    fn hash32_hex_roundtrip() {
        let h = Hash32([0xAB; 32]);
        let back = Hash32::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, back);
        assert!(Hash32::from_hex("0x1234").is_err());
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
    }

    #[test]
    fn serde_roundtrips() {
        let key = SessionKey::new("A", "B");
        let json = serde_json::to_string(&key).unwrap();
        let back: SessionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
