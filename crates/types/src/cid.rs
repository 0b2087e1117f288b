//! Content IDs: 32-byte SHA-256 digests rendered as 64-char lowercase hex.

use crate::codec::{self, Value};
use crate::error::CidError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A validated 32-byte identifier.
///
/// Stored as raw bytes; displayed and serialized as lowercase hex. Parsing
/// accepts exactly 64 lowercase hex characters, so any `Hex32` in memory is
/// already shape-valid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hex32([u8; 32]);

impl Hex32 {
    /// The all-zero identifier, used where an event carries no reference.
    pub const ZERO: Hex32 = Hex32([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hex32(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Renders as the canonical 64-char lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hex32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hex32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hex32({})", self.to_hex())
    }
}

impl FromStr for Hex32 {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(CidError::InvalidLength(s.len()));
        }
        // Uppercase digits are rejected: only one rendering per identifier.
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(CidError::InvalidCharacter);
        }
        let raw = hex::decode(s).map_err(|_| CidError::InvalidCharacter)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw);
        Ok(Hex32(out))
    }
}

impl Serialize for Hex32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hex32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: CidError| de::Error::custom(e.to_string()))
    }
}

impl From<Hex32> for Value {
    fn from(h: Hex32) -> Value {
        Value::Text(h.to_hex())
    }
}

/// Raw SHA-256 digest of a byte slice.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// The content ID of a byte sequence.
pub fn cid_from_bytes(bytes: &[u8]) -> Hex32 {
    Hex32(sha256(bytes))
}

/// The content ID of a structured value: hash of its canonical encoding.
pub fn cid_from_value(v: &Value) -> Result<Hex32, crate::error::CodecError> {
    Ok(cid_from_bytes(&codec::encode(v)?))
}

/// Checks a claimed CID against candidate bytes.
pub fn verify_cid(claimed: &Hex32, bytes: &[u8]) -> bool {
    cid_from_bytes(bytes) == *claimed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_the_well_known_digest() {
        assert_eq!(
            cid_from_bytes(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hello_has_the_well_known_digest() {
        assert_eq!(
            cid_from_bytes(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn verify_cid_detects_tampering() {
        let cid = cid_from_bytes(b"payload");
        assert!(verify_cid(&cid, b"payload"));
        assert!(!verify_cid(&cid, b"payloae"));
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        let valid = "a".repeat(64);
        assert!(valid.parse::<Hex32>().is_ok());
        assert!("abc".parse::<Hex32>().is_err());
        assert!("G".repeat(64).parse::<Hex32>().is_err());
        // Uppercase hex is not canonical.
        assert!("A".repeat(64).parse::<Hex32>().is_err());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let cid = cid_from_bytes(b"roundtrip");
        let parsed: Hex32 = cid.to_hex().parse().unwrap();
        assert_eq!(parsed, cid);
    }
}
