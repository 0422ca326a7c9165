//! Deterministic content digest used as a resource identifier.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A content hash: a BLAKE3 digest of a resource's bytes, represented as a
/// hex string at the wire/display boundary and a fixed byte array
/// internally.
///
/// BLAKE3 is used rather than SHA-2 because the simulator hashes on every
/// cache write and every peer-to-peer delivery (receipt verification);
/// the teacher codebase already depends on `blake3` for exactly this kind
/// of hot-path content addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceHash([u8; 32]);

impl Serialize for ResourceHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ResourceHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl ResourceHash {
    /// Wrap a raw 32-byte digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encode the digest (lowercase, no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Hash a byte buffer into a [`ResourceHash`].
///
/// Hashing the empty slice is well-defined and used by the simulator's
/// empty-file boundary test.
pub fn hash_bytes(content: &[u8]) -> ResourceHash {
    let digest = blake3::hash(content);
    ResourceHash(*digest.as_bytes())
}

impl fmt::Display for ResourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid resource hash hex string: {0}")]
pub struct ParseResourceHashError(String);

impl FromStr for ResourceHash {
    type Err = ParseResourceHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|_| ParseResourceHashError(s.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| ParseResourceHashError(s.to_string()))?;
        Ok(ResourceHash(bytes))
    }
}
