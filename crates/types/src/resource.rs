//! The opaque content a peer caches and serves.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An opaque byte buffer identified by its content hash.
///
/// `content` is reference-counted `Bytes` rather than `Vec<u8>` so that
/// serving the same cached resource to many concurrent requesters (the
/// common case under a flash crowd) is a cheap clone, not a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(with = "bytes_serde")]
    pub content: Bytes,
    pub mime_type: String,
    pub cached_at_seconds: f64,
}

impl Resource {
    pub fn new(content: Bytes, mime_type: impl Into<String>, cached_at_seconds: f64) -> Self {
        Self {
            content,
            mime_type: mime_type.into(),
            cached_at_seconds,
        }
    }

    pub fn byte_length(&self) -> u64 {
        self.content.len() as u64
    }
}

mod bytes_serde {
    use bytes::Bytes;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes_slice(bytes.as_ref(), serializer)
    }

    fn serde_bytes_slice<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        Ok(Bytes::from(v))
    }
}
