//! Wire messages modeling a WebRTC DataChannel's request-scoped protocol.

use p2psim_types::{Manifest, PeerId, ResourceHash};
use serde::{Deserialize, Serialize};

/// 16 KiB — the chunk size `sendFile` splits content into.
pub const CHUNK_SIZE_BYTES: usize = 16 * 1024;

/// A monotonically increasing id scoping one file-request/response exchange.
pub type RequestId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransportMessage {
    FileRequest {
        hash: ResourceHash,
        request_id: RequestId,
    },
    FileResponse {
        request_id: RequestId,
        success: bool,
        mime_type: Option<String>,
        total_chunks: u32,
        byte_length: u64,
    },
    FileChunk {
        request_id: RequestId,
        chunk_index: u32,
        total_chunks: u32,
        chunk_bytes: Vec<u8>,
    },
    FileComplete {
        request_id: RequestId,
    },
    ManifestRequest {
        from: PeerId,
    },
    ManifestResponse {
        manifest: Manifest,
    },
    Heartbeat {
        t_ms: u64,
    },
}
