use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BusError>;

/// Errors produced by the chunk pipeline. Short reads from the tracker are
/// not errors; they surface as partial byte counts on `pull`.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bytes at a chunk boundary are not the Annex-B start code.
    /// Fatal for the current stream.
    #[error("bad start code at chunk boundary: {found:02x?}")]
    MalformedStartCode { found: [u8; 4] },

    /// A chunk must carry at least the 4-byte start code plus one NAL
    /// header byte.
    #[error("chunk of {size} bytes is shorter than start code + NAL header")]
    ChunkTooShort { size: usize },

    /// No NAL boundary was found within the chunker's safety limit.
    #[error("no NAL boundary within {limit} bytes")]
    ChunkTooLarge { limit: usize },

    /// A non-header NAL type arrived before all of SEI/SPS/PPS were seen.
    #[error("unexpected NAL type {nal_type} during header acquisition")]
    ProtocolViolation { nal_type: u8 },

    /// The source ended before header acquisition completed.
    #[error("stream ended before all header chunks were seen")]
    HeadersIncomplete,

    /// A transport message is shorter than its declared envelope.
    #[error("message of {got} bytes is shorter than its {needed}-byte envelope")]
    ShortMessage { needed: usize, got: usize },

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("bad metadata header: {0}")]
    Json(#[from] serde_json::Error),
}
