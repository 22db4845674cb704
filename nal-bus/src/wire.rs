//! Wire framing for chunks crossing the message bus.
//!
//! Two variants exist. Raw framing is one chunk per transport message
//! with no envelope; the transport itself preserves boundaries. The
//! metadata-prefixed variant is
//!
//! ```text
//! [u16 json_len LE][JSON header of json_len bytes][payload bytes]
//! ```
//!
//! where the JSON header carries a sender timestamp and, on frame
//! egress, payload-size and scaling metadata. Unknown JSON fields are
//! ignored so the header can grow without breaking older peers.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, START_CODE};
use crate::error::{BusError, Result};

/// Out-of-band message metadata. All fields optional on ingest; accept
/// any superset and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMeta {
    /// Sender wall clock, milliseconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    /// Declared payload length, cross-checked against the actual size.
    #[serde(rename = "nalBytes", skip_serializing_if = "Option::is_none")]
    pub nal_bytes: Option<u32>,
    /// Original width/height of the decoded frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ow: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oh: Option<u32>,
    /// Destination width/height for downstream scaling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dw: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dh: Option<u32>,
}

/// Decodes one transport message into a chunk.
///
/// A zero-length message is a keep-alive and yields no chunk. A message
/// opening with the Annex-B start code is a raw-framed chunk; anything
/// else is speculatively parsed as a metadata-prefixed record, and a
/// failure there is a malformed stream.
pub fn decode_message(msg: Bytes) -> Result<Option<Chunk>> {
    if msg.is_empty() {
        return Ok(None);
    }
    if msg.len() >= 4 && &msg[..4] == START_CODE {
        return Chunk::from_transport(msg).map(Some);
    }
    decode_meta_message(msg).map(Some)
}

/// Decodes a metadata-prefixed message into a chunk, moving the JSON
/// `time` field onto the chunk. The chunk payload starts right after the
/// JSON header.
pub fn decode_meta_message(msg: Bytes) -> Result<Chunk> {
    let (meta, payload) = decode_frame_message(msg)?;
    let mut chunk = Chunk::from_transport(payload)?;
    chunk.set_send_time(meta.time);
    Ok(chunk)
}

/// Splits a metadata-prefixed message into its JSON header and payload
/// without imposing chunk semantics on the payload (frame egress
/// messages carry compressed images, not NAL units).
pub fn decode_frame_message(msg: Bytes) -> Result<(WireMeta, Bytes)> {
    if msg.len() < 2 {
        return Err(BusError::ShortMessage {
            needed: 2,
            got: msg.len(),
        });
    }
    let json_len = u16::from_le_bytes([msg[0], msg[1]]) as usize;
    if msg.len() < 2 + json_len {
        return Err(BusError::ShortMessage {
            needed: 2 + json_len,
            got: msg.len(),
        });
    }
    let meta: WireMeta = serde_json::from_slice(&msg[2..2 + json_len])?;
    let payload = msg.slice(2 + json_len..);
    if let Some(declared) = meta.nal_bytes {
        if declared as usize != payload.len() {
            log::warn!(
                "nalBytes {} disagrees with payload size {}; using payload as received",
                declared,
                payload.len()
            );
        }
    }
    Ok((meta, payload))
}

/// Encodes a payload with its metadata header as one transport message.
/// The length prefix is computed from the formatted header, never a
/// constant; numeric fields vary in digit width.
pub fn encode_frame(payload: &[u8], meta: &WireMeta) -> Result<Bytes> {
    let header = serde_json::to_vec(meta)?;
    let mut out = BytesMut::with_capacity(2 + header.len() + payload.len());
    out.put_u16_le(header.len() as u16);
    out.put_slice(&header);
    out.put_slice(payload);
    Ok(out.freeze())
}

/// Raw framing: the chunk's bytes are the message.
pub fn encode_chunk(chunk: &Chunk) -> Bytes {
    Bytes::copy_from_slice(chunk.bytes())
}

/// Metadata framing for a chunk in flight: `time` plus the payload-size
/// cross-check field.
pub fn encode_chunk_with_meta(chunk: &Chunk, time_ms: u64) -> Result<Bytes> {
    let meta = WireMeta {
        time: Some(time_ms),
        nal_bytes: Some(chunk.size() as u32),
        ..WireMeta::default()
    };
    encode_frame(chunk.bytes(), &meta)
}
