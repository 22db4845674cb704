use std::time::Instant;

use bytes::Bytes;

use crate::error::{BusError, Result};

/// Annex-B start code (4-byte form).
pub const START_CODE: &[u8] = &[0x00, 0x00, 0x00, 0x01];

/// Smallest valid chunk: start code plus one NAL header byte.
pub const MIN_CHUNK_SIZE: usize = 5;

pub const NAL_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

/// Backing storage for a chunk. Owned buffers come from the file chunker
/// and the header cache; transport buffers are sliced out of a received
/// message. Release is dispatched by variant, so a transport slice is
/// never freed as if it were a heap allocation of our own.
#[derive(Debug, Clone)]
pub enum ChunkBuf {
    Owned(Vec<u8>),
    Transport(Bytes),
}

impl ChunkBuf {
    fn as_slice(&self) -> &[u8] {
        match self {
            ChunkBuf::Owned(v) => v,
            ChunkBuf::Transport(b) => b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// SEI/SPS/PPS parameter-set units that configure the decoder.
    Header,
    /// Everything else, including IDR and non-IDR slices.
    Frame,
}

/// One start-code-prefixed NAL unit, the unit of buffered binary data.
#[derive(Debug, Clone)]
pub struct Chunk {
    buf: ChunkBuf,
    /// Sender wall clock in ms, present only on chunks that arrived via
    /// the metadata-prefixed wire format.
    send_time: Option<u64>,
}

impl Chunk {
    pub fn from_owned(data: Vec<u8>) -> Result<Self> {
        Self::validate(&data)?;
        Ok(Self {
            buf: ChunkBuf::Owned(data),
            send_time: None,
        })
    }

    pub fn from_transport(data: Bytes) -> Result<Self> {
        Self::validate(&data)?;
        Ok(Self {
            buf: ChunkBuf::Transport(data),
            send_time: None,
        })
    }

    fn validate(data: &[u8]) -> Result<()> {
        if data.len() < MIN_CHUNK_SIZE {
            return Err(BusError::ChunkTooShort { size: data.len() });
        }
        if &data[..4] != START_CODE {
            let mut found = [0u8; 4];
            found.copy_from_slice(&data[..4]);
            return Err(BusError::MalformedStartCode { found });
        }
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn size(&self) -> usize {
        self.buf.as_slice().len()
    }

    /// NAL unit type: low 5 bits of the first byte after the start code.
    pub fn nal_type(&self) -> u8 {
        self.buf.as_slice()[4] & 0x1f
    }

    pub fn kind(&self) -> ChunkKind {
        match self.nal_type() {
            NAL_SEI | NAL_SPS | NAL_PPS => ChunkKind::Header,
            _ => ChunkKind::Frame,
        }
    }

    pub fn is_idr(&self) -> bool {
        self.nal_type() == NAL_IDR
    }

    pub fn send_time(&self) -> Option<u64> {
        self.send_time
    }

    pub fn set_send_time(&mut self, time_ms: Option<u64>) {
        self.send_time = time_ms;
    }
}

fn nal_type_name(nal_type: u8) -> Option<&'static str> {
    match nal_type {
        NAL_SEI => Some("SEI"),
        NAL_SPS => Some("SPS"),
        NAL_PPS => Some("PPS"),
        _ => None,
    }
}

/// Per-stream NAL dump state. Tracks the arrival time of the previous IDR
/// chunk so consecutive keyframe intervals can be reported; owned by the
/// caller and threaded through each dump call.
#[derive(Debug, Default)]
pub struct IframeLog {
    last_idr: Option<Instant>,
}

impl IframeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump(&mut self, chunk: &Chunk) {
        let nal_type = chunk.nal_type();
        if nal_type == 1 {
            // non-IDR slices are too chatty to report
            return;
        }
        if chunk.is_idr() {
            let now = Instant::now();
            match self.last_idr.replace(now) {
                Some(prev) => log::info!(
                    "IDR chunk, size {}, interval {:.3} ms",
                    chunk.size(),
                    now.duration_since(prev).as_secs_f64() * 1000.0
                ),
                None => log::info!("IDR chunk, size {}", chunk.size()),
            }
            return;
        }
        match nal_type_name(nal_type) {
            Some(name) => log::debug!("nalu type {}, size {}", name, chunk.size()),
            None => log::debug!("nalu type {}, size {}", nal_type, chunk.size()),
        }
    }
}
