//! Decoder and encoder seams. Hardware-accelerated H.264 decode and the
//! pixel-format conversion behind it are external collaborators; they
//! plug in at [`VideoDecoder`] and consume the chunk tracker through its
//! pull-based `Read`. The JPEG side is in-tree.

use std::io::Read;

use bytes::Bytes;

use crate::chunk::{NAL_PPS, NAL_SEI, NAL_SPS};
use crate::frame::RgbFrame;

pub trait VideoDecoder {
    /// Decodes the next frame from the byte stream, `Ok(None)` when more
    /// input is needed. The reader is lazily filled and may return short
    /// reads when the upstream queue runs dry.
    fn decode_next(&mut self, input: &mut dyn Read) -> anyhow::Result<Option<RgbFrame>>;
}

pub trait FrameEncoder {
    fn encode(&mut self, frame: &RgbFrame) -> anyhow::Result<Bytes>;
}

/// Loopback decoder for streams whose frame chunks already carry packed
/// RGB24: `[start code][NAL byte][width*height*3 pixel bytes]`, with
/// 5-byte parameter-set chunks. Stands in for the hardware decoder in
/// tests and loopback runs; it expects whole chunks to be queued before
/// each call.
pub struct RgbChunkDecoder {
    width: u32,
    height: u32,
}

impl RgbChunkDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl VideoDecoder for RgbChunkDecoder {
    fn decode_next(&mut self, input: &mut dyn Read) -> anyhow::Result<Option<RgbFrame>> {
        loop {
            let mut head = [0u8; 5];
            let n = read_full(input, &mut head)?;
            if n == 0 {
                return Ok(None);
            }
            if n < head.len() {
                anyhow::bail!("truncated chunk header ({} bytes)", n);
            }
            if matches!(head[4] & 0x1f, NAL_SEI | NAL_SPS | NAL_PPS) {
                continue;
            }
            let mut pixels = vec![0u8; self.width as usize * self.height as usize * 3];
            let n = read_full(input, &mut pixels)?;
            if n < pixels.len() {
                anyhow::bail!("truncated frame payload ({} of {} bytes)", n, pixels.len());
            }
            return Ok(Some(RgbFrame::new(
                self.width,
                self.height,
                Bytes::from(pixels),
            )?));
        }
    }
}

fn read_full(r: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// JPEG frame encoder over the `jpeg-encoder` crate, 4:2:0 at the same
/// quality the pipeline has always shipped.
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub const DEFAULT_QUALITY: u8 = 75;

    pub fn new() -> Self {
        Self {
            quality: Self::DEFAULT_QUALITY,
        }
    }

    pub fn with_quality(quality: u8) -> Self {
        Self { quality }
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&mut self, frame: &RgbFrame) -> anyhow::Result<Bytes> {
        let width = u16::try_from(frame.width())
            .map_err(|_| anyhow::anyhow!("frame width {} exceeds JPEG limits", frame.width()))?;
        let height = u16::try_from(frame.height())
            .map_err(|_| anyhow::anyhow!("frame height {} exceeds JPEG limits", frame.height()))?;

        let mut out = Vec::new();
        let encoder = jpeg_encoder::Encoder::new(&mut out, self.quality);
        encoder.encode(frame.data(), width, height, jpeg_encoder::ColorType::Rgb)?;
        Ok(Bytes::from(out))
    }
}
