use std::collections::VecDeque;
use std::io;

use crate::chunk::{Chunk, NAL_PPS, NAL_SEI, NAL_SPS};
use crate::error::{BusError, Result};

/// Anything that yields whole chunks: a file paired with the chunker, or
/// a transport receiver.
pub trait ChunkSource {
    /// Next chunk, `Ok(None)` when the source is exhausted or closed.
    fn next_chunk(&mut self) -> Result<Option<Chunk>>;
}

/// Ordered queue of chunks with a byte cursor into the head chunk. The
/// downstream decoder consumes it as a lazily-filled byte stream through
/// [`ChunkTracker::pull`] (also exposed as `std::io::Read`).
#[derive(Debug, Default)]
pub struct ChunkTracker {
    chunks: VecDeque<Chunk>,
    pos: usize,
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: Chunk) {
        if self.chunks.is_empty() {
            self.pos = 0;
        }
        self.chunks.push_back(chunk);
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Unconsumed bytes across all queued chunks.
    pub fn queued_bytes(&self) -> usize {
        self.chunks.iter().map(Chunk::size).sum::<usize>() - self.pos
    }

    /// Fills as much of `buf` as possible from the head chunk forward,
    /// dropping each chunk the moment its last byte is consumed. Returns
    /// the byte count written; a short count means the queue ran dry and
    /// the caller should retry once more data has been appended.
    pub fn pull(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            let Some(head) = self.chunks.front() else {
                break;
            };
            let remaining = head.size() - self.pos;
            let want = buf.len() - filled;
            if remaining > want {
                buf[filled..].copy_from_slice(&head.bytes()[self.pos..self.pos + want]);
                self.pos += want;
                filled += want;
            } else {
                buf[filled..filled + remaining].copy_from_slice(&head.bytes()[self.pos..]);
                filled += remaining;
                self.chunks.pop_front();
                self.pos = 0;
            }
        }
        filled
    }

    /// Removes and returns the whole queue, for bulk transmission.
    pub fn drain(&mut self) -> Vec<Chunk> {
        self.pos = 0;
        self.chunks.drain(..).collect()
    }

    /// Header-acquisition phase: pull chunks and append them until each of
    /// SEI, SPS and PPS has been observed at least once. Any other NAL type
    /// arriving first is a protocol violation and aborts the session.
    ///
    /// Returns a copy of the accumulated header chunks so the caller can
    /// persist them.
    pub fn read_headers(&mut self, src: &mut dyn ChunkSource) -> Result<Vec<Chunk>> {
        let mut seen_sei = false;
        let mut seen_sps = false;
        let mut seen_pps = false;
        let mut headers = Vec::new();

        while !(seen_sei && seen_sps && seen_pps) {
            let Some(chunk) = src.next_chunk()? else {
                return Err(BusError::HeadersIncomplete);
            };
            match chunk.nal_type() {
                NAL_SEI => seen_sei = true,
                NAL_SPS => seen_sps = true,
                NAL_PPS => seen_pps = true,
                other => return Err(BusError::ProtocolViolation { nal_type: other }),
            }
            headers.push(chunk.clone());
            self.append(chunk);
        }
        Ok(headers)
    }
}

impl io::Read for ChunkTracker {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.pull(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(payload: &[u8]) -> Chunk {
        let mut data = vec![0, 0, 0, 1];
        data.extend_from_slice(payload);
        Chunk::from_owned(data).unwrap()
    }

    #[test]
    fn test_pull_conservation() {
        let mut tracker = ChunkTracker::new();
        let payloads: [&[u8]; 3] = [&[0x41, 1, 2, 3], &[0x65, 4], &[0x41, 5, 6, 7, 8, 9]];
        let mut expect = Vec::new();
        for p in payloads {
            let c = chunk(p);
            expect.extend_from_slice(c.bytes());
            tracker.append(c);
        }
        let total = expect.len();
        assert_eq!(tracker.queued_bytes(), total);

        // Pull with uneven buffer sizes summing to exactly the queue.
        let mut got = Vec::new();
        for size in [3, 7, 1, total] {
            let mut buf = vec![0u8; size.min(total - got.len())];
            let n = tracker.pull(&mut buf);
            got.extend_from_slice(&buf[..n]);
            if got.len() == total {
                break;
            }
        }
        assert_eq!(got, expect);
        assert!(tracker.is_empty());
        assert_eq!(tracker.pull(&mut [0u8; 8]), 0);
    }

    #[test]
    fn test_pull_short_read_then_resume() {
        let mut tracker = ChunkTracker::new();
        tracker.append(chunk(&[0x41, 0xaa]));

        let mut buf = [0u8; 16];
        let n = tracker.pull(&mut buf);
        assert_eq!(n, 6);
        assert_eq!(&buf[..n], &[0, 0, 0, 1, 0x41, 0xaa]);

        // Queue ran dry; a later append resumes exactly where we left off.
        tracker.append(chunk(&[0x41, 0xbb]));
        let n = tracker.pull(&mut buf);
        assert_eq!(n, 6);
        assert_eq!(&buf[..n], &[0, 0, 0, 1, 0x41, 0xbb]);
    }

    #[test]
    fn test_pull_within_head_chunk() {
        let mut tracker = ChunkTracker::new();
        tracker.append(chunk(&[0x41, 1, 2, 3, 4, 5]));

        let mut buf = [0u8; 4];
        assert_eq!(tracker.pull(&mut buf), 4);
        assert_eq!(buf, [0, 0, 0, 1]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.queued_bytes(), 6);

        // Exact boundary: chunk is released, cursor resets.
        let mut rest = [0u8; 6];
        assert_eq!(tracker.pull(&mut rest), 6);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_drain_returns_queue_in_order() {
        let mut tracker = ChunkTracker::new();
        tracker.append(chunk(&[0x67]));
        tracker.append(chunk(&[0x68]));
        let drained = tracker.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].nal_type(), 7);
        assert_eq!(drained[1].nal_type(), 8);
        assert!(tracker.is_empty());
    }

    struct VecSource(Vec<Chunk>);

    impl ChunkSource for VecSource {
        fn next_chunk(&mut self) -> Result<Option<Chunk>> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.0.remove(0)))
            }
        }
    }

    #[test]
    fn test_read_headers_complete() {
        let mut tracker = ChunkTracker::new();
        let mut src = VecSource(vec![chunk(&[0x67]), chunk(&[0x68]), chunk(&[0x66])]);
        let headers = tracker.read_headers(&mut src).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_read_headers_protocol_violation() {
        let mut tracker = ChunkTracker::new();
        // An IDR slice before the parameter sets are complete.
        let mut src = VecSource(vec![chunk(&[0x67]), chunk(&[0x65])]);
        let err = tracker.read_headers(&mut src).unwrap_err();
        assert!(matches!(err, BusError::ProtocolViolation { nal_type: 5 }));
    }

    #[test]
    fn test_read_headers_eof_before_complete() {
        let mut tracker = ChunkTracker::new();
        let mut src = VecSource(vec![chunk(&[0x67])]);
        let err = tracker.read_headers(&mut src).unwrap_err();
        assert!(matches!(err, BusError::HeadersIncomplete));
    }
}
