use crate::chunk::{Chunk, MIN_CHUNK_SIZE, START_CODE};
use crate::error::{BusError, Result};
use crate::source::{ByteSource, FileSource};
use crate::tracker::ChunkSource;

/// Starting capacity of the accumulation buffer; grows by doubling.
const INITIAL_CAPACITY: usize = 2000;

/// Bytes requested from the source per read.
const READ_STEP: usize = 1000;

/// Hard cap on reads per chunk, bounding memory growth when malformed
/// input never yields another boundary.
const MAX_READ_STEPS: usize = 5000;

/// Scans a byte source for Annex-B start-code boundaries and produces one
/// start-code-prefixed chunk per call. The source is rewound to the next
/// chunk's start code after every successful scan.
pub struct NalChunker {
    buf: Vec<u8>,
    max_read_steps: usize,
}

impl NalChunker {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            max_read_steps: MAX_READ_STEPS,
        }
    }

    #[cfg(test)]
    fn with_read_limit(max_read_steps: usize) -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            max_read_steps,
        }
    }

    /// Returns the next chunk, `Ok(None)` at end of stream. At end of
    /// stream the remainder is returned as the final chunk when it forms
    /// a complete start-code-prefixed unit; only a bare or partial start
    /// code is discarded, never completed into a chunk.
    pub fn next_chunk(&mut self, src: &mut dyn ByteSource) -> Result<Option<Chunk>> {
        self.buf.clear();

        let mut magic = [0u8; 4];
        if read_full(src, &mut magic)? < 4 {
            return Ok(None);
        }
        if magic != START_CODE {
            return Err(BusError::MalformedStartCode { found: magic });
        }
        self.buf.extend_from_slice(&magic);

        for _ in 0..self.max_read_steps {
            if self.buf.len() + READ_STEP > self.buf.capacity() {
                self.buf.reserve(self.buf.capacity());
            }
            let filled = self.buf.len();
            self.buf.resize(filled + READ_STEP, 0);
            let n = src.read(&mut self.buf[filled..])?;
            self.buf.truncate(filled + n);

            // Rescan the 3-byte overlap with the previous read, but never
            // the chunk's own leading start code.
            let scan_from = filled.saturating_sub(3).max(4);
            if let Some(off) = find_start_code(&self.buf[scan_from..]) {
                let boundary = scan_from + off;
                src.unread(self.buf.len() - boundary)?;
                let chunk = Chunk::from_owned(self.buf[..boundary].to_vec())?;
                return Ok(Some(chunk));
            }

            if n < READ_STEP {
                // Short read with no boundary: end of stream. The
                // remainder is the final chunk if it holds a complete
                // start-code-prefixed unit; a bare start code is never
                // fabricated into one.
                if self.buf.len() >= MIN_CHUNK_SIZE {
                    return Chunk::from_owned(self.buf.clone()).map(Some);
                }
                return Ok(None);
            }
        }

        Err(BusError::ChunkTooLarge {
            limit: self.max_read_steps * READ_STEP,
        })
    }
}

impl Default for NalChunker {
    fn default() -> Self {
        Self::new()
    }
}

fn find_start_code(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == START_CODE)
}

fn read_full(src: &mut dyn ByteSource, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// A file paired with a chunker, pulled as a stream of chunks.
pub struct FileChunks {
    source: FileSource,
    chunker: NalChunker,
}

impl FileChunks {
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(Self {
            source: FileSource::open(path)?,
            chunker: NalChunker::new(),
        })
    }

    /// Restart the file for another playback pass.
    pub fn rewind(&mut self) -> std::io::Result<()> {
        self.source.rewind()
    }
}

impl ChunkSource for FileChunks {
    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        self.chunker.next_chunk(&mut self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn annexb(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for u in units {
            out.extend_from_slice(START_CODE);
            out.extend_from_slice(u);
        }
        out
    }

    #[test]
    fn test_two_chunks_round_trip() {
        let p: &[u8] = &[0x67, 0x42, 0x00, 0x1e];
        let q: &[u8] = &[0x65, 0x88, 0x80, 0x10];
        let mut src = MemorySource::new(annexb(&[p, q]));
        let mut chunker = NalChunker::new();

        let first = chunker.next_chunk(&mut src).unwrap().unwrap();
        assert_eq!(&first.bytes()[..4], START_CODE);
        assert_eq!(&first.bytes()[4..], p);
        // Read cursor sits exactly at the second start code.
        assert_eq!(src.position(), 4 + p.len());

        let second = chunker.next_chunk(&mut src).unwrap().unwrap();
        assert_eq!(&second.bytes()[4..], q);

        assert!(chunker.next_chunk(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_bare_trailing_start_code_is_discarded() {
        // The stream ends right after a start code; no chunk can be
        // fabricated from it.
        let mut data = annexb(&[&[0x67, 0x42]]);
        data.extend_from_slice(START_CODE);
        let mut src = MemorySource::new(data);
        let mut chunker = NalChunker::new();

        assert!(chunker.next_chunk(&mut src).unwrap().is_some());
        assert!(chunker.next_chunk(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut src = MemorySource::new(vec![0xde, 0xad, 0xbe, 0xef, 0x00]);
        let mut chunker = NalChunker::new();
        let err = chunker.next_chunk(&mut src).unwrap_err();
        assert!(matches!(err, BusError::MalformedStartCode { .. }));
    }

    #[test]
    fn test_chunk_larger_than_initial_capacity() {
        // One unit well past the 2000-byte starting capacity, so the
        // accumulation buffer must grow across several reads.
        let mut big = vec![0x41u8; 7000];
        big[0] = 0x65;
        let data = annexb(&[&big, &[0x41, 0x9a]]);
        let mut src = MemorySource::new(data);
        let mut chunker = NalChunker::new();

        let c = chunker.next_chunk(&mut src).unwrap().unwrap();
        assert_eq!(c.size(), 4 + big.len());
        assert_eq!(&c.bytes()[4..], &big[..]);
        assert_eq!(src.position(), 4 + big.len());

        let tail = chunker.next_chunk(&mut src).unwrap().unwrap();
        assert_eq!(tail.size(), 6);
    }

    #[test]
    fn test_boundary_free_stream_hits_read_cap() {
        // Valid magic, then no further start code within the read limit.
        let mut data = vec![0, 0, 0, 1];
        data.resize(4 + 3500, 0x41);
        let mut src = MemorySource::new(data);
        let mut chunker = NalChunker::with_read_limit(3);

        let err = chunker.next_chunk(&mut src).unwrap_err();
        assert!(matches!(err, BusError::ChunkTooLarge { limit: 3000 }));
    }

    #[test]
    fn test_boundary_split_across_reads() {
        // Place the next start code so it straddles a 1000-byte read
        // boundary and is only visible through the overlap rescan.
        let mut first = vec![0x41u8; 998];
        first[0] = 0x67;
        let data = annexb(&[&first, &[0x68, 0x01]]);
        let mut src = MemorySource::new(data);
        let mut chunker = NalChunker::new();

        let c = chunker.next_chunk(&mut src).unwrap().unwrap();
        assert_eq!(c.size(), 4 + first.len());
        let c2 = chunker.next_chunk(&mut src).unwrap().unwrap();
        assert_eq!(&c2.bytes()[4..], &[0x68, 0x01]);
    }
}
