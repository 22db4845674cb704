use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A rewindable byte source the chunker scans. `unread` pushes the last
/// `n` bytes back so the next chunk's bytes are not consumed twice.
pub trait ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn unread(&mut self, n: usize) -> io::Result<()>;
}

/// Seekable file source for raw Annex-B elementary streams.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    /// Seek back to the start of the stream for another playback pass.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.file, buf)
    }

    fn unread(&mut self, n: usize) -> io::Result<()> {
        self.file.seek(SeekFrom::Current(-(n as i64))).map(|_| ())
    }
}

/// In-memory byte source, used by tests and loopback setups.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn unread(&mut self, n: usize) -> io::Result<()> {
        if n > self.pos {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unread past start of source",
            ));
        }
        self.pos -= n;
        Ok(())
    }
}
