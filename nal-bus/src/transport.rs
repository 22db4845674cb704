//! Message-bus seam. The pipeline only needs push/pull sockets with
//! preserved message boundaries; the concrete bus library sits behind
//! these two traits. In-tree there is an in-memory pair for tests and
//! loopback, and a length-delimited TCP pair standing in for the
//! push-pull sockets of a real bus.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;

use bytes::Bytes;

use crate::chunk::Chunk;
use crate::error::{BusError, Result};
use crate::tracker::{ChunkSource, ChunkTracker};
use crate::wire;

pub trait PullTransport {
    /// Next message; `Ok(None)` when the peer is gone. A zero-length
    /// message is a keep-alive, not data.
    fn recv(&mut self) -> Result<Option<Bytes>>;
}

pub trait PushTransport {
    fn send(&mut self, msg: &[u8]) -> Result<()>;
}

/// Adapts a pull socket into a chunk source, discarding keep-alives.
pub struct ChunkReceiver<T> {
    transport: T,
}

impl<T: PullTransport> ChunkReceiver<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: PullTransport> ChunkSource for ChunkReceiver<T> {
    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            let Some(msg) = self.transport.recv()? else {
                return Ok(None);
            };
            if let Some(chunk) = wire::decode_message(msg)? {
                return Ok(Some(chunk));
            }
        }
    }
}

/// Outbound side: raw-framed chunks, bulk tracker drains, and
/// metadata-framed frame egress.
pub struct ChunkSender<T> {
    transport: T,
}

impl<T: PushTransport> ChunkSender<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn send_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        self.transport.send(chunk.bytes())
    }

    /// Metadata-framed variant carrying the sender timestamp; the
    /// receiver recovers it as the chunk's `send_time`.
    pub fn send_chunk_with_meta(&mut self, chunk: &Chunk, time_ms: u64) -> Result<()> {
        let msg = wire::encode_chunk_with_meta(chunk, time_ms)?;
        self.transport.send(&msg)
    }

    /// Drains and transmits the tracker's whole queue in order.
    pub fn send_all(&mut self, tracker: &mut ChunkTracker) -> Result<()> {
        for chunk in tracker.drain() {
            self.send_chunk(&chunk)?;
        }
        Ok(())
    }

    pub fn send_frame(&mut self, payload: &[u8], meta: &wire::WireMeta) -> Result<()> {
        let msg = wire::encode_frame(payload, meta)?;
        self.transport.send(&msg)
    }
}

/// In-process transport pair over an mpsc channel.
pub struct MemoryTransport;

impl MemoryTransport {
    pub fn pair() -> (MemoryPush, MemoryPull) {
        let (tx, rx) = mpsc::channel();
        (MemoryPush { tx }, MemoryPull { rx })
    }
}

pub struct MemoryPush {
    tx: mpsc::Sender<Bytes>,
}

impl PushTransport for MemoryPush {
    fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(msg))
            .map_err(|_| BusError::Transport("peer disconnected".into()))
    }
}

pub struct MemoryPull {
    rx: mpsc::Receiver<Bytes>,
}

impl PullTransport for MemoryPull {
    fn recv(&mut self) -> Result<Option<Bytes>> {
        match self.rx.recv() {
            Ok(msg) => Ok(Some(msg)),
            // Sender dropped: the stream is over, not an error.
            Err(mpsc::RecvError) => Ok(None),
        }
    }
}

/// Pull socket over TCP: binds, accepts one peer, reads length-delimited
/// messages (`u32` BE length, then payload; length 0 is a keep-alive).
pub struct TcpPull {
    stream: TcpStream,
}

impl TcpPull {
    pub fn bind(spec: &str) -> Result<Self> {
        let listener = TcpListener::bind(spec)
            .map_err(|e| BusError::Transport(format!("could not bind to {spec}: {e}")))?;
        let (stream, peer) = listener
            .accept()
            .map_err(|e| BusError::Transport(format!("accept on {spec} failed: {e}")))?;
        log::info!("pull socket on {} accepted {}", spec, peer);
        Ok(Self { stream })
    }
}

impl PullTransport for TcpPull {
    fn recv(&mut self) -> Result<Option<Bytes>> {
        let mut len = [0u8; 4];
        match self.stream.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len) as usize;
        let mut msg = vec![0u8; len];
        self.stream.read_exact(&mut msg)?;
        Ok(Some(Bytes::from(msg)))
    }
}

/// Push socket over TCP: connects and writes length-delimited messages.
pub struct TcpPush {
    stream: TcpStream,
}

impl TcpPush {
    pub fn connect(spec: &str) -> Result<Self> {
        let stream = TcpStream::connect(spec)
            .map_err(|e| BusError::Transport(format!("could not connect to {spec}: {e}")))?;
        Ok(Self { stream })
    }
}

impl PushTransport for TcpPush {
    fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.stream.write_all(&(msg.len() as u32).to_be_bytes())?;
        self.stream.write_all(msg)?;
        Ok(())
    }
}
