//! Chunked H.264 transport bus: Annex-B chunking, pull-based buffering
//! for a hardware decoder, two-variant wire framing, a cross-session
//! header cache and a perceptual frame-difference filter.

pub mod cache;
pub mod chunk;
pub mod chunker;
pub mod codec;
pub mod diff;
pub mod error;
pub mod frame;
pub mod session;
pub mod source;
pub mod tracker;
pub mod transport;
pub mod wire;

pub use chunk::{Chunk, ChunkKind};
pub use error::{BusError, Result};
pub use tracker::ChunkTracker;
