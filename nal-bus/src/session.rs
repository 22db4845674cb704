use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::cache::HeaderCache;
use crate::chunk::IframeLog;
use crate::codec::{FrameEncoder, VideoDecoder};
use crate::diff::{FrameDiff, Verdict};
use crate::error::Result;
use crate::tracker::{ChunkSource, ChunkTracker};
use crate::transport::{ChunkSender, PushTransport};
use crate::wire::WireMeta;

/// Counters reported when a session's loop ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    /// Frames produced by the decoder.
    pub frames_decoded: u64,
    /// Frames that passed the diff filter and were shipped.
    pub frames_emitted: u64,
}

/// One end-to-end decode session: chunks in, filtered compressed frames
/// out. Single-threaded; each stage runs to completion per frame cycle.
pub struct Session<D, E> {
    tracker: ChunkTracker,
    decoder: D,
    encoder: E,
    filter: FrameDiff,
    iframe_log: IframeLog,
    /// Destination size advertised in egress metadata; defaults to the
    /// decoded size when unset.
    dest_size: Option<(u32, u32)>,
}

impl<D: VideoDecoder, E: FrameEncoder> Session<D, E> {
    pub fn new(decoder: D, encoder: E) -> Self {
        Self {
            tracker: ChunkTracker::new(),
            decoder,
            encoder,
            filter: FrameDiff::new(),
            iframe_log: IframeLog::new(),
            dest_size: None,
        }
    }

    pub fn with_dest_size(mut self, width: u32, height: u32) -> Self {
        self.dest_size = Some((width, height));
        self
    }

    /// Startup phase: seed the tracker with header chunks, from the cache
    /// when an entry exists, otherwise by live acquisition, persisting the
    /// result. A corrupt cache entry is evicted and treated as a miss, so
    /// a bad entry never blocks startup while a live source is available.
    /// A store failure is logged and the session proceeds uncached; a
    /// failed acquisition is returned and never cached.
    pub fn start(
        &mut self,
        src: &mut dyn ChunkSource,
        cache: Option<(&HeaderCache, &str)>,
    ) -> Result<()> {
        if let Some((cache, key)) = cache {
            match cache.lookup(key) {
                Ok(Some(headers)) => {
                    log::info!("header cache hit for {:?}: {} chunks", key, headers.len());
                    for chunk in headers {
                        self.tracker.append(chunk);
                    }
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("evicting corrupt header cache entry {:?}: {}", key, e);
                    cache.evict(key)?;
                }
            }
        }

        let headers = self.tracker.read_headers(src)?;
        log::info!("acquired {} header chunks from live stream", headers.len());

        if let Some((cache, key)) = cache {
            match cache.store(key, &headers) {
                Ok(true) => log::debug!("persisted header cache entry {:?}", key),
                Ok(false) => log::debug!("header cache entry {:?} already present", key),
                Err(e) => log::warn!("could not persist header cache entry {:?}: {}", key, e),
            }
        }
        Ok(())
    }

    /// Main loop: fetch a chunk, feed the decoder through the tracker's
    /// pull reader, run every decoded frame through the diff filter and
    /// ship the survivors. Ends on source EOF; transport errors abort.
    pub fn run<P: PushTransport>(
        &mut self,
        src: &mut dyn ChunkSource,
        sink: Option<&mut ChunkSender<P>>,
    ) -> anyhow::Result<SessionStats> {
        let mut stats = SessionStats::default();
        let mut sink = sink;
        let started = Instant::now();

        loop {
            let Some(chunk) = src.next_chunk()? else {
                break;
            };
            self.iframe_log.dump(&chunk);
            self.tracker.append(chunk);

            while let Some(frame) = self.decoder.decode_next(&mut self.tracker)? {
                stats.frames_decoded += 1;
                let now = now_ms();
                if self.filter.evaluate(&frame, now) == Verdict::Drop {
                    continue;
                }
                stats.frames_emitted += 1;

                let image = self.encoder.encode(&frame)?;
                if let Some(sink) = sink.as_mut() {
                    let (dw, dh) = self.dest_size.unwrap_or((frame.width(), frame.height()));
                    let meta = WireMeta {
                        time: Some(now),
                        nal_bytes: Some(image.len() as u32),
                        ow: Some(frame.width()),
                        oh: Some(frame.height()),
                        dw: Some(dw),
                        dh: Some(dh),
                    };
                    sink.send_frame(&image, &meta)?;
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "session done: {} frames decoded, {} emitted, {:.1} ms total ({:.2} ms/frame)",
            stats.frames_decoded,
            stats.frames_emitted,
            elapsed,
            elapsed / stats.frames_decoded.max(1) as f64
        );
        Ok(stats)
    }

    pub fn tracker_mut(&mut self) -> &mut ChunkTracker {
        &mut self.tracker
    }
}

/// Wall clock in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
