use std::path::PathBuf;

use clap::Parser;

use nal_bus::cache::HeaderCache;
use nal_bus::codec::{JpegFrameEncoder, RgbChunkDecoder};
use nal_bus::chunker::FileChunks;
use nal_bus::session::Session;
use nal_bus::tracker::ChunkSource;
use nal_bus::transport::{ChunkReceiver, ChunkSender, TcpPull, TcpPush};

/// Receives an H.264 chunk stream from a file or a pull socket, decodes
/// it, filters visually unchanged frames and pushes the rest as
/// metadata-framed JPEGs.
#[derive(Parser)]
#[command(name = "nal-relay")]
struct Args {
    /// Annex-B H.264 file, or a tcp address to bind with --listen
    input: String,

    /// Treat INPUT as a pull-socket bind address instead of a file
    #[arg(long)]
    listen: bool,

    /// Push-socket address for encoded frames; frames are discarded when
    /// unset
    #[arg(long)]
    push: Option<String>,

    /// Directory of the header cache
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Header cache entry id (requires --cache-dir)
    #[arg(long)]
    cache_id: Option<String>,

    /// Decoded frame size, WIDTHxHEIGHT (loopback decoder)
    #[arg(long, default_value = "640x480")]
    size: String,

    /// Destination size advertised in egress metadata, WIDTHxHEIGHT
    #[arg(long)]
    dest_size: Option<String>,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

fn parse_size(spec: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = spec
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("size must be WIDTHxHEIGHT, got {:?}", spec))?;
    Ok((w.parse()?, h.parse()?))
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let mut src: Box<dyn ChunkSource> = if args.listen {
        log::info!("receiving chunks on {}", args.input);
        Box::new(ChunkReceiver::new(TcpPull::bind(&args.input)?))
    } else {
        log::info!("reading chunks from {}", args.input);
        Box::new(FileChunks::open(&args.input)?)
    };

    let mut sink = match &args.push {
        Some(addr) => {
            log::info!("pushing frames to {}", addr);
            Some(ChunkSender::new(TcpPush::connect(addr)?))
        }
        None => None,
    };

    let cache = args.cache_dir.map(HeaderCache::new);
    let cache_ref = match (&cache, &args.cache_id) {
        (Some(cache), Some(id)) => Some((cache, id.as_str())),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("--cache-dir and --cache-id must be given together")
        }
        (None, None) => None,
    };

    let (width, height) = parse_size(&args.size)?;
    let mut session = Session::new(RgbChunkDecoder::new(width, height), JpegFrameEncoder::new());
    if let Some(spec) = &args.dest_size {
        let (dw, dh) = parse_size(spec)?;
        session = session.with_dest_size(dw, dh);
    }

    log::info!("fetching headers to start decoder");
    session.start(&mut *src, cache_ref)?;

    let stats = session.run(&mut *src, sink.as_mut())?;
    println!(
        "done: {} frames decoded, {} emitted",
        stats.frames_decoded, stats.frames_emitted
    );
    Ok(())
}
