use clap::Parser;

use nal_bus::chunk::IframeLog;
use nal_bus::chunker::FileChunks;
use nal_bus::session::now_ms;
use nal_bus::tracker::{ChunkSource, ChunkTracker};
use nal_bus::transport::{ChunkSender, PushTransport, TcpPush};

/// Chunks an Annex-B H.264 file and pushes it, one NAL unit per message,
/// to a pull socket.
#[derive(Parser)]
#[command(name = "send-video")]
struct Args {
    /// Annex-B H.264 input file
    input: String,

    /// Push-socket address to connect to
    addr: String,

    /// Extra playback passes over the file after the first
    #[arg(long, default_value_t = 0)]
    loops: u32,

    /// Frame each chunk with a sender-timestamp metadata header instead
    /// of raw bytes
    #[arg(long)]
    timestamps: bool,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

fn ship<P: PushTransport>(
    sender: &mut ChunkSender<P>,
    tracker: &mut ChunkTracker,
    timestamps: bool,
) -> nal_bus::Result<()> {
    if timestamps {
        for chunk in tracker.drain() {
            sender.send_chunk_with_meta(&chunk, now_ms())?;
        }
        Ok(())
    } else {
        sender.send_all(tracker)
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let mut source = FileChunks::open(&args.input)?;
    let mut tracker = ChunkTracker::new();
    let mut sender = ChunkSender::new(TcpPush::connect(&args.addr)?);
    let mut iframe_log = IframeLog::new();

    // Ship the parameter sets first so the remote decoder can start.
    tracker.read_headers(&mut source)?;
    ship(&mut sender, &mut tracker, args.timestamps)?;

    let mut frame_count: u64 = 0;
    let mut loops_left = args.loops;
    loop {
        match source.next_chunk()? {
            Some(chunk) => {
                iframe_log.dump(&chunk);
                tracker.append(chunk);
                ship(&mut sender, &mut tracker, args.timestamps)?;
                frame_count += 1;
                if frame_count % 100 == 0 {
                    log::info!("sent {} chunks", frame_count);
                }
            }
            None if loops_left > 0 => {
                loops_left -= 1;
                source.rewind()?;
                log::info!("end of file, {} passes left", loops_left);
            }
            None => break,
        }
    }

    println!("reached end of video file, {} chunks sent", frame_count);
    Ok(())
}
