use clap::Parser;
use mxtp_protocol::config::MxtpConfig;
use mxtp_protocol::reassembly::CompletedFrame;
use mxtp_protocol::sink::FrameSink;
use mxtp_receiver::endpoint::{EndpointConfig, UdpEndpoint};
use mxtp_receiver::session::SessionWriter;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::select;
use tracing::{debug, info, trace, Level};

#[derive(Parser)]
struct Args {
    /// address to listen on
    #[clap(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// UDP port the stream is sent to
    #[clap(long, default_value_t = mxtp_protocol::DEFAULT_PORT)]
    port: u16,

    /// record received frames as JSONL session files into this directory
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// milliseconds before an incomplete frame is given up on
    #[clap(long)]
    timeout_ms: Option<u64>,

    /// composite point id multiplier: 256 (the documented example) or 100 (the documented text)
    #[clap(long)]
    point_id_multiplier: Option<u32>,

    /// reject datagrams whose declared payload size disagrees with the bytes received
    #[clap(long, default_value_t = false)]
    strict_length: bool,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut protocol = MxtpConfig::default();
    if let Some(timeout_ms) = args.timeout_ms {
        protocol.reassembly_timeout_ms = timeout_ms;
    }
    if let Some(multiplier) = args.point_id_multiplier {
        protocol.point_id_multiplier = multiplier;
    }
    protocol.lenient_length = !args.strict_length;

    let bind_addr = SocketAddr::new(args.bind, args.port);

    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(LogSink)];
    if let Some(output_dir) = &args.output_dir {
        sinks.push(Box::new(SessionWriter::create(output_dir, bind_addr, protocol.point_id_multiplier)?));
    }

    let mut endpoint = UdpEndpoint::bind(
        EndpointConfig { protocol, ..EndpointConfig::for_addr(bind_addr) },
        sinks,
    ).await?;

    select! {
        result = endpoint.recv_loop() => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    info!("characters seen: {:?}", endpoint.characters());
    info!("received {}", endpoint.counters().summary());
    debug!("stream stats: {:?}", endpoint.stream_stats());
    Ok(())
}

struct LogSink;

impl FrameSink for LogSink {
    fn on_frame(&mut self, frame: &CompletedFrame) {
        debug!("frame: character {}, sample {}, type {}, {} items",
            frame.character_id, frame.sample_counter, frame.message_type, frame.payload.item_count());
        for segment_id in frame.payload.segment_ids() {
            trace!("  segment {}: {}", segment_id,
                frame.segment_name(segment_id).unwrap_or("<outside announced layout>"));
        }
    }
}
