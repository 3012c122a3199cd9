use mxtp_protocol::config::MxtpConfig;
use mxtp_protocol::header::MessageType;
use mxtp_protocol::reassembly::{Reassembler, StreamStats};
use mxtp_protocol::sink::FrameSink;
use rustc_hash::FxHashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::select;
use tokio::time::interval;
use tracing::{debug, error, info, trace};

pub struct EndpointConfig {
    pub bind_addr: SocketAddr,
    /// sized for the largest possible datagram - UDP truncates anything longer
    pub recv_buffer_size: usize,
    pub protocol: MxtpConfig,
}

impl EndpointConfig {
    pub fn for_addr(bind_addr: SocketAddr) -> EndpointConfig {
        EndpointConfig {
            bind_addr,
            recv_buffer_size: 65535,
            protocol: MxtpConfig::default(),
        }
    }
}

/// Per-message-type frame counters, for the shutdown summary and monitoring.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FrameCounters {
    by_type: FxHashMap<MessageType, u64>,
    total: u64,
}

impl FrameCounters {
    pub fn record(&mut self, message_type: MessageType) {
        *self.by_type.entry(message_type).or_default() += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, message_type: MessageType) -> u64 {
        self.by_type.get(&message_type).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let mut per_type: Vec<(u8, u64)> = self.by_type.iter()
            .map(|(message_type, count)| (message_type.code(), *count))
            .collect();
        per_type.sort_unstable();

        if per_type.is_empty() {
            return format!("{} frames", self.total);
        }
        let breakdown = per_type.iter()
            .map(|(code, count)| format!("{:02}: {}", code, count))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} frames ({})", self.total, breakdown)
    }
}

/// Owns the UDP socket and the receive loop: datagram in, reassembled frames
///  out to the registered sinks. The protocol core stays synchronous; this is
///  the only place that touches the network or the clock.
pub struct UdpEndpoint {
    socket: UdpSocket,
    reassembler: Reassembler,
    sinks: Vec<Box<dyn FrameSink>>,
    counters: FrameCounters,
    recv_buffer_size: usize,
    tick_period: Duration,
    started: Instant,
}

impl UdpEndpoint {
    pub async fn bind(config: EndpointConfig, sinks: Vec<Box<dyn FrameSink>>) -> anyhow::Result<UdpEndpoint> {
        config.protocol.validate()?;

        let socket = UdpSocket::bind(config.bind_addr).await?;
        info!("listening for MXTP datagrams on {:?}", socket.local_addr()?);

        // drive eviction at twice the timeout resolution
        let tick_period = Duration::from_millis((config.protocol.reassembly_timeout_ms / 2).max(1));

        Ok(UdpEndpoint {
            socket,
            reassembler: Reassembler::new(config.protocol),
            sinks,
            counters: FrameCounters::default(),
            recv_buffer_size: config.recv_buffer_size,
            tick_period,
            started: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.counters
    }

    pub fn stream_stats(&self) -> &StreamStats {
        self.reassembler.stats()
    }

    /// Character ids seen on the stream so far.
    pub fn characters(&self) -> Vec<u8> {
        self.reassembler.characters()
    }

    /// Receives datagrams until the task is dropped or cancelled. Socket
    ///  errors are logged and the loop keeps going; a lossy stream is the
    ///  normal case, not a reason to stop.
    pub async fn recv_loop(&mut self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.recv_buffer_size];
        let mut tick = interval(self.tick_period);

        let started = self.started;
        let socket = &self.socket;
        let reassembler = &mut self.reassembler;
        let counters = &mut self.counters;
        let sinks = &mut self.sinks;

        loop {
            select! {
                recv_result = socket.recv_from(&mut buf) => {
                    match recv_result {
                        Ok((len, from)) => {
                            trace!("received {} bytes from {:?}", len, from);
                            let now_ms = started.elapsed().as_millis() as u64;
                            for frame in reassembler.push(&buf[..len], now_ms) {
                                counters.record(frame.message_type);
                                for sink in sinks.iter_mut() {
                                    sink.on_frame(&frame);
                                }
                            }
                        }
                        Err(e) => {
                            error!("error receiving UDP datagram: {}", e);
                        }
                    }
                }
                _ = tick.tick() => {
                    let now_ms = started.elapsed().as_millis() as u64;
                    for eviction in reassembler.tick(now_ms) {
                        debug!("gave up on frame (character {}, sample {}) after buffering {} fragments",
                            eviction.character_id, eviction.sample_counter, eviction.fragments_buffered);
                    }
                }
            }
        }
    }
}
