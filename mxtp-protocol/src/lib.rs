//! Receiver-side core of the MXTP real-time motion capture streaming
//!  protocol: a datagram codec and a frame reassembler over opaque byte
//!  buffers. Transports deliver buffers, sinks receive typed frames; this
//!  crate does neither I/O nor threading and has no global state.
//!
//! ## Datagram layout
//!
//! Every datagram starts with a fixed 24-byte header, all numbers in network
//!  byte order (BE):
//!
//! ```ascii
//!  0: id string (6 bytes): "MXTP" followed by two ASCII digits selecting
//!     the message type
//!  6: sample counter (u32) - one sampling instance produces one logical
//!     frame; fragments of a frame share the counter
//! 10: datagram counter (u8) - high bit: last fragment of the frame,
//!     low 7 bits: fragment index
//! 11: number of items in this fragment's payload (u8)
//! 12: time code (u32) - milliseconds since the start of the recording
//! 16: character id (u8) - multiple tracked subjects share a stream
//! 17: number of body segments (u8, 23 for a full body)
//! 18: number of props (u8, 0-4)
//! 19: number of finger tracking segments (u8, 0 or 40)
//! 20: reserved (2 bytes, zero on write, ignored on read)
//! 22: payload size (u16) - bytes following the header in this fragment
//! ```
//!
//! ## Message types
//!
//! | code | payload                                    | per item |
//! |------|--------------------------------------------|----------|
//! | 01   | segment position + Euler rotation          | 28 bytes |
//! | 02   | segment position + quaternion              | 32 bytes |
//! | 03   | point positions                            | 16 bytes |
//! | 05   | Unity3D pose (position + quaternion)       | 32 bytes |
//! | 12   | character meta data (`tag:value` lines)    | -        |
//! | 13   | character scale information                | -        |
//! | 20   | joint angles                               | 20 bytes |
//! | 21   | linear segment kinematics                  | 40 bytes |
//! | 22   | angular segment kinematics                 | 44 bytes |
//! | 23   | motion tracker kinematics                  | 44 bytes |
//! | 24   | center of mass                             | 12 bytes |
//! | 25   | time code (`HH:MM:SS.mmm`)                 | -        |
//!
//! The deprecated types 04, 10 and 11 are not implemented; datagrams
//!  carrying them (or any other code) are skipped by their declared payload
//!  size without disturbing the stream.
//!
//! ## Reassembly
//!
//! A frame larger than one UDP payload is split into up to 128 fragments
//!  sharing the sample counter. The [`reassembly::Reassembler`] buffers
//!  fragments per `(character, sample)` key until the last-fragment bit has
//!  been seen and no index is missing, then decodes the concatenated payload
//!  and emits a [`reassembly::CompletedFrame`]. The transport is assumed
//!  lossy and unacknowledged: incomplete partials are evicted by a
//!  per-character capacity bound, a sample-counter window and a wall-clock
//!  timeout, and eviction is telemetry rather than an error.

pub mod config;
pub mod error;
pub mod header;
pub mod payload;
pub mod reassembly;
pub mod segment;
pub mod sink;
pub mod wire;

/// The well-known UDP port MXTP streams are sent to by default. Binding and
///  receiving is the transport's concern, not this crate's.
pub const DEFAULT_PORT: u16 = 9763;

#[cfg(test)]
mod tests {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
