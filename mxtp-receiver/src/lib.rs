//! The collaborators around the MXTP protocol core: a tokio UDP endpoint
//!  that feeds received datagrams to the reassembler and fans completed
//!  frames out to sinks, and a JSONL session recorder.

pub mod endpoint;
pub mod session;
