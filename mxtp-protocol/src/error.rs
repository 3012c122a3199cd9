use thiserror::Error;

/// Everything that can go wrong while decoding a datagram or reassembling a frame.
///
/// None of these abort the receiver: the offending unit is dropped at the smallest
///  possible scope (item < frame < fragment < datagram) and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("datagram does not start with the MXTP identifier")]
    BadMagic,

    #[error("message type {:?} is not a recognized MXTP type", raw_code_str(.raw))]
    BadMessageType { raw: [u8; 2] },

    #[error("buffer underflow: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("header declares a payload of {declared} bytes but {actual} are present")]
    LengthMismatch { declared: u16, actual: usize },

    #[error("payload length {len} is not a multiple of the item stride {stride}")]
    MisalignedPayload { len: usize, stride: usize },

    #[error("segment id {segment_id} is outside the expected range 1..={max}")]
    SegmentOutOfRange { segment_id: u32, max: u32 },

    #[error("fragment conflicts with the buffered fragments of its frame")]
    InconsistentFragment,

    #[error("payload content is malformed: {0}")]
    Malformed(&'static str),
}

fn raw_code_str(raw: &[u8; 2]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
