use crate::error::ProtocolError;
use crate::segment::SegmentOrder;
use crate::wire::WireBuf;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt::{Display, Formatter};
use serde::Serialize;
use tracing::warn;

/// The four-byte protocol identifier every datagram starts with.
pub const PROTOCOL_ID: &[u8; 4] = b"MXTP";

/// The closed set of supported message types. The two ASCII digits following
///  the protocol identifier select the variant; anything else (including the
///  deprecated types 04, 10 and 11) is rejected as `BadMessageType`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub enum MessageType {
    /// 01 - segment position + Euler rotation, Y-up right-handed
    PoseEuler,
    /// 02 - segment position + quaternion, Z-up right-handed
    PoseQuaternion,
    /// 03 - point positions only, Y-up right-handed
    PosePositions,
    /// 05 - Unity3D pose: position + quaternion, Y-up left-handed, parent-relative
    PoseUnity3d,
    /// 12 - character meta data (tag:value lines)
    MetaData,
    /// 13 - character scale information (segments and points of the null pose)
    ScaleInfo,
    /// 20 - joint angles between point pairs
    JointAngles,
    /// 21 - linear segment kinematics
    LinearKinematics,
    /// 22 - angular segment kinematics
    AngularKinematics,
    /// 23 - raw motion tracker kinematics
    TrackerKinematics,
    /// 24 - whole-body center of mass
    CenterOfMass,
    /// 25 - wall-clock time code
    TimeCode,
}

impl MessageType {
    pub fn from_code(code: u8) -> Option<MessageType> {
        match code {
            1 => Some(MessageType::PoseEuler),
            2 => Some(MessageType::PoseQuaternion),
            3 => Some(MessageType::PosePositions),
            5 => Some(MessageType::PoseUnity3d),
            12 => Some(MessageType::MetaData),
            13 => Some(MessageType::ScaleInfo),
            20 => Some(MessageType::JointAngles),
            21 => Some(MessageType::LinearKinematics),
            22 => Some(MessageType::AngularKinematics),
            23 => Some(MessageType::TrackerKinematics),
            24 => Some(MessageType::CenterOfMass),
            25 => Some(MessageType::TimeCode),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MessageType::PoseEuler => 1,
            MessageType::PoseQuaternion => 2,
            MessageType::PosePositions => 3,
            MessageType::PoseUnity3d => 5,
            MessageType::MetaData => 12,
            MessageType::ScaleInfo => 13,
            MessageType::JointAngles => 20,
            MessageType::LinearKinematics => 21,
            MessageType::AngularKinematics => 22,
            MessageType::TrackerKinematics => 23,
            MessageType::CenterOfMass => 24,
            MessageType::TimeCode => 25,
        }
    }

    /// Which permutation of the body segments this type's items use.
    pub fn segment_order(&self) -> SegmentOrder {
        match self {
            MessageType::PoseUnity3d => SegmentOrder::Unity3d,
            _ => SegmentOrder::Default,
        }
    }

    /// The fixed per-item payload stride in bytes, or `None` for the
    ///  self-delimited types (12, 13, 25).
    pub fn item_stride(&self) -> Option<usize> {
        match self {
            MessageType::PoseEuler => Some(28),
            MessageType::PoseQuaternion => Some(32),
            MessageType::PosePositions => Some(16),
            MessageType::PoseUnity3d => Some(32),
            MessageType::JointAngles => Some(20),
            MessageType::LinearKinematics => Some(40),
            MessageType::AngularKinematics => Some(44),
            MessageType::TrackerKinematics => Some(44),
            MessageType::CenterOfMass => Some(12),
            MessageType::MetaData | MessageType::ScaleInfo | MessageType::TimeCode => None,
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.code())
    }
}

/// The fixed 24-byte header preceding every datagram's payload.
///
/// `message_type` holds the decimal value of the two ASCII digits after the
///  protocol identifier - it is kept raw so that a datagram of an unrecognized
///  type can still be skipped by its `payload_size` (see [`Self::recognized_type`]).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DatagramHeader {
    pub message_type: u8,
    /// increases once per sampling instance; gaps mean lost samples
    pub sample_counter: u32,
    /// high bit: last fragment of this sampling instance; low 7 bits: fragment index
    pub datagram_counter: u8,
    /// number of items in THIS fragment's payload (not the whole frame)
    pub item_count: u8,
    /// milliseconds since the start of the recording
    pub time_code_ms: u32,
    pub character_id: u8,
    pub body_segment_count: u8,
    pub prop_count: u8,
    pub finger_segment_count: u8,
    /// bytes following the header in THIS fragment
    pub payload_size: u16,
}

impl DatagramHeader {
    pub const SERIALIZED_LEN: usize = 24;

    const LAST_FRAGMENT_BIT: u8 = 0x80;

    pub fn is_last_fragment(&self) -> bool {
        self.datagram_counter & Self::LAST_FRAGMENT_BIT != 0
    }

    pub fn fragment_index(&self) -> u8 {
        self.datagram_counter & !Self::LAST_FRAGMENT_BIT
    }

    /// Classifies the raw type code against the closed enumeration.
    pub fn recognized_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::from_code(self.message_type)
            .ok_or(ProtocolError::BadMessageType {
                raw: [b'0' + self.message_type / 10, b'0' + self.message_type % 10],
            })
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_slice(PROTOCOL_ID);
        buf.put_u8(b'0' + self.message_type / 10);
        buf.put_u8(b'0' + self.message_type % 10);
        buf.put_u32(self.sample_counter);
        buf.put_u8(self.datagram_counter);
        buf.put_u8(self.item_count);
        buf.put_u32(self.time_code_ms);
        buf.put_u8(self.character_id);
        buf.put_u8(self.body_segment_count);
        buf.put_u8(self.prop_count);
        buf.put_u8(self.finger_segment_count);
        buf.put_u16(0); // reserved
        buf.put_u16(self.payload_size);
    }

    pub fn deser(buf: &mut impl Buf) -> Result<DatagramHeader, ProtocolError> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            return Err(ProtocolError::Truncated {
                needed: Self::SERIALIZED_LEN,
                remaining: buf.remaining(),
            });
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != PROTOCOL_ID {
            return Err(ProtocolError::BadMagic);
        }

        let digits = [buf.get_u8(), buf.get_u8()];
        if !digits[0].is_ascii_digit() || !digits[1].is_ascii_digit() {
            return Err(ProtocolError::BadMessageType { raw: digits });
        }
        let message_type = (digits[0] - b'0') * 10 + (digits[1] - b'0');

        let sample_counter = buf.try_get_u32()?;
        let datagram_counter = buf.try_get_u8()?;
        let item_count = buf.try_get_u8()?;
        let time_code_ms = buf.try_get_u32()?;
        let character_id = buf.try_get_u8()?;
        let body_segment_count = buf.try_get_u8()?;
        let prop_count = buf.try_get_u8()?;
        let finger_segment_count = buf.try_get_u8()?;
        let _reserved = buf.try_get_u16()?;
        let payload_size = buf.try_get_u16()?;

        Ok(DatagramHeader {
            message_type,
            sample_counter,
            datagram_counter,
            item_count,
            time_code_ms,
            character_id,
            body_segment_count,
            prop_count,
            finger_segment_count,
            payload_size,
        })
    }
}

/// Splits a raw datagram into its header and payload bytes.
///
/// The declared `payload_size` is checked against the bytes actually present.
///  With `lenient_length` the smaller of the two wins and decoding continues;
///  otherwise the mismatch is an error and the datagram is discarded.
pub fn decode_datagram(datagram: &[u8], lenient_length: bool) -> Result<(DatagramHeader, &[u8]), ProtocolError> {
    let mut buf = datagram;
    let header = DatagramHeader::deser(&mut buf)?;

    let declared = header.payload_size as usize;
    if declared == buf.len() {
        return Ok((header, buf));
    }

    if !lenient_length {
        return Err(ProtocolError::LengthMismatch { declared: header.payload_size, actual: buf.len() });
    }

    warn!("datagram (sample {}, character {}) declares {} payload bytes but carries {} - clamping",
        header.sample_counter, header.character_id, declared, buf.len());
    let clamped = buf.len().min(declared);
    Ok((header, &buf[..clamped]))
}

/// Builds a raw datagram from a header and payload; the header's
///  `payload_size` is set from the payload's length. The sending-side
///  counterpart of [`decode_datagram`], used by tests and stream generators.
pub fn encode_datagram(header: &DatagramHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(DatagramHeader::SERIALIZED_LEN + payload.len());
    let mut header = header.clone();
    header.payload_size = payload.len() as u16;
    header.ser(&mut buf);
    buf.put_slice(payload);
    buf.to_vec()
}
