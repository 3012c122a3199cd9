//! Typed payloads and their decoders, one per supported message type.
//!
//! Every decoder is a pure function over the authoritative header (fragment 0)
//!  and the reassembled payload bytes. The strided types (01, 02, 03, 05,
//!  20-24) consume items at a fixed per-item width; types 12, 13 and 25 are
//!  self-delimited. An out-of-range segment id drops the item, never the
//!  frame - real-time progress is privileged over strict correctness.

pub mod info;
pub mod kinematics;
pub mod pose;

pub use info::{MetaData, ScaleInfo, ScalePoint, ScaleSegment, TimeCode};
pub use kinematics::{AngularKinematicsItem, JointAngle, LinearKinematicsItem, TrackerKinematicsItem};
pub use pose::{EulerPoseItem, PointPosition, QuaternionPoseItem};

use crate::error::ProtocolError;
use crate::header::{DatagramHeader, MessageType};
use crate::segment::PointId;
use crate::wire::WireBuf;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tracing::warn;

/// A 3-component vector: position (cm), velocity, acceleration or magnetic
///  field depending on context.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const SERIALIZED_LEN: usize = 12;

    pub fn new(x: f32, y: f32, z: f32) -> Vector3 {
        Vector3 { x, y, z }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_f32(self.x);
        buf.put_f32(self.y);
        buf.put_f32(self.z);
    }

    pub fn deser(buf: &mut impl Buf) -> Result<Vector3, ProtocolError> {
        Ok(Vector3 {
            x: buf.try_get_f32()?,
            y: buf.try_get_f32()?,
            z: buf.try_get_f32()?,
        })
    }
}

/// A unit quaternion in wire order (re, i, j, k). Normalized but not
///  sign-canonical.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const SERIALIZED_LEN: usize = 16;

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_f32(self.w);
        buf.put_f32(self.x);
        buf.put_f32(self.y);
        buf.put_f32(self.z);
    }

    pub fn deser(buf: &mut impl Buf) -> Result<Quaternion, ProtocolError> {
        Ok(Quaternion {
            w: buf.try_get_f32()?,
            x: buf.try_get_f32()?,
            y: buf.try_get_f32()?,
            z: buf.try_get_f32()?,
        })
    }
}

/// Euler rotation in degrees around x, y, z.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct EulerAngles {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EulerAngles {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_f32(self.x);
        buf.put_f32(self.y);
        buf.put_f32(self.z);
    }

    pub fn deser(buf: &mut impl Buf) -> Result<EulerAngles, ProtocolError> {
        Ok(EulerAngles {
            x: buf.try_get_f32()?,
            y: buf.try_get_f32()?,
            z: buf.try_get_f32()?,
        })
    }
}

/// A decoded payload, one variant per supported message type.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub enum Payload {
    PoseEuler(Vec<EulerPoseItem>),
    PoseQuaternion(Vec<QuaternionPoseItem>),
    PosePositions(Vec<PointPosition>),
    PoseUnity3d(Vec<QuaternionPoseItem>),
    MetaData(MetaData),
    ScaleInfo(ScaleInfo),
    JointAngles(Vec<JointAngle>),
    LinearKinematics(Vec<LinearKinematicsItem>),
    AngularKinematics(Vec<AngularKinematicsItem>),
    TrackerKinematics(Vec<TrackerKinematicsItem>),
    CenterOfMass(Vector3),
    TimeCode(TimeCode),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::PoseEuler(_) => MessageType::PoseEuler,
            Payload::PoseQuaternion(_) => MessageType::PoseQuaternion,
            Payload::PosePositions(_) => MessageType::PosePositions,
            Payload::PoseUnity3d(_) => MessageType::PoseUnity3d,
            Payload::MetaData(_) => MessageType::MetaData,
            Payload::ScaleInfo(_) => MessageType::ScaleInfo,
            Payload::JointAngles(_) => MessageType::JointAngles,
            Payload::LinearKinematics(_) => MessageType::LinearKinematics,
            Payload::AngularKinematics(_) => MessageType::AngularKinematics,
            Payload::TrackerKinematics(_) => MessageType::TrackerKinematics,
            Payload::CenterOfMass(_) => MessageType::CenterOfMass,
            Payload::TimeCode(_) => MessageType::TimeCode,
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            Payload::PoseEuler(items) => items.len(),
            Payload::PoseQuaternion(items) => items.len(),
            Payload::PosePositions(items) => items.len(),
            Payload::PoseUnity3d(items) => items.len(),
            Payload::MetaData(meta) => meta.tag_count(),
            Payload::ScaleInfo(scale) => scale.segments.len() + scale.points.len(),
            Payload::JointAngles(items) => items.len(),
            Payload::LinearKinematics(items) => items.len(),
            Payload::AngularKinematics(items) => items.len(),
            Payload::TrackerKinematics(items) => items.len(),
            Payload::CenterOfMass(_) => 1,
            Payload::TimeCode(_) => 1,
        }
    }

    /// Wire segment ids of the items, in item order, for the
    ///  segment-addressed types. Point-addressed and self-delimited payloads
    ///  have none.
    pub fn segment_ids(&self) -> Vec<u32> {
        match self {
            Payload::PoseEuler(items) => items.iter().map(|item| item.segment_id).collect(),
            Payload::PoseQuaternion(items) | Payload::PoseUnity3d(items) => {
                items.iter().map(|item| item.segment_id).collect()
            }
            Payload::LinearKinematics(items) => items.iter().map(|item| item.segment_id).collect(),
            Payload::AngularKinematics(items) => items.iter().map(|item| item.segment_id).collect(),
            Payload::TrackerKinematics(items) => items.iter().map(|item| item.segment_id).collect(),
            Payload::PosePositions(_)
            | Payload::MetaData(_)
            | Payload::ScaleInfo(_)
            | Payload::JointAngles(_)
            | Payload::CenterOfMass(_)
            | Payload::TimeCode(_) => Vec::new(),
        }
    }

    /// The composite point ids the payload references (types 03 and 20).
    ///  Split them with the configured `point_id_multiplier`.
    pub fn point_ids(&self) -> Vec<PointId> {
        match self {
            Payload::PosePositions(items) => items.iter().map(|item| item.point_id).collect(),
            Payload::JointAngles(items) => items.iter()
                .flat_map(|item| [item.parent_point_id, item.child_point_id])
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Serializes the payload back to its wire representation. The inverse of
    ///  [`decode_payload`] for payloads whose items were all in range.
    pub fn ser(&self, buf: &mut BytesMut) {
        fn ser_all<T>(items: &[T], buf: &mut BytesMut, ser: impl Fn(&T, &mut BytesMut)) {
            for item in items {
                ser(item, buf);
            }
        }

        match self {
            Payload::PoseEuler(items) => ser_all(items, buf, EulerPoseItem::ser),
            Payload::PoseQuaternion(items) => ser_all(items, buf, QuaternionPoseItem::ser),
            Payload::PosePositions(items) => ser_all(items, buf, PointPosition::ser),
            Payload::PoseUnity3d(items) => ser_all(items, buf, QuaternionPoseItem::ser),
            Payload::MetaData(meta) => meta.ser(buf),
            Payload::ScaleInfo(scale) => scale.ser(buf),
            Payload::JointAngles(items) => ser_all(items, buf, JointAngle::ser),
            Payload::LinearKinematics(items) => ser_all(items, buf, LinearKinematicsItem::ser),
            Payload::AngularKinematics(items) => ser_all(items, buf, AngularKinematicsItem::ser),
            Payload::TrackerKinematics(items) => ser_all(items, buf, TrackerKinematicsItem::ser),
            Payload::CenterOfMass(position) => position.ser(buf),
            Payload::TimeCode(time_code) => time_code.ser(buf),
        }
    }
}

/// Decodes a reassembled payload according to its message type. `header` is
///  the authoritative header of fragment 0, providing the segment counts.
pub fn decode_payload(
    message_type: MessageType,
    header: &DatagramHeader,
    payload: &[u8],
) -> Result<Payload, ProtocolError> {
    match message_type {
        MessageType::PoseEuler => pose::decode_pose_euler(header, payload).map(Payload::PoseEuler),
        MessageType::PoseQuaternion => pose::decode_pose_quaternion(header, payload).map(Payload::PoseQuaternion),
        MessageType::PosePositions => pose::decode_point_positions(payload).map(Payload::PosePositions),
        MessageType::PoseUnity3d => pose::decode_pose_unity3d(header, payload).map(Payload::PoseUnity3d),
        MessageType::MetaData => info::decode_meta_data(payload).map(Payload::MetaData),
        MessageType::ScaleInfo => info::decode_scale_info(payload).map(Payload::ScaleInfo),
        MessageType::JointAngles => kinematics::decode_joint_angles(payload).map(Payload::JointAngles),
        MessageType::LinearKinematics => kinematics::decode_linear(header, payload).map(Payload::LinearKinematics),
        MessageType::AngularKinematics => kinematics::decode_angular(header, payload).map(Payload::AngularKinematics),
        MessageType::TrackerKinematics => kinematics::decode_tracker(payload).map(Payload::TrackerKinematics),
        MessageType::CenterOfMass => kinematics::decode_center_of_mass(payload).map(Payload::CenterOfMass),
        MessageType::TimeCode => info::decode_time_code(payload).map(Payload::TimeCode),
    }
}

/// Number of items in a strided payload, or `MisalignedPayload` if the length
///  is not a multiple of the stride.
pub(crate) fn checked_item_count(len: usize, stride: usize) -> Result<usize, ProtocolError> {
    if len % stride != 0 {
        return Err(ProtocolError::MisalignedPayload { len, stride });
    }
    Ok(len / stride)
}

/// Validates a wire segment id against the id range the layout allows. An
///  out-of-range id drops the item (with telemetry), not the frame.
pub(crate) fn segment_id_in_range(segment_id: u32, max: u32) -> bool {
    if segment_id >= 1 && segment_id <= max {
        return true;
    }
    warn!("{} - dropping item", ProtocolError::SegmentOutOfRange { segment_id, max });
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn full_header() -> DatagramHeader {
        DatagramHeader {
            message_type: 2,
            sample_counter: 0,
            datagram_counter: 0x80,
            item_count: 0,
            time_code_ms: 0,
            character_id: 0,
            body_segment_count: 23,
            prop_count: 4,
            finger_segment_count: 40,
            payload_size: 0,
        }
    }

    fn position() -> Vector3 {
        Vector3::new(12.5, -3.25, 98.0)
    }

    fn orientation() -> Quaternion {
        Quaternion { w: 0.5, x: -0.5, y: 0.5, z: -0.5 }
    }

    #[rstest]
    #[case::pose_euler(Payload::PoseEuler(vec![
        EulerPoseItem { segment_id: 1, position: position(), rotation: EulerAngles { x: 0.0, y: 173.0, z: -90.0 } },
        EulerPoseItem { segment_id: 67, position: position(), rotation: EulerAngles { x: 1.0, y: 2.0, z: 3.0 } },
    ]))]
    #[case::pose_quaternion(Payload::PoseQuaternion(vec![
        QuaternionPoseItem { segment_id: 23, position: position(), orientation: orientation() },
    ]))]
    #[case::pose_unity3d(Payload::PoseUnity3d(vec![
        QuaternionPoseItem { segment_id: 27, position: position(), orientation: orientation() },
    ]))]
    #[case::linear(Payload::LinearKinematics(vec![
        LinearKinematicsItem { segment_id: 5, position: position(), velocity: position(), acceleration: position() },
    ]))]
    #[case::angular(Payload::AngularKinematics(vec![
        AngularKinematicsItem { segment_id: 6, orientation: orientation(), angular_velocity: position(), angular_acceleration: position() },
    ]))]
    #[case::tracker(Payload::TrackerKinematics(vec![
        TrackerKinematicsItem { segment_id: 900, orientation: orientation(), free_acceleration: position(), magnetic_field: position() },
    ]))]
    #[case::center_of_mass(Payload::CenterOfMass(position()))]
    fn test_payload_round_trip(#[case] payload: Payload) {
        let mut buf = BytesMut::new();
        payload.ser(&mut buf);

        let decoded = decode_payload(payload.message_type(), &full_header(), &buf).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_segment_and_point_id_listings() {
        let pose = Payload::PoseQuaternion(vec![
            QuaternionPoseItem { segment_id: 7, position: position(), orientation: orientation() },
            QuaternionPoseItem { segment_id: 1, position: position(), orientation: orientation() },
        ]);
        assert_eq!(pose.segment_ids(), vec![7, 1]);
        assert!(pose.point_ids().is_empty());

        let joints = Payload::JointAngles(vec![JointAngle {
            parent_point_id: PointId(269),
            child_point_id: PointId(519),
            rotation: EulerAngles { x: 0.0, y: 90.0, z: 0.0 },
        }]);
        assert_eq!(joints.point_ids(), vec![PointId(269), PointId(519)]);
        assert!(joints.segment_ids().is_empty());
    }

    #[test]
    fn test_item_counts() {
        assert_eq!(Payload::CenterOfMass(position()).item_count(), 1);
        assert_eq!(Payload::PoseEuler(vec![]).item_count(), 0);
        assert_eq!(
            Payload::ScaleInfo(ScaleInfo {
                segments: vec![ScaleSegment { name: "Pelvis".to_string(), origin: position() }],
                points: vec![],
            }).item_count(),
            1
        );
    }
}
