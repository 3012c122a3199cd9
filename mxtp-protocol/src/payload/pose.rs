//! Decoders for the pose message types: 01 (Euler), 02 (quaternion),
//!  03 (point positions) and 05 (Unity3D).
//!
//! Coordinate conventions differ per type and are documented on the item
//!  structs; the decoders pass the floats through untouched.

use crate::error::ProtocolError;
use crate::header::DatagramHeader;
use crate::payload::{checked_item_count, segment_id_in_range, EulerAngles, Quaternion, Vector3};
use crate::segment::{PointId, SegmentLayout};
use crate::wire::WireBuf;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

/// One item of a type 01 pose: position in cm and Euler rotation in degrees,
///  Y-up, right-handed.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct EulerPoseItem {
    pub segment_id: u32,
    pub position: Vector3,
    pub rotation: EulerAngles,
}

impl EulerPoseItem {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.segment_id);
        self.position.ser(buf);
        self.rotation.ser(buf);
    }

    fn deser(buf: &mut impl Buf) -> Result<EulerPoseItem, ProtocolError> {
        Ok(EulerPoseItem {
            segment_id: buf.try_get_u32()?,
            position: Vector3::deser(buf)?,
            rotation: EulerAngles::deser(buf)?,
        })
    }
}

/// One item of a type 02 (Z-up, right-handed) or type 05 (Y-up, left-handed,
///  parent-relative except pelvis and props) pose.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct QuaternionPoseItem {
    pub segment_id: u32,
    pub position: Vector3,
    pub orientation: Quaternion,
}

impl QuaternionPoseItem {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.segment_id);
        self.position.ser(buf);
        self.orientation.ser(buf);
    }

    fn deser(buf: &mut impl Buf) -> Result<QuaternionPoseItem, ProtocolError> {
        Ok(QuaternionPoseItem {
            segment_id: buf.try_get_u32()?,
            position: Vector3::deser(buf)?,
            orientation: Quaternion::deser(buf)?,
        })
    }
}

/// One item of a type 03 payload: an anatomical landmark position, Y-up,
///  right-handed. The composite point id is kept raw; split it with the
///  configured multiplier.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct PointPosition {
    pub point_id: PointId,
    pub position: Vector3,
}

impl PointPosition {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.point_id.0);
        self.position.ser(buf);
    }
}

pub(crate) fn decode_pose_euler(header: &DatagramHeader, payload: &[u8]) -> Result<Vec<EulerPoseItem>, ProtocolError> {
    let max_segment_id = SegmentLayout::from_header(header).total();
    let count = checked_item_count(payload.len(), 28)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = EulerPoseItem::deser(&mut buf)?;
        if segment_id_in_range(item.segment_id, max_segment_id) {
            items.push(item);
        }
    }
    Ok(items)
}

pub(crate) fn decode_pose_quaternion(header: &DatagramHeader, payload: &[u8]) -> Result<Vec<QuaternionPoseItem>, ProtocolError> {
    let max_segment_id = SegmentLayout::from_header(header).total();
    decode_quaternion_items(payload, max_segment_id)
}

pub(crate) fn decode_pose_unity3d(header: &DatagramHeader, payload: &[u8]) -> Result<Vec<QuaternionPoseItem>, ProtocolError> {
    // fingers are not part of the Unity3D ordering
    let max_segment_id = SegmentLayout::from_header(header).total_unity3d();
    decode_quaternion_items(payload, max_segment_id)
}

fn decode_quaternion_items(payload: &[u8], max_segment_id: u32) -> Result<Vec<QuaternionPoseItem>, ProtocolError> {
    let count = checked_item_count(payload.len(), 32)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = QuaternionPoseItem::deser(&mut buf)?;
        if segment_id_in_range(item.segment_id, max_segment_id) {
            items.push(item);
        }
    }
    Ok(items)
}

pub(crate) fn decode_point_positions(payload: &[u8]) -> Result<Vec<PointPosition>, ProtocolError> {
    let count = checked_item_count(payload.len(), 16)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(PointPosition {
            point_id: PointId(buf.try_get_u32()?),
            position: Vector3::deser(&mut buf)?,
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn header_with_counts(body: u8, props: u8, fingers: u8) -> DatagramHeader {
        DatagramHeader {
            message_type: 1,
            sample_counter: 0,
            datagram_counter: 0x80,
            item_count: 0,
            time_code_ms: 0,
            character_id: 0,
            body_segment_count: body,
            prop_count: props,
            finger_segment_count: fingers,
            payload_size: 0,
        }
    }

    #[test]
    fn test_decode_pose_euler_literal_bytes() {
        // segment 1 (Pelvis) at (50, 0, 10) rotated 173 degrees around y
        let payload: &[u8] = &[
            0x00, 0x00, 0x00, 0x01,
            0x42, 0x48, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x41, 0x20, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x43, 0x2D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let items = decode_pose_euler(&header_with_counts(23, 0, 0), payload).unwrap();
        assert_eq!(items, vec![EulerPoseItem {
            segment_id: 1,
            position: Vector3::new(50.0, 0.0, 10.0),
            rotation: EulerAngles { x: 0.0, y: 173.0, z: 0.0 },
        }]);
    }

    #[rstest]
    #[case::euler(27, 28)]
    #[case::quaternion(33, 32)]
    #[case::points(15, 16)]
    fn test_misaligned_payload(#[case] len: usize, #[case] stride: usize) {
        let payload = vec![0u8; len];
        let header = header_with_counts(23, 0, 0);
        let result = match stride {
            28 => decode_pose_euler(&header, &payload).map(|_| ()),
            32 => decode_pose_quaternion(&header, &payload).map(|_| ()),
            _ => decode_point_positions(&payload).map(|_| ()),
        };
        assert_eq!(result, Err(ProtocolError::MisalignedPayload { len, stride }));
    }

    fn quaternion_item(segment_id: u32) -> QuaternionPoseItem {
        QuaternionPoseItem {
            segment_id,
            position: Vector3::new(1.0, 2.0, 3.0),
            orientation: Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 },
        }
    }

    #[test]
    fn test_out_of_range_segment_is_dropped_not_fatal() {
        let mut buf = BytesMut::new();
        quaternion_item(1).ser(&mut buf);
        quaternion_item(99).ser(&mut buf); // beyond 23 body segments
        quaternion_item(23).ser(&mut buf);

        let items = decode_pose_quaternion(&header_with_counts(23, 0, 0), &buf).unwrap();
        assert_eq!(items, vec![quaternion_item(1), quaternion_item(23)]);
    }

    #[test]
    fn test_segment_id_zero_is_dropped() {
        let mut buf = BytesMut::new();
        quaternion_item(0).ser(&mut buf);

        let items = decode_pose_quaternion(&header_with_counts(23, 0, 0), &buf).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_unity3d_rejects_finger_range_ids() {
        // 23 body + 2 props: ids up to 25 are valid in Unity3D order even
        //  though the header also announces fingers
        let header = header_with_counts(23, 2, 40);
        let mut buf = BytesMut::new();
        quaternion_item(25).ser(&mut buf);
        quaternion_item(26).ser(&mut buf);

        let items = decode_pose_unity3d(&header, &buf).unwrap();
        assert_eq!(items, vec![quaternion_item(25)]);
    }

    #[test]
    fn test_decode_point_positions() {
        let mut buf = BytesMut::new();
        let expected = vec![
            PointPosition { point_id: PointId(269), position: Vector3::new(0.5, -0.5, 9.0) },
            PointPosition { point_id: PointId(513), position: Vector3::new(0.0, 0.0, 0.0) },
        ];
        for item in &expected {
            item.ser(&mut buf);
        }
        assert_eq!(decode_point_positions(&buf).unwrap(), expected);
    }

    #[rstest]
    #[case::empty(0)]
    #[case::single(1)]
    #[case::full_body(23)]
    fn test_euler_round_trip(#[case] count: u32) {
        let items: Vec<EulerPoseItem> = (1..=count)
            .map(|i| EulerPoseItem {
                segment_id: i,
                position: Vector3::new(i as f32, -(i as f32), 0.25 * i as f32),
                rotation: EulerAngles { x: 90.0, y: -45.5, z: 180.0 },
            })
            .collect();

        let mut buf = BytesMut::new();
        for item in &items {
            item.ser(&mut buf);
        }
        assert_eq!(decode_pose_euler(&header_with_counts(23, 0, 0), &buf).unwrap(), items);
    }
}
