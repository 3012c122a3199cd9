//! Decoders for the derived-kinematics message types: 20 (joint angles),
//!  21 (linear), 22 (angular), 23 (tracker) and 24 (center of mass).

use crate::error::ProtocolError;
use crate::header::DatagramHeader;
use crate::payload::{checked_item_count, segment_id_in_range, EulerAngles, Quaternion, Vector3};
use crate::segment::{PointId, SegmentLayout};
use crate::wire::WireBuf;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tracing::warn;

/// Rotation of a child point relative to a parent point, in degrees.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct JointAngle {
    pub parent_point_id: PointId,
    pub child_point_id: PointId,
    pub rotation: EulerAngles,
}

impl JointAngle {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.parent_point_id.0);
        buf.put_u32(self.child_point_id.0);
        self.rotation.ser(buf);
    }
}

/// Type 21: position plus its first and second derivative.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct LinearKinematicsItem {
    pub segment_id: u32,
    pub position: Vector3,
    pub velocity: Vector3,
    pub acceleration: Vector3,
}

impl LinearKinematicsItem {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.segment_id);
        self.position.ser(buf);
        self.velocity.ser(buf);
        self.acceleration.ser(buf);
    }

    fn deser(buf: &mut impl Buf) -> Result<LinearKinematicsItem, ProtocolError> {
        Ok(LinearKinematicsItem {
            segment_id: buf.try_get_u32()?,
            position: Vector3::deser(buf)?,
            velocity: Vector3::deser(buf)?,
            acceleration: Vector3::deser(buf)?,
        })
    }
}

/// Type 22: orientation plus angular velocity and acceleration (degrees).
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct AngularKinematicsItem {
    pub segment_id: u32,
    pub orientation: Quaternion,
    pub angular_velocity: Vector3,
    pub angular_acceleration: Vector3,
}

impl AngularKinematicsItem {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.segment_id);
        self.orientation.ser(buf);
        self.angular_velocity.ser(buf);
        self.angular_acceleration.ser(buf);
    }

    fn deser(buf: &mut impl Buf) -> Result<AngularKinematicsItem, ProtocolError> {
        Ok(AngularKinematicsItem {
            segment_id: buf.try_get_u32()?,
            orientation: Quaternion::deser(buf)?,
            angular_velocity: Vector3::deser(buf)?,
            angular_acceleration: Vector3::deser(buf)?,
        })
    }
}

/// Type 23: raw sensor data of one motion tracker. Only segments that carry a
///  tracker appear, in no particular order, so ids are not range-checked
///  against the header counts.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct TrackerKinematicsItem {
    pub segment_id: u32,
    pub orientation: Quaternion,
    /// gravity-compensated acceleration
    pub free_acceleration: Vector3,
    pub magnetic_field: Vector3,
}

impl TrackerKinematicsItem {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.segment_id);
        self.orientation.ser(buf);
        self.free_acceleration.ser(buf);
        self.magnetic_field.ser(buf);
    }

    fn deser(buf: &mut impl Buf) -> Result<TrackerKinematicsItem, ProtocolError> {
        Ok(TrackerKinematicsItem {
            segment_id: buf.try_get_u32()?,
            orientation: Quaternion::deser(buf)?,
            free_acceleration: Vector3::deser(buf)?,
            magnetic_field: Vector3::deser(buf)?,
        })
    }
}

pub(crate) fn decode_joint_angles(payload: &[u8]) -> Result<Vec<JointAngle>, ProtocolError> {
    let count = checked_item_count(payload.len(), 20)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(JointAngle {
            parent_point_id: PointId(buf.try_get_u32()?),
            child_point_id: PointId(buf.try_get_u32()?),
            rotation: EulerAngles::deser(&mut buf)?,
        });
    }
    Ok(items)
}

pub(crate) fn decode_linear(header: &DatagramHeader, payload: &[u8]) -> Result<Vec<LinearKinematicsItem>, ProtocolError> {
    let max_segment_id = SegmentLayout::from_header(header).total();
    let count = checked_item_count(payload.len(), 40)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = LinearKinematicsItem::deser(&mut buf)?;
        if segment_id_in_range(item.segment_id, max_segment_id) {
            items.push(item);
        }
    }
    Ok(items)
}

pub(crate) fn decode_angular(header: &DatagramHeader, payload: &[u8]) -> Result<Vec<AngularKinematicsItem>, ProtocolError> {
    let max_segment_id = SegmentLayout::from_header(header).total();
    let count = checked_item_count(payload.len(), 44)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = AngularKinematicsItem::deser(&mut buf)?;
        if segment_id_in_range(item.segment_id, max_segment_id) {
            items.push(item);
        }
    }
    Ok(items)
}

pub(crate) fn decode_tracker(payload: &[u8]) -> Result<Vec<TrackerKinematicsItem>, ProtocolError> {
    let count = checked_item_count(payload.len(), 44)?;

    let mut buf = payload;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = TrackerKinematicsItem::deser(&mut buf)?;
        if item.segment_id == 0 {
            warn!("tracker item with segment id 0 - dropping item");
            continue;
        }
        items.push(item);
    }
    Ok(items)
}

pub(crate) fn decode_center_of_mass(payload: &[u8]) -> Result<Vector3, ProtocolError> {
    if payload.len() != Vector3::SERIALIZED_LEN {
        return Err(ProtocolError::MisalignedPayload { len: payload.len(), stride: Vector3::SERIALIZED_LEN });
    }
    let mut buf = payload;
    Vector3::deser(&mut buf)
}
