//! The skeletal segment model: index tables for both wire orderings, the
//!  per-frame item layout derived from the header counts, and composite
//!  point identifiers.
//!
//! Segments are identified by a 0-based index; the wire transmits
//!  `id = index + 1` as a u32. Items within a frame are ordered body
//!  segments, then props, then left-hand fingers, then right-hand fingers,
//!  with any group absent when its header count is zero.

use crate::header::DatagramHeader;
use serde::Serialize;

pub const BODY_SEGMENT_COUNT: u8 = 23;
pub const MAX_PROP_COUNT: u8 = 4;
pub const FINGER_SEGMENTS_PER_HAND: u8 = 20;

/// Body segment names in the default wire order (types 01, 02, 03, 20-23).
pub const BODY_SEGMENT_NAMES: [&str; 23] = [
    "Pelvis",
    "L5",
    "L3",
    "T12",
    "T8",
    "Neck",
    "Head",
    "Right Shoulder",
    "Right Upper Arm",
    "Right Forearm",
    "Right Hand",
    "Left Shoulder",
    "Left Upper Arm",
    "Left Forearm",
    "Left Hand",
    "Right Upper Leg",
    "Right Lower Leg",
    "Right Foot",
    "Right Toe",
    "Left Upper Leg",
    "Left Lower Leg",
    "Left Foot",
    "Left Toe",
];

/// Body segment names in the Unity3D wire order (type 05): pelvis, right leg
///  chain, left leg chain, spine, left arm chain, right arm chain, neck, head.
pub const UNITY3D_SEGMENT_NAMES: [&str; 23] = [
    "Pelvis",
    "Right Upper Leg",
    "Right Lower Leg",
    "Right Foot",
    "Right Toe",
    "Left Upper Leg",
    "Left Lower Leg",
    "Left Foot",
    "Left Toe",
    "L5",
    "L3",
    "T12",
    "T8",
    "Left Shoulder",
    "Left Upper Arm",
    "Left Forearm",
    "Left Hand",
    "Right Shoulder",
    "Right Upper Arm",
    "Right Forearm",
    "Right Hand",
    "Neck",
    "Head",
];

pub const PROP_NAMES: [&str; 4] = ["Prop1", "Prop2", "Prop3", "Prop4"];

pub const LEFT_FINGER_SEGMENT_NAMES: [&str; 20] = [
    "Left Carpus",
    "Left First Metacarpal",
    "Left First Proximal Phalange",
    "Left First Distal Phalange",
    "Left Second Metacarpal",
    "Left Second Proximal Phalange",
    "Left Second Middle Phalange",
    "Left Second Distal Phalange",
    "Left Third Metacarpal",
    "Left Third Proximal Phalange",
    "Left Third Middle Phalange",
    "Left Third Distal Phalange",
    "Left Fourth Metacarpal",
    "Left Fourth Proximal Phalange",
    "Left Fourth Middle Phalange",
    "Left Fourth Distal Phalange",
    "Left Fifth Metacarpal",
    "Left Fifth Proximal Phalange",
    "Left Fifth Middle Phalange",
    "Left Fifth Distal Phalange",
];

pub const RIGHT_FINGER_SEGMENT_NAMES: [&str; 20] = [
    "Right Carpus",
    "Right First Metacarpal",
    "Right First Proximal Phalange",
    "Right First Distal Phalange",
    "Right Second Metacarpal",
    "Right Second Proximal Phalange",
    "Right Second Middle Phalange",
    "Right Second Distal Phalange",
    "Right Third Metacarpal",
    "Right Third Proximal Phalange",
    "Right Third Middle Phalange",
    "Right Third Distal Phalange",
    "Right Fourth Metacarpal",
    "Right Fourth Proximal Phalange",
    "Right Fourth Middle Phalange",
    "Right Fourth Distal Phalange",
    "Right Fifth Metacarpal",
    "Right Fifth Proximal Phalange",
    "Right Fifth Middle Phalange",
    "Right Fifth Distal Phalange",
];

/// Which permutation of the 23 body segments a message type uses.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SegmentOrder {
    /// Types 01, 02, 03, 20-23.
    Default,
    /// Type 05. Fingers are not supported in this ordering.
    Unity3d,
}

/// The item groups a character transmits per frame, taken from the header
///  counts of fragment 0. Segment indices are contiguous across groups:
///  body, then props, then left-hand fingers, then right-hand fingers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize)]
pub struct SegmentLayout {
    pub body_count: u8,
    pub prop_count: u8,
    pub finger_count: u8,
}

impl SegmentLayout {
    pub fn from_header(header: &DatagramHeader) -> SegmentLayout {
        SegmentLayout {
            body_count: header.body_segment_count,
            prop_count: header.prop_count,
            finger_count: header.finger_segment_count,
        }
    }

    /// Total number of addressable segments, which is also the highest valid
    ///  wire segment id (`index + 1`).
    pub fn total(&self) -> u32 {
        self.body_count as u32 + self.prop_count as u32 + self.finger_count as u32
    }

    /// Highest valid wire segment id for the Unity3D ordering, which carries
    ///  body segments and props only.
    pub fn total_unity3d(&self) -> u32 {
        self.body_count as u32 + self.prop_count as u32
    }

    /// Name of the segment at a 0-based index, or `None` if the index is
    ///  outside the groups this layout transmits.
    pub fn segment_name(&self, order: SegmentOrder, index: u32) -> Option<&'static str> {
        let body_table = match order {
            SegmentOrder::Default => &BODY_SEGMENT_NAMES,
            SegmentOrder::Unity3d => &UNITY3D_SEGMENT_NAMES,
        };

        let mut rest = index;
        if rest < self.body_count as u32 {
            return body_table.get(rest as usize).copied();
        }
        rest -= self.body_count as u32;

        if rest < self.prop_count as u32 {
            return PROP_NAMES.get(rest as usize).copied();
        }
        rest -= self.prop_count as u32;

        if order == SegmentOrder::Unity3d {
            return None;
        }

        if rest < self.finger_count as u32 {
            let per_hand = FINGER_SEGMENTS_PER_HAND as u32;
            return if rest < per_hand {
                LEFT_FINGER_SEGMENT_NAMES.get(rest as usize).copied()
            } else {
                RIGHT_FINGER_SEGMENT_NAMES.get((rest - per_hand) as usize).copied()
            };
        }
        None
    }
}

/// A composite point identifier: `multiplier * segment_id + local_point_id`.
///
/// The protocol documentation states a multiplier of 100 while its worked
///  example uses 256; the multiplier is therefore configurable
///  (`point_id_multiplier`) and defaults to 256.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct PointId(pub u32);

impl PointId {
    pub fn compose(segment_id: u32, local_point_id: u32, multiplier: u32) -> PointId {
        PointId(multiplier * segment_id + local_point_id)
    }

    pub fn segment_id(&self, multiplier: u32) -> u32 {
        self.0 / multiplier
    }

    pub fn local_point_id(&self, multiplier: u32) -> u32 {
        self.0 % multiplier
    }
}
