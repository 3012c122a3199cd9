//! Feeds a few hand-built datagrams through the reassembler: a
//!  single-fragment Euler pose, a quaternion pose split across two
//!  fragments arriving out of order, a point position addressed by its
//!  composite id, and a time code.

use bytes::BytesMut;
use mxtp_protocol::config::MxtpConfig;
use mxtp_protocol::header::{encode_datagram, DatagramHeader};
use mxtp_protocol::payload::{EulerAngles, EulerPoseItem, PointPosition, Quaternion, QuaternionPoseItem, TimeCode};
use mxtp_protocol::payload::Vector3;
use mxtp_protocol::reassembly::Reassembler;
use mxtp_protocol::segment::PointId;
use tracing::info;

fn header(message_type: u8, sample: u32, datagram_counter: u8, item_count: u8) -> DatagramHeader {
    DatagramHeader {
        message_type,
        sample_counter: sample,
        datagram_counter,
        item_count,
        time_code_ms: 40 * sample,
        character_id: 0,
        body_segment_count: 23,
        prop_count: 0,
        finger_segment_count: 0,
        payload_size: 0,
    }
}

fn main() {
    tracing_subscriber::fmt().init();

    let mut reassembler = Reassembler::new(MxtpConfig::default());

    // one complete Euler frame in a single datagram
    let mut payload = BytesMut::new();
    EulerPoseItem {
        segment_id: 1,
        position: Vector3::new(50.0, 0.0, 10.0),
        rotation: EulerAngles { x: 0.0, y: 173.0, z: 0.0 },
    }.ser(&mut payload);
    let euler = encode_datagram(&header(1, 1, 0x80, 1), &payload);

    // a quaternion frame split into two fragments, tail first
    let item = |segment_id| QuaternionPoseItem {
        segment_id,
        position: Vector3::new(0.0, 0.0, 100.0),
        orientation: Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 },
    };
    let mut head_payload = BytesMut::new();
    item(1).ser(&mut head_payload);
    let mut tail_payload = BytesMut::new();
    item(2).ser(&mut tail_payload);
    let head = encode_datagram(&header(2, 2, 0x00, 1), &head_payload);
    let tail = encode_datagram(&header(2, 2, 0x81, 1), &tail_payload);

    // Sacrum (local point 13) on Pelvis (segment 1), addressed by composite id
    let multiplier = reassembler.config().point_id_multiplier;
    let mut points_payload = BytesMut::new();
    PointPosition {
        point_id: PointId::compose(1, 13, multiplier),
        position: Vector3::new(0.0, -1.5, 92.0),
    }.ser(&mut points_payload);
    let points = encode_datagram(&header(3, 3, 0x80, 1), &points_payload);

    let mut time_payload = BytesMut::new();
    TimeCode::new("00:00:00.160").unwrap().ser(&mut time_payload);
    let time_code = encode_datagram(&header(25, 4, 0x80, 1), &time_payload);

    for (now_ms, datagram) in [(0u64, &euler), (1, &tail), (2, &head), (3, &points), (4, &time_code)] {
        for frame in reassembler.push(datagram, now_ms) {
            info!("completed frame: character {}, sample {}, type {}, {} items",
                frame.character_id, frame.sample_counter, frame.message_type, frame.payload.item_count());
            for segment_id in frame.payload.segment_ids() {
                info!("  segment {}: {}", segment_id, frame.segment_name(segment_id).unwrap_or("<unknown>"));
            }
            for point_id in frame.payload.point_ids() {
                info!("  point {} = segment {}, local point {}", point_id.0,
                    point_id.segment_id(multiplier), point_id.local_point_id(multiplier));
            }
        }
    }

    info!("stats: {:?}", reassembler.stats());
}
