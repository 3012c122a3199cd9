//! Decoders for the self-delimited informational types: 12 (meta data),
//!  13 (scale / null pose) and 25 (time code).

use crate::error::ProtocolError;
use crate::payload::Vector3;
use crate::wire::{WireBuf, WireBufMut};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Flag bits carried on each scale point.
pub mod point_flags {
    pub const CONTACT: u32 = 1 << 0;
    pub const FOOT_CONTACT: u32 = 1 << 1;
    pub const REJECTED: u32 = 1 << 2;
    pub const INTERPOLATED: u32 = 1 << 3;
}

/// Type 12: character meta data, transmitted as newline-separated
///  `tag:value` lines. Unknown tags are preserved; a duplicate tag wins over
///  earlier occurrences.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct MetaData {
    pub name: Option<String>,
    pub xmid: Option<String>,
    /// hex `RRGGBB`
    pub color: Option<String>,
    pub additional_tags: BTreeMap<String, String>,
}

impl MetaData {
    pub fn tag_count(&self) -> usize {
        [&self.name, &self.xmid, &self.color].iter().filter(|t| t.is_some()).count()
            + self.additional_tags.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        let mut lines = Vec::new();
        if let Some(name) = &self.name {
            lines.push(format!("name:{}", name));
        }
        if let Some(xmid) = &self.xmid {
            lines.push(format!("xmid:{}", xmid));
        }
        if let Some(color) = &self.color {
            lines.push(format!("color:{}", color));
        }
        for (tag, value) in &self.additional_tags {
            lines.push(format!("{}:{}", tag, value));
        }
        buf.put_slice(lines.join("\n").as_bytes());
    }
}

pub(crate) fn decode_meta_data(payload: &[u8]) -> Result<MetaData, ProtocolError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| ProtocolError::Malformed("meta data is not valid UTF-8"))?;

    let mut meta = MetaData::default();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let Some((tag, value)) = line.split_once(':') else {
            warn!("skipping meta data line without a tag separator: {:?}", line);
            continue;
        };
        // whitespace around the value is significant and preserved
        let value = value.to_string();
        match tag.trim() {
            "name" => meta.name = Some(value),
            "xmid" => meta.xmid = Some(value),
            "color" => meta.color = Some(value),
            tag => {
                meta.additional_tags.insert(tag.to_string(), value);
            }
        }
    }
    Ok(meta)
}

/// A body segment's origin in the character's null pose (T-pose).
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ScaleSegment {
    pub name: String,
    pub origin: Vector3,
}

/// A named point within a segment, with its offset from the segment origin
///  in the null pose. Z-up, right-handed.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ScalePoint {
    pub segment_id: u16,
    pub point_id: u16,
    pub name: String,
    pub flags: u32,
    pub offset: Vector3,
}

/// Type 13: one packet's worth of scale information. A character's full
///  skeleton is spread over several of these - a "segments" packet and one or
///  more "points" packets - without any sequencing beyond the sample counter,
///  so each decoded value is a delta that consumers merge into their own
///  per-character scale table.
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct ScaleInfo {
    pub segments: Vec<ScaleSegment>,
    pub points: Vec<ScalePoint>,
}

impl ScaleInfo {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.segments.len() as u32);
        for segment in &self.segments {
            buf.put_string(&segment.name);
            segment.origin.ser(buf);
        }
        buf.put_u32(self.points.len() as u32);
        for point in &self.points {
            buf.put_u16(point.segment_id);
            buf.put_u16(point.point_id);
            buf.put_string(&point.name);
            buf.put_u32(point.flags);
            point.offset.ser(buf);
        }
    }
}

pub(crate) fn decode_scale_info(payload: &[u8]) -> Result<ScaleInfo, ProtocolError> {
    let mut buf = payload;

    let segment_count = buf.try_get_u32()?;
    let mut segments = Vec::new();
    for _ in 0..segment_count {
        segments.push(ScaleSegment {
            name: buf.try_get_string()?,
            origin: Vector3::deser(&mut buf)?,
        });
    }

    let point_count = buf.try_get_u32()?;
    let mut points = Vec::new();
    for _ in 0..point_count {
        points.push(ScalePoint {
            segment_id: buf.try_get_u16()?,
            point_id: buf.try_get_u16()?,
            name: buf.try_get_string()?,
            flags: buf.try_get_u32()?,
            offset: Vector3::deser(&mut buf)?,
        });
    }

    if !buf.is_empty() {
        warn!("{} trailing bytes after scale info - ignoring", buf.len());
    }
    Ok(ScaleInfo { segments, points })
}

/// Type 25: a wall-clock time code, exactly 12 ASCII bytes `HH:MM:SS.mmm`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct TimeCode(String);

impl TimeCode {
    pub const SERIALIZED_LEN: usize = 12;

    pub fn new(text: &str) -> Result<TimeCode, ProtocolError> {
        if !Self::matches_pattern(text) {
            return Err(ProtocolError::Malformed("time code does not match HH:MM:SS.mmm"));
        }
        Ok(TimeCode(text.to_string()))
    }

    fn matches_pattern(text: &str) -> bool {
        let b = text.as_bytes();
        b.len() == Self::SERIALIZED_LEN
            && b[2] == b':'
            && b[5] == b':'
            && b[8] == b'.'
            && [0, 1, 3, 4, 6, 7, 9, 10, 11].iter().all(|&i| b[i].is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hours(&self) -> u32 {
        self.component(0..2)
    }

    pub fn minutes(&self) -> u32 {
        self.component(3..5)
    }

    pub fn seconds(&self) -> u32 {
        self.component(6..8)
    }

    pub fn milliseconds(&self) -> u32 {
        self.component(9..12)
    }

    pub fn total_milliseconds(&self) -> u64 {
        ((self.hours() as u64 * 60 + self.minutes() as u64) * 60 + self.seconds() as u64) * 1000
            + self.milliseconds() as u64
    }

    fn component(&self, range: std::ops::Range<usize>) -> u32 {
        self.0[range].parse().expect("the pattern was verified at construction")
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_slice(self.0.as_bytes());
    }
}

pub(crate) fn decode_time_code(payload: &[u8]) -> Result<TimeCode, ProtocolError> {
    if payload.len() != TimeCode::SERIALIZED_LEN {
        return Err(ProtocolError::MisalignedPayload { len: payload.len(), stride: TimeCode::SERIALIZED_LEN });
    }
    let text = std::str::from_utf8(payload)
        .map_err(|_| ProtocolError::Malformed("time code does not match HH:MM:SS.mmm"))?;
    TimeCode::new(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_meta_data_known_and_unknown_tags() {
        let payload = b"name:Subject A\nxmid:X-47\ncolor:FF8800\nsuit:lite\nnotes: keep spaces  ";
        let meta = decode_meta_data(payload).unwrap();

        assert_eq!(meta.name.as_deref(), Some("Subject A"));
        assert_eq!(meta.xmid.as_deref(), Some("X-47"));
        assert_eq!(meta.color.as_deref(), Some("FF8800"));
        assert_eq!(meta.additional_tags.get("suit").map(String::as_str), Some("lite"));
        // whitespace around the value survives
        assert_eq!(meta.additional_tags.get("notes").map(String::as_str), Some(" keep spaces  "));
        assert_eq!(meta.tag_count(), 5);
    }

    #[test]
    fn test_meta_data_duplicate_tag_last_wins() {
        let meta = decode_meta_data(b"name:first\nname:second").unwrap();
        assert_eq!(meta.name.as_deref(), Some("second"));
        assert_eq!(meta.tag_count(), 1);
    }

    #[test]
    fn test_meta_data_value_may_contain_colons() {
        let meta = decode_meta_data(b"note:a:b:c").unwrap();
        assert_eq!(meta.additional_tags.get("note").map(String::as_str), Some("a:b:c"));
    }

    #[test]
    fn test_meta_data_lines_without_separator_are_skipped() {
        let meta = decode_meta_data(b"garbage\nname:ok\n\n").unwrap();
        assert_eq!(meta.name.as_deref(), Some("ok"));
        assert_eq!(meta.tag_count(), 1);
    }

    #[test]
    fn test_meta_data_empty_payload() {
        assert_eq!(decode_meta_data(b"").unwrap(), MetaData::default());
    }

    #[test]
    fn test_meta_data_round_trip() {
        let mut meta = MetaData {
            name: Some("Subject B".to_string()),
            xmid: None,
            color: Some("00FF00".to_string()),
            additional_tags: BTreeMap::new(),
        };
        meta.additional_tags.insert("suit".to_string(), "pro".to_string());

        let mut buf = BytesMut::new();
        meta.ser(&mut buf);
        assert_eq!(decode_meta_data(&buf).unwrap(), meta);
    }

    fn sample_scale() -> ScaleInfo {
        ScaleInfo {
            segments: vec![
                ScaleSegment { name: "Pelvis".to_string(), origin: Vector3::new(0.0, 0.0, 92.0) },
                ScaleSegment { name: "L5".to_string(), origin: Vector3::new(0.0, 0.0, 104.5) },
            ],
            points: vec![
                ScalePoint {
                    segment_id: 1,
                    point_id: 13,
                    name: "Sacrum".to_string(),
                    flags: point_flags::CONTACT,
                    offset: Vector3::new(0.0, -1.5, 0.0),
                },
            ],
        }
    }

    #[test]
    fn test_scale_info_round_trip() {
        let scale = sample_scale();
        let mut buf = BytesMut::new();
        scale.ser(&mut buf);
        assert_eq!(decode_scale_info(&buf).unwrap(), scale);
    }

    #[test]
    fn test_scale_info_segments_only_packet() {
        let scale = ScaleInfo { segments: sample_scale().segments, points: vec![] };
        let mut buf = BytesMut::new();
        scale.ser(&mut buf);

        let decoded = decode_scale_info(&buf).unwrap();
        assert_eq!(decoded.segments.len(), 2);
        assert!(decoded.points.is_empty());
    }

    #[test]
    fn test_scale_info_points_only_packet() {
        let scale = ScaleInfo { segments: vec![], points: sample_scale().points };
        let mut buf = BytesMut::new();
        scale.ser(&mut buf);

        let decoded = decode_scale_info(&buf).unwrap();
        assert!(decoded.segments.is_empty());
        assert_eq!(decoded.points.len(), 1);
    }

    #[test]
    fn test_scale_info_truncated_inside_entry() {
        let mut buf = BytesMut::new();
        sample_scale().ser(&mut buf);
        let cut = buf.len() - 5;
        assert!(matches!(
            decode_scale_info(&buf[..cut]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_scale_info_declared_count_exceeding_buffer_is_truncated() {
        let mut buf = BytesMut::new();
        buf.put_u32(1000);
        assert!(matches!(
            decode_scale_info(&buf),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[rstest]
    #[case::midnight("00:00:00.000", 0)]
    #[case::afternoon("13:37:42.512", ((13 * 60 + 37) * 60 + 42) * 1000 + 512)]
    #[case::all_nines("99:59:59.999", ((99 * 60 + 59) * 60 + 59) * 1000 + 999)]
    fn test_time_code_decode(#[case] text: &str, #[case] total_ms: u64) {
        let time_code = decode_time_code(text.as_bytes()).unwrap();
        assert_eq!(time_code.as_str(), text);
        assert_eq!(time_code.total_milliseconds(), total_ms);
    }

    #[test]
    fn test_time_code_components() {
        let time_code = TimeCode::new("13:37:42.512").unwrap();
        assert_eq!(time_code.hours(), 13);
        assert_eq!(time_code.minutes(), 37);
        assert_eq!(time_code.seconds(), 42);
        assert_eq!(time_code.milliseconds(), 512);
    }

    #[rstest]
    #[case::wrong_separator("13-37-42.512")]
    #[case::letters("ab:cd:ef.ghi")]
    #[case::short_format_needs_padding("13:37:42    ")]
    fn test_time_code_bad_pattern(#[case] text: &str) {
        assert_eq!(
            decode_time_code(text.as_bytes()),
            Err(ProtocolError::Malformed("time code does not match HH:MM:SS.mmm"))
        );
    }

    #[test]
    fn test_time_code_wrong_length() {
        assert_eq!(
            decode_time_code(b"13:37:42"),
            Err(ProtocolError::MisalignedPayload { len: 8, stride: 12 })
        );
    }

    #[test]
    fn test_time_code_round_trip() {
        let time_code = TimeCode::new("01:02:03.004").unwrap();
        let mut buf = BytesMut::new();
        time_code.ser(&mut buf);
        assert_eq!(decode_time_code(&buf).unwrap(), time_code);
    }
}
