use mxtp_protocol::reassembly::CompletedFrame;
use mxtp_protocol::sink::FrameSink;
use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

#[derive(Serialize)]
struct SessionInfo {
    #[serde(rename = "type")]
    record_type: &'static str,
    started_unix_ms: u64,
    bind_addr: String,
    point_id_multiplier: u32,
    version: &'static str,
}

/// A composite point id split with the session's multiplier, so recorded
///  point and joint-angle frames are readable without knowing it.
#[derive(Serialize)]
struct PointIdRecord {
    raw: u32,
    segment_id: u32,
    local_point_id: u32,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    #[serde(flatten)]
    frame: &'a CompletedFrame,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    point_ids: Vec<PointIdRecord>,
}

/// Records every received frame as one JSON line, after a `session_info`
///  line identifying the recording. One file per session.
pub struct SessionWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    point_id_multiplier: u32,
    frames_written: u64,
}

impl SessionWriter {
    pub fn create(output_dir: &Path, bind_addr: SocketAddr, point_id_multiplier: u32) -> anyhow::Result<SessionWriter> {
        create_dir_all(output_dir)?;

        let started_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)?
            .as_millis() as u64;
        let path = output_dir.join(format!("mxtp_session_{}.jsonl", started_unix_ms));

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &SessionInfo {
            record_type: "session_info",
            started_unix_ms,
            bind_addr: bind_addr.to_string(),
            point_id_multiplier,
            version: env!("CARGO_PKG_VERSION"),
        })?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        info!("recording session to {:?}", path);
        Ok(SessionWriter {
            path,
            writer,
            point_id_multiplier,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for SessionWriter {
    fn on_frame(&mut self, frame: &CompletedFrame) {
        let point_ids = frame.payload.point_ids().iter()
            .map(|point| PointIdRecord {
                raw: point.0,
                segment_id: point.segment_id(self.point_id_multiplier),
                local_point_id: point.local_point_id(self.point_id_multiplier),
            })
            .collect();

        // a sink has no return channel; a failing disk must not stall the stream
        let result = serde_json::to_writer(&mut self.writer, &FrameRecord { record_type: "frame", frame, point_ids })
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        match result {
            Ok(()) => self.frames_written += 1,
            Err(e) => error!("failed to append to session file {:?}: {}", self.path, e),
        }
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("failed to flush session file {:?}: {}", self.path, e);
        }
        info!("closed session file {:?} with {} frames", self.path, self.frames_written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxtp_protocol::header::MessageType;
    use mxtp_protocol::payload::{Payload, PointPosition, TimeCode, Vector3};
    use mxtp_protocol::segment::{PointId, SegmentLayout};
    use serde_json::Value;
    use std::fs::read_to_string;

    fn test_output_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mxtp-session-test-{}-{}", name, std::process::id()))
    }

    fn full_body_layout() -> SegmentLayout {
        SegmentLayout { body_count: 23, prop_count: 0, finger_count: 0 }
    }

    fn time_code_frame(sample: u32) -> CompletedFrame {
        CompletedFrame {
            character_id: 0,
            sample_counter: sample,
            time_code_ms: 40 * sample,
            message_type: MessageType::TimeCode,
            layout: full_body_layout(),
            payload: Payload::TimeCode(TimeCode::new("01:02:03.004").unwrap()),
        }
    }

    fn points_frame() -> CompletedFrame {
        CompletedFrame {
            character_id: 0,
            sample_counter: 9,
            time_code_ms: 360,
            message_type: MessageType::PosePositions,
            layout: full_body_layout(),
            payload: Payload::PosePositions(vec![PointPosition {
                point_id: PointId(269),
                position: Vector3::new(0.0, -1.5, 92.0),
            }]),
        }
    }

    #[test]
    fn test_session_file_layout() {
        let dir = test_output_dir("layout");
        let mut writer = SessionWriter::create(&dir, "127.0.0.1:9763".parse().unwrap(), 256).unwrap();

        writer.on_frame(&time_code_frame(1));
        writer.on_frame(&time_code_frame(2));
        assert_eq!(writer.frames_written(), 2);

        let path = writer.path().to_path_buf();
        drop(writer); // flushes

        let content = read_to_string(&path).unwrap();
        let lines: Vec<Value> = content.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "session_info");
        assert_eq!(lines[0]["bind_addr"], "127.0.0.1:9763");
        assert_eq!(lines[0]["point_id_multiplier"], 256);
        assert_eq!(lines[1]["type"], "frame");
        assert_eq!(lines[1]["sample_counter"], 1);
        assert_eq!(lines[2]["sample_counter"], 2);
        assert_eq!(lines[2]["time_code_ms"], 80);
        // a time code references no points
        assert!(lines[1].get("point_ids").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_point_ids_are_split_with_the_configured_multiplier() {
        let dir = test_output_dir("split-256");
        let mut writer = SessionWriter::create(&dir, "127.0.0.1:9763".parse().unwrap(), 256).unwrap();
        writer.on_frame(&points_frame());
        let path = writer.path().to_path_buf();
        drop(writer);

        let content = read_to_string(&path).unwrap();
        let frame: Value = serde_json::from_str(content.lines().nth(1).unwrap()).unwrap();
        assert_eq!(frame["point_ids"][0]["raw"], 269);
        assert_eq!(frame["point_ids"][0]["segment_id"], 1);
        assert_eq!(frame["point_ids"][0]["local_point_id"], 13);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_point_id_split_follows_the_multiplier() {
        // the same wire id reads differently under the documentation-text multiplier
        let dir = test_output_dir("split-100");
        let mut writer = SessionWriter::create(&dir, "127.0.0.1:9763".parse().unwrap(), 100).unwrap();
        writer.on_frame(&points_frame());
        let path = writer.path().to_path_buf();
        drop(writer);

        let content = read_to_string(&path).unwrap();
        let frame: Value = serde_json::from_str(content.lines().nth(1).unwrap()).unwrap();
        assert_eq!(frame["point_ids"][0]["raw"], 269);
        assert_eq!(frame["point_ids"][0]["segment_id"], 2);
        assert_eq!(frame["point_ids"][0]["local_point_id"], 69);

        std::fs::remove_dir_all(&dir).ok();
    }
}
