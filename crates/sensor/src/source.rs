//! Frame sources a worker process can pull from. `ReplaySource` plays back
//! a recorded archive; `HardwareSource` is the extension point for a real
//! device binding — it is intentionally a stub here, since the concrete
//! driver is a vendor SDK with no Rust crate in this workspace's stack
//! (mirrors how the original service binds `sick_scan_api` via `ctypes`
//! inside its own worker process, isolated from the rest of the server).

use codec::{ArchiveError, Reader};
use std::path::PathBuf;
use thiserror::Error;
use types::PointCloud;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("recording `{0}` has no frames to replay")]
    EmptyRecording(PathBuf),
    #[error("hardware source `{0}` is not available in this build")]
    HardwareUnavailable(String),
}

/// Pulls one frame at a time, blocking the calling (worker) process.
pub trait SensorSource: Send {
    /// Returns the next frame and a recommended delay before asking again.
    fn next_frame(&mut self) -> Result<(PointCloud, f64, std::time::Duration), SourceError>;
}

/// Replays a `.lidrarch` recording on a loop, pacing itself off the
/// recording's own inter-frame timestamps so playback speed matches the
/// original capture rate instead of a fixed cadence.
pub struct ReplaySource {
    reader: Reader,
    cursor: usize,
    last_ts: Option<f64>,
}

const FALLBACK_FRAME_PERIOD: std::time::Duration = std::time::Duration::from_millis(100);

impl ReplaySource {
    pub fn open(path: &std::path::Path) -> Result<Self, SourceError> {
        let reader = Reader::open(path)?;
        if reader.frame_count() == 0 {
            return Err(SourceError::EmptyRecording(path.to_path_buf()));
        }
        Ok(Self { reader, cursor: 0, last_ts: None })
    }
}

impl SensorSource for ReplaySource {
    fn next_frame(&mut self) -> Result<(PointCloud, f64, std::time::Duration), SourceError> {
        let (points, timestamp) = self.reader.get_frame(self.cursor)?;
        let delay = match self.last_ts {
            Some(prev) if timestamp > prev => {
                std::time::Duration::try_from_secs_f64(timestamp - prev).unwrap_or(FALLBACK_FRAME_PERIOD)
            }
            _ => FALLBACK_FRAME_PERIOD,
        };
        self.last_ts = Some(timestamp);
        self.cursor = (self.cursor + 1) % self.reader.frame_count();
        if self.cursor == 0 {
            self.last_ts = None;
        }
        Ok((points, timestamp, delay))
    }
}

/// Placeholder for a real sensor device binding. Always reports the
/// device as unavailable; a concrete implementation would replace this
/// with bindings to the manufacturer's driver, same as the original
/// worker process loads its vendor shared library.
pub struct HardwareSource {
    endpoint: String,
}

impl HardwareSource {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }
}

impl SensorSource for HardwareSource {
    fn next_frame(&mut self) -> Result<(PointCloud, f64, std::time::Duration), SourceError> {
        Err(SourceError::HardwareUnavailable(self.endpoint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::Writer;

    fn archive_with_frames(dir: &tempfile::TempDir, timestamps: &[f64]) -> PathBuf {
        let path = dir.path().join("rec.lidrarch");
        let mut writer = Writer::start(&path).unwrap();
        for &ts in timestamps {
            let points = PointCloud::from_xyz(&[[1.0, 2.0, 3.0]]);
            writer.write_frame(&points, ts).unwrap();
        }
        writer.finalize(serde_json::json!({})).unwrap();
        path
    }

    #[test]
    fn replay_loops_back_to_the_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = archive_with_frames(&dir, &[0.0, 0.1, 0.2]);
        let mut source = ReplaySource::open(&path).unwrap();

        let (_, ts0, _) = source.next_frame().unwrap();
        let (_, ts1, _) = source.next_frame().unwrap();
        let (_, ts2, _) = source.next_frame().unwrap();
        let (_, ts3, _) = source.next_frame().unwrap();

        assert_eq!(ts0, 0.0);
        assert_eq!(ts1, 0.1);
        assert_eq!(ts2, 0.2);
        assert_eq!(ts3, 0.0, "cursor should wrap back to the first frame");
    }

    #[test]
    fn empty_recording_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.lidrarch");
        let writer = Writer::start(&path).unwrap();
        writer.finalize(serde_json::json!({})).unwrap();

        assert!(matches!(ReplaySource::open(&path), Err(SourceError::EmptyRecording(_))));
    }

    #[test]
    fn hardware_source_reports_unavailable() {
        let mut source = HardwareSource::new("tcp://10.0.0.5:2111".to_string());
        assert!(matches!(source.next_frame(), Err(SourceError::HardwareUnavailable(_))));
    }
}
