//! Record-stop-reopen: frames pushed through `RecorderService` land in a
//! `codec` archive that can be reopened independently of the service that
//! wrote it.

use codec::Reader;
use recording::{RecorderConfig, RecorderService};
use std::sync::Arc;
use store::JsonRecordingStore;
use types::PointCloud;

const FRAME_COUNT: usize = 100;
const POINTS_PER_FRAME: usize = 500;
const DT: f64 = 0.1;
const BASE_TS: f64 = 1000.0;

fn cube_of(n: usize) -> PointCloud {
    let mut pts = Vec::with_capacity(n);
    for i in 0..n {
        let f = i as f32;
        pts.push([f * 0.01, f * 0.02, f * 0.03]);
    }
    PointCloud::from_xyz(&pts)
}

#[test]
fn record_stop_reopen_round_trips_frame_count_duration_and_a_mid_frame_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn store::RecordingStore> = Arc::new(JsonRecordingStore::new(dir.path().join("store")));
    let service = RecorderService::new(
        RecorderConfig { archive_dir: dir.path().join("archives"), thumbnail_dir: dir.path().join("thumbs") },
        store,
    );

    let record = service.start("sensor-1".into(), None).unwrap();
    for i in 0..FRAME_COUNT {
        let ts = BASE_TS + i as f64 * DT;
        service.push_frame(&record.id, cube_of(POINTS_PER_FRAME), ts).unwrap();
    }

    service.stop(&record.id).unwrap();
    let finalized = service.finalize(&record.id).unwrap();
    assert_eq!(finalized.frame_count, FRAME_COUNT as u32);
    assert!((finalized.duration_seconds - 9.9).abs() < 1e-9);

    let mut reader = Reader::open(&finalized.file_path).unwrap();
    assert_eq!(reader.frame_count(), FRAME_COUNT as u32);
    assert!((reader.duration() - 9.9).abs() < 1e-9);

    let (points, ts) = reader.get_frame(50).unwrap();
    assert!((ts - 1005.0).abs() < 1e-9);
    assert_eq!(points.len(), POINTS_PER_FRAME);
}

/// A recording stopped with no frames still finalizes cleanly, with a
/// zero-length archive's worth of metadata rather than an error.
#[test]
fn empty_recording_finalizes_with_zero_frames_and_zero_duration() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn store::RecordingStore> = Arc::new(JsonRecordingStore::new(dir.path().join("store")));
    let service = RecorderService::new(
        RecorderConfig { archive_dir: dir.path().join("archives"), thumbnail_dir: dir.path().join("thumbs") },
        store,
    );

    let record = service.start("sensor-1".into(), None).unwrap();
    service.stop(&record.id).unwrap();
    let finalized = service.finalize(&record.id).unwrap();

    assert_eq!(finalized.frame_count, 0);
    assert_eq!(finalized.duration_seconds, 0.0);
    assert!(!service.is_active(&record.id));
}
