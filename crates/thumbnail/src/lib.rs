//! 2D projection thumbnail generator (§4.11): projects a point cloud onto
//! one of four views and rasterizes it as small filled circles onto a fixed
//! size PNG, matching the original `generate_thumbnail`/
//! `generate_thumbnail_from_file` pair.

use codec::{ArchiveError, Reader};
use image::{Rgb, RgbImage};
use std::path::Path;
use thiserror::Error;
use types::PointCloud;

pub const DEFAULT_WIDTH: u32 = 300;
pub const DEFAULT_HEIGHT: u32 = 300;
const BACKGROUND: Rgb<u8> = Rgb([0x2A, 0x2A, 0x2B]);
const POINT_COLOR: Rgb<u8> = Rgb([0x3B, 0x82, 0xF6]);
const POINT_RADIUS: i32 = 2;
const PADDING_FRACTION: f64 = 0.1;
/// Frame retries attempted by `from_archive` beyond the initial 10%-in pick.
const FROM_FILE_RETRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Top,
    Front,
    Side,
    Isometric,
}

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("point cloud is empty")]
    Empty,
    #[error("point cloud has no non-degenerate extent to project")]
    Degenerate,
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("recording has no frames")]
    NoFrames,
}

/// Projects `points` onto `view` and rasterizes a `width x height` PNG at
/// `output_path`. Rows that are exactly `(0, 0, 0)` (sensor invalid-return
/// convention) are dropped before projection.
pub fn generate(
    points: &PointCloud,
    output_path: impl AsRef<Path>,
    width: u32,
    height: u32,
    view: View,
) -> Result<(), ThumbnailError> {
    let image = render(points, width, height, view)?;
    if let Some(parent) = output_path.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| ThumbnailError::Image(image::ImageError::IoError(e)))?;
    }
    image.save(output_path.as_ref())?;
    Ok(())
}

fn render(points: &PointCloud, width: u32, height: u32, view: View) -> Result<RgbImage, ThumbnailError> {
    if points.is_empty() {
        return Err(ThumbnailError::Empty);
    }

    let valid: Vec<[f32; 3]> = (0..points.len())
        .map(|i| points.xyz(i))
        .filter(|[x, y, z]| !(*x == 0.0 && *y == 0.0 && *z == 0.0))
        .collect();
    if valid.is_empty() {
        return Err(ThumbnailError::Empty);
    }

    let projected: Vec<(f64, f64)> = match view {
        View::Top => valid.iter().map(|p| (p[0] as f64, p[1] as f64)).collect(),
        View::Front => valid.iter().map(|p| (p[0] as f64, p[2] as f64)).collect(),
        View::Side => valid.iter().map(|p| (p[1] as f64, p[2] as f64)).collect(),
        View::Isometric => valid
            .iter()
            .map(|p| {
                let angle = std::f64::consts::FRAC_PI_4;
                let (cos_a, sin_a) = (angle.cos(), angle.sin());
                let (x, y) = (p[0] as f64, p[1] as f64);
                (cos_a * x - sin_a * y, sin_a * x + cos_a * y)
            })
            .collect(),
    };

    let (x_min, x_max) = min_max(projected.iter().map(|(x, _)| *x));
    let (y_min, y_max) = min_max(projected.iter().map(|(_, y)| *y));
    let x_range = x_max - x_min;
    let y_range = y_max - y_min;
    if x_range == 0.0 || y_range == 0.0 {
        return Err(ThumbnailError::Degenerate);
    }

    let x_min = x_min - x_range * PADDING_FRACTION;
    let x_max = x_max + x_range * PADDING_FRACTION;
    let y_min = y_min - y_range * PADDING_FRACTION;
    let y_max = y_max + y_range * PADDING_FRACTION;

    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    for (x, y) in projected {
        let px = ((x - x_min) / (x_max - x_min) * (width - 1) as f64) as i32;
        let py_unflipped = ((y - y_min) / (y_max - y_min) * (height - 1) as f64) as i32;
        let py = (height as i32 - 1) - py_unflipped;
        draw_point(&mut image, px, py);
    }

    Ok(image)
}

fn draw_point(image: &mut RgbImage, cx: i32, cy: i32) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    for dy in -POINT_RADIUS..=POINT_RADIUS {
        for dx in -POINT_RADIUS..=POINT_RADIUS {
            if dx * dx + dy * dy > POINT_RADIUS * POINT_RADIUS {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && x < width && y >= 0 && y < height {
                image.put_pixel(x as u32, y as u32, POINT_COLOR);
            }
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| (min.min(v), max.max(v)))
}

/// Generates a thumbnail from a finalized archive, starting at the frame
/// 10% into the recording (skipping startup artifacts) and retrying further
/// frames if that one is degenerate, up to `FROM_FILE_RETRIES` additional
/// attempts. Returns `Ok(())` only if some frame produced a usable image.
pub fn generate_from_archive(
    archive_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    width: u32,
    height: u32,
    view: View,
) -> Result<(), ThumbnailError> {
    let mut reader = Reader::open(archive_path.as_ref())?;
    let frame_count = reader.frame_count() as usize;
    if frame_count == 0 {
        return Err(ThumbnailError::NoFrames);
    }

    let start = ((frame_count as f64) * 0.1) as usize;
    let candidates = candidate_frame_indices(start, frame_count, FROM_FILE_RETRIES);

    let mut last_err = ThumbnailError::NoFrames;
    for index in candidates {
        let (points, _timestamp) = reader.get_frame(index)?;
        match render(&points, width, height, view) {
            Ok(image) => {
                if let Some(parent) = output_path.as_ref().parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| ThumbnailError::Image(image::ImageError::IoError(e)))?;
                }
                image.save(output_path.as_ref())?;
                return Ok(());
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// `start`, then `retries` further frames spaced evenly across the
/// remainder of the recording, deduplicated and clamped to range.
fn candidate_frame_indices(start: usize, frame_count: usize, retries: usize) -> Vec<usize> {
    let start = start.min(frame_count - 1);
    let mut out = vec![start];
    let remaining = frame_count - 1 - start;
    if remaining > 0 {
        for i in 1..=retries {
            let offset = remaining * i / (retries + 1).max(1);
            let idx = (start + offset.max(1)).min(frame_count - 1);
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> PointCloud {
        let mut pts = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    pts.push([x as f32, y as f32, z as f32]);
                }
            }
        }
        PointCloud::from_xyz(&pts)
    }

    #[test]
    fn generate_writes_a_png_for_each_view() {
        let dir = tempfile::tempdir().unwrap();
        for view in [View::Top, View::Front, View::Side, View::Isometric] {
            let path = dir.path().join(format!("{view:?}.png"));
            generate(&cube(), &path, 64, 64, view).unwrap();
            assert!(path.exists());
        }
    }

    #[test]
    fn empty_cloud_errors() {
        let empty = PointCloud::empty(3);
        let dir = tempfile::tempdir().unwrap();
        let err = generate(&empty, dir.path().join("out.png"), 64, 64, View::Top).unwrap_err();
        assert!(matches!(err, ThumbnailError::Empty));
    }

    #[test]
    fn all_zero_rows_are_dropped_and_remaining_extent_used() {
        let mut data = vec![0.0f32; 3 * 3];
        data.extend_from_slice(&[1.0, 0.0, 0.0, 2.0, 1.0, 0.0]);
        let points = PointCloud::from_flat(data, 3);
        let dir = tempfile::tempdir().unwrap();
        generate(&points, dir.path().join("out.png"), 64, 64, View::Top).unwrap();
    }

    #[test]
    fn degenerate_single_point_errors() {
        let points = PointCloud::from_xyz(&[[1.0, 1.0, 1.0]]);
        let dir = tempfile::tempdir().unwrap();
        let err = generate(&points, dir.path().join("out.png"), 64, 64, View::Top).unwrap_err();
        assert!(matches!(err, ThumbnailError::Degenerate));
    }

    #[test]
    fn candidate_frame_indices_start_at_ten_percent_and_spread_out() {
        let indices = candidate_frame_indices(10, 100, 10);
        assert_eq!(indices[0], 10);
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        assert!(indices.iter().all(|&i| i < 100));
    }

    #[test]
    fn generate_from_archive_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("rec.lidrarch");
        let mut writer = codec::Writer::start(&archive_path).unwrap();
        for i in 0..20 {
            writer.write_frame(&cube(), i as f64).unwrap();
        }
        writer.finalize(&serde_json::json!({})).unwrap();

        let out = dir.path().join("rec.png");
        generate_from_archive(&archive_path, &out, 64, 64, View::Top).unwrap();
        assert!(out.exists());
    }
}
