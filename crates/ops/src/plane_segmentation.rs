//! RANSAC plane segmentation (§4.5): fit the dominant plane and keep only
//! its inliers.

use rand::seq::index::sample;
use rand::thread_rng;
use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct PlaneSegmentationConfig {
    pub iterations: usize,
    pub distance_threshold: f32,
}

pub struct PlaneSegmentation {
    config: PlaneSegmentationConfig,
    last_plane: Option<[f32; 4]>,
}

impl PlaneSegmentation {
    pub fn new(config: PlaneSegmentationConfig) -> Self {
        Self { config, last_plane: None }
    }
}

/// Fit a plane `(a, b, c, d)` through three points via their normal's cross
/// product, normalized so `a^2 + b^2 + c^2 = 1`.
fn fit_plane(p0: [f32; 3], p1: [f32; 3], p2: [f32; 3]) -> Option<[f32; 4]> {
    let u = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
    let v = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let norm = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if norm < 1e-9 {
        return None;
    }
    let (a, b, c) = (n[0] / norm, n[1] / norm, n[2] / norm);
    let d = -(a * p0[0] + b * p0[1] + c * p0[2]);
    Some([a, b, c, d])
}

fn point_distance(plane: [f32; 4], p: [f32; 3]) -> f32 {
    (plane[0] * p[0] + plane[1] * p[1] + plane[2] * p[2] + plane[3]).abs()
}

impl PointCloudNode for PlaneSegmentation {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let n = payload.points.len();
        if n < 3 {
            self.last_plane = None;
            return Some(FramePayload { points: payload.points.filter_rows(|_, _| false), ..payload });
        }

        let mut rng = thread_rng();
        let mut best_plane = None;
        let mut best_inlier_count = 0usize;

        for _ in 0..self.config.iterations {
            let sample_idx = sample(&mut rng, n, 3);
            let (i0, i1, i2) = (sample_idx.index(0), sample_idx.index(1), sample_idx.index(2));
            let Some(plane) = fit_plane(payload.points.xyz(i0), payload.points.xyz(i1), payload.points.xyz(i2)) else {
                continue;
            };

            let inlier_count = (0..n)
                .filter(|&i| point_distance(plane, payload.points.xyz(i)) <= self.config.distance_threshold)
                .count();

            if inlier_count > best_inlier_count {
                best_inlier_count = inlier_count;
                best_plane = Some(plane);
            }
        }

        self.last_plane = best_plane;

        let Some(plane) = best_plane else {
            return Some(FramePayload { points: payload.points.filter_rows(|_, _| false), ..payload });
        };

        let threshold = self.config.distance_threshold;
        let kept = payload.points.filter_rows(|i, _| point_distance(plane, payload.points.xyz(i)) <= threshold);

        let mut out = FramePayload { points: kept, ..payload };
        out.extra = Some(serde_json::json!({
            "plane": { "a": plane[0], "b": plane[1], "c": plane[2], "d": plane[3] },
            "inliers": best_inlier_count,
        }));
        Some(out)
    }

    fn status(&self) -> NodeStatus {
        let mut s = NodeStatus::healthy();
        s.counters = serde_json::json!({ "has_plane": self.last_plane.is_some() });
        s
    }
}
