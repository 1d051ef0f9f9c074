//! Axis-aligned box crop (§4.5).

use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct CropConfig {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

pub struct Crop {
    config: CropConfig,
    frames_seen: u64,
}

impl Crop {
    pub fn new(config: CropConfig) -> Self {
        Self { config, frames_seen: 0 }
    }
}

impl PointCloudNode for Crop {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        self.frames_seen += 1;
        let min = self.config.min;
        let max = self.config.max;
        let kept = payload.points.filter_rows(|_, row| {
            (0..3).all(|axis| row[axis] >= min[axis] && row[axis] <= max[axis])
        });
        Some(FramePayload { points: kept, ..payload })
    }

    fn status(&self) -> NodeStatus {
        let mut s = NodeStatus::healthy();
        s.counters = serde_json::json!({ "frames_seen": self.frames_seen });
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{NodeId, PointCloud};

    fn frame(points: PointCloud) -> FramePayload {
        FramePayload::new(NodeId::from("src"), points, 0.0)
    }

    #[test]
    fn keeps_points_inside_box() {
        let mut crop = Crop::new(CropConfig { min: [0.0, 0.0, 0.0], max: [1.0, 1.0, 1.0] });
        let points = PointCloud::from_xyz(&[[0.5, 0.5, 0.5], [2.0, 2.0, 2.0]]);
        let out = crop.on_input(frame(points)).unwrap();
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points.xyz(0), [0.5, 0.5, 0.5]);
    }

    #[test]
    fn degenerate_box_produces_empty_output() {
        let mut crop = Crop::new(CropConfig { min: [1.0, 0.0, 0.0], max: [0.0, 1.0, 1.0] });
        let points = PointCloud::from_xyz(&[[0.5, 0.5, 0.5]]);
        let out = crop.on_input(frame(points)).unwrap();
        assert!(out.points.is_empty());
    }
}
