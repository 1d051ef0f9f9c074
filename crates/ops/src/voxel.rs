//! Voxel-grid downsampling (§4.5): one centroid per non-empty voxel.

use crate::error::ConfigError;
use std::collections::BTreeMap;
use types::{FramePayload, NodeStatus, PointCloud, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct VoxelDownsampleConfig {
    pub voxel_size: f32,
}

pub struct VoxelDownsample {
    config: VoxelDownsampleConfig,
}

impl VoxelDownsample {
    pub fn new(config: VoxelDownsampleConfig) -> Result<Self, ConfigError> {
        if !config.voxel_size.is_finite() {
            return Err(ConfigError::InvalidVoxelSize);
        }
        Ok(Self { config })
    }
}

fn voxel_key(p: [f32; 3], v: f32) -> (i64, i64, i64) {
    (
        (p[0] / v).floor() as i64,
        (p[1] / v).floor() as i64,
        (p[2] / v).floor() as i64,
    )
}

impl PointCloudNode for VoxelDownsample {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let v = self.config.voxel_size;
        if v <= 0.0 {
            return Some(payload);
        }

        let width = payload.points.width();
        let mut buckets: BTreeMap<(i64, i64, i64), (Vec<f32>, u32)> = BTreeMap::new();
        for row in payload.points.rows() {
            let key = voxel_key([row[0], row[1], row[2]], v);
            let entry = buckets.entry(key).or_insert_with(|| (vec![0.0; width], 0));
            for (i, value) in row.iter().enumerate() {
                entry.0[i] += value;
            }
            entry.1 += 1;
        }

        let mut data = Vec::with_capacity(buckets.len() * width);
        for (sum, count) in buckets.into_values() {
            for value in sum {
                data.push(value / count as f32);
            }
        }

        Some(FramePayload { points: PointCloud::from_flat(data, width.max(3)), ..payload })
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::NodeId;

    fn frame(points: PointCloud) -> FramePayload {
        FramePayload::new(NodeId::from("src"), points, 0.0)
    }

    #[test]
    fn merges_points_in_same_voxel() {
        let mut vx = VoxelDownsample::new(VoxelDownsampleConfig { voxel_size: 1.0 }).unwrap();
        let points = PointCloud::from_xyz(&[[0.1, 0.1, 0.1], [0.2, 0.2, 0.2], [5.0, 5.0, 5.0]]);
        let out = vx.on_input(frame(points)).unwrap();
        assert_eq!(out.points.len(), 2);
    }

    #[test]
    fn non_positive_voxel_size_passes_through() {
        let mut vx = VoxelDownsample::new(VoxelDownsampleConfig { voxel_size: 0.0 }).unwrap();
        let points = PointCloud::from_xyz(&[[0.1, 0.1, 0.1], [5.0, 5.0, 5.0]]);
        let out = vx.on_input(frame(points)).unwrap();
        assert_eq!(out.points.len(), 2);
    }
}
