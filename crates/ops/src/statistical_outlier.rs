//! Statistical outlier removal (§4.5): drop points whose mean distance to
//! their k nearest neighbours is more than `std_ratio` standard deviations
//! above the cloud-wide mean.

use crate::kdtree::PointIndex;
use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct StatisticalOutlierRemovalConfig {
    pub k: usize,
    pub std_ratio: f32,
}

pub struct StatisticalOutlierRemoval {
    config: StatisticalOutlierRemovalConfig,
}

impl StatisticalOutlierRemoval {
    pub fn new(config: StatisticalOutlierRemovalConfig) -> Self {
        Self { config }
    }
}

impl PointCloudNode for StatisticalOutlierRemoval {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let n = payload.points.len();
        let k = self.config.k;
        if n <= k {
            return Some(payload);
        }

        let index = PointIndex::build(&payload.points);
        let mean_distances: Vec<f64> = (0..n)
            .map(|i| {
                let neighbours = index.k_nearest(&payload.points, i, k);
                if neighbours.is_empty() {
                    0.0
                } else {
                    neighbours.iter().map(|(_, d)| d).sum::<f64>() / neighbours.len() as f64
                }
            })
            .collect();

        let mean = mean_distances.iter().sum::<f64>() / n as f64;
        let variance = mean_distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        let std_dev = variance.sqrt();
        let threshold = mean + self.config.std_ratio as f64 * std_dev;

        let kept = payload.points.filter_rows(|i, _| mean_distances[i] <= threshold);
        Some(FramePayload { points: kept, ..payload })
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{NodeId, PointCloud};

    #[test]
    fn drops_far_outlier() {
        let mut sor = StatisticalOutlierRemoval::new(StatisticalOutlierRemovalConfig { k: 3, std_ratio: 1.0 });
        let mut pts = vec![];
        for i in 0..10 {
            pts.push([i as f32 * 0.1, 0.0, 0.0]);
        }
        pts.push([1000.0, 1000.0, 1000.0]);
        let points = PointCloud::from_xyz(&pts);
        let out = sor.on_input(FramePayload::new(NodeId::from("s"), points, 0.0)).unwrap();
        assert!(out.points.len() < 11);
        assert!(out.points.rows().all(|r| r[0] < 1000.0));
    }

    #[test]
    fn passes_through_when_n_not_greater_than_k() {
        let mut sor = StatisticalOutlierRemoval::new(StatisticalOutlierRemovalConfig { k: 5, std_ratio: 1.0 });
        let points = PointCloud::from_xyz(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let out = sor.on_input(FramePayload::new(NodeId::from("s"), points, 0.0)).unwrap();
        assert_eq!(out.points.len(), 2);
    }
}
