//! Radius outlier removal (§4.5): keep points with at least `m` neighbours
//! within radius `rho`.

use crate::kdtree::PointIndex;
use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct RadiusOutlierRemovalConfig {
    pub radius: f32,
    pub min_neighbors: usize,
}

pub struct RadiusOutlierRemoval {
    config: RadiusOutlierRemovalConfig,
}

impl RadiusOutlierRemoval {
    pub fn new(config: RadiusOutlierRemovalConfig) -> Self {
        Self { config }
    }
}

impl PointCloudNode for RadiusOutlierRemoval {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let index = PointIndex::build(&payload.points);
        let radius = self.config.radius as f64;
        let min_neighbors = self.config.min_neighbors;

        let kept = payload.points.filter_rows(|i, _| {
            index.within_radius(&payload.points, i, radius).len() >= min_neighbors
        });
        Some(FramePayload { points: kept, ..payload })
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::healthy()
    }
}
