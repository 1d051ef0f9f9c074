//! Density-based clustering (§4.5): cluster with neighbourhood radius
//! `epsilon` and minimum cluster size `min_points`; drop unclustered (noise)
//! points.

use crate::kdtree::PointIndex;
use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct DbscanClusteringConfig {
    pub epsilon: f32,
    pub min_points: usize,
}

pub struct DbscanClustering {
    config: DbscanClusteringConfig,
    last_cluster_count: usize,
}

impl DbscanClustering {
    pub fn new(config: DbscanClusteringConfig) -> Self {
        Self { config, last_cluster_count: 0 }
    }
}

const NOISE: i64 = -1;
const UNVISITED: i64 = -2;

fn dbscan_labels(n: usize, epsilon: f64, min_points: usize, index: &PointIndex, points: &types::PointCloud) -> (Vec<i64>, usize) {
    let mut labels = vec![UNVISITED; n];
    let mut cluster_id = 0i64;

    for i in 0..n {
        if labels[i] != UNVISITED {
            continue;
        }
        let neighbours: Vec<usize> = index.within_radius(points, i, epsilon).into_iter().map(|(j, _)| j).collect();
        if neighbours.len() + 1 < min_points {
            labels[i] = NOISE;
            continue;
        }

        labels[i] = cluster_id;
        let mut queue = neighbours;
        let mut qi = 0;
        while qi < queue.len() {
            let j = queue[qi];
            qi += 1;
            if labels[j] == NOISE {
                labels[j] = cluster_id;
            }
            if labels[j] != UNVISITED {
                continue;
            }
            labels[j] = cluster_id;
            let j_neighbours: Vec<usize> = index.within_radius(points, j, epsilon).into_iter().map(|(k, _)| k).collect();
            if j_neighbours.len() + 1 >= min_points {
                for n in j_neighbours {
                    if labels[n] == UNVISITED || labels[n] == NOISE {
                        queue.push(n);
                    }
                }
            }
        }
        cluster_id += 1;
    }

    (labels, cluster_id as usize)
}

impl PointCloudNode for DbscanClustering {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let n = payload.points.len();
        if n == 0 {
            return Some(payload);
        }

        let index = PointIndex::build(&payload.points);
        let (labels, cluster_count) = dbscan_labels(
            n,
            self.config.epsilon as f64,
            self.config.min_points,
            &index,
            &payload.points,
        );
        self.last_cluster_count = cluster_count;

        let kept = payload.points.filter_rows(|i, _| labels[i] != NOISE);
        let mut out = FramePayload { points: kept, ..payload };
        out.extra = Some(serde_json::json!({ "cluster_count": cluster_count }));
        Some(out)
    }

    fn status(&self) -> NodeStatus {
        let mut s = NodeStatus::healthy();
        s.counters = serde_json::json!({ "last_cluster_count": self.last_cluster_count });
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{NodeId, PointCloud};

    #[test]
    fn separates_two_dense_clusters_and_drops_noise() {
        let mut dbscan = DbscanClustering::new(DbscanClusteringConfig { epsilon: 0.5, min_points: 3 });
        let mut pts = vec![];
        for i in 0..5 {
            pts.push([i as f32 * 0.1, 0.0, 0.0]);
        }
        for i in 0..5 {
            pts.push([100.0 + i as f32 * 0.1, 0.0, 0.0]);
        }
        pts.push([500.0, 500.0, 500.0]); // noise
        let points = PointCloud::from_xyz(&pts);
        let out = dbscan.on_input(FramePayload::new(NodeId::from("s"), points, 0.0)).unwrap();
        assert_eq!(out.points.len(), 10);
        assert_eq!(out.extra.unwrap()["cluster_count"], 2);
    }
}
