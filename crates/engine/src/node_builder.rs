//! Type-dispatched node builder (§9 "Dynamic dispatch of operator types"):
//! the source's registry-of-builder-callables becomes a single match over
//! the closed `NodeType` enum, each arm a pure constructor.

use crate::error::EngineError;
use calibration::CalibrationNode;
use ops::{
    AttributeFilter, BoundaryDetection, Crop, DbscanClustering, Fusion, PlaneSegmentation, RadiusOutlierRemoval,
    StatisticalOutlierRemoval, UniformDownsample, VoxelDownsample,
};
use types::{EdgeRecord, NodeRecord, NodeType, PointCloudNode};

fn parse_config<T: serde::de::DeserializeOwned>(record: &NodeRecord) -> Result<T, EngineError> {
    serde_json::from_value(record.config.clone()).map_err(|error| EngineError::Config(record.id.clone(), error))
}

/// Builds the operator instance for `record`. `edges` is the full edge set
/// of the loaded graph — only `Fusion` nodes need it, to derive their
/// source set from inbound edges at build time.
pub fn build_node(record: &NodeRecord, edges: &[EdgeRecord]) -> Result<Box<dyn PointCloudNode>, EngineError> {
    let node: Box<dyn PointCloudNode> = match record.node_type {
        NodeType::Sensor => {
            let pose = store::node_pose(record);
            Box::new(ops::SensorPose::new(pose))
        }
        NodeType::Crop => Box::new(Crop::new(parse_config(record)?)),
        NodeType::VoxelDownsample => {
            Box::new(VoxelDownsample::new(parse_config(record)?).map_err(|e| EngineError::Operator(record.id.clone(), e))?)
        }
        NodeType::UniformDownsample => {
            Box::new(UniformDownsample::new(parse_config(record)?).map_err(|e| EngineError::Operator(record.id.clone(), e))?)
        }
        NodeType::StatisticalOutlierRemoval => Box::new(StatisticalOutlierRemoval::new(parse_config(record)?)),
        NodeType::RadiusOutlierRemoval => Box::new(RadiusOutlierRemoval::new(parse_config(record)?)),
        NodeType::PlaneSegmentation => Box::new(PlaneSegmentation::new(parse_config(record)?)),
        NodeType::DbscanClustering => Box::new(DbscanClustering::new(parse_config(record)?)),
        NodeType::AttributeFilter => {
            Box::new(AttributeFilter::new(parse_config(record)?).map_err(|e| EngineError::Operator(record.id.clone(), e))?)
        }
        NodeType::BoundaryDetection => Box::new(BoundaryDetection::new(parse_config(record)?)),
        NodeType::Fusion => {
            let sources = edges
                .iter()
                .filter(|edge| edge.target_node_id == record.id)
                .map(|edge| edge.source_node_id.clone())
                .collect();
            Box::new(Fusion::new(sources))
        }
        NodeType::Calibration => Box::new(CalibrationNode::new()),
    };
    Ok(node)
}
