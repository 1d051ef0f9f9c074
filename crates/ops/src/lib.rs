//! Point-cloud operator nodes (§4.5, component C5): each implements
//! [`types::PointCloudNode`] and holds only the state its own algorithm
//! needs. Building one from a persisted [`types::NodeRecord`] is the
//! graph engine's job; this crate exposes the per-operator configs and
//! constructors it dispatches on.

mod attribute_filter;
mod boundary;
mod crop;
mod dbscan;
mod error;
mod fusion;
mod kdtree;
mod plane_segmentation;
mod radius_outlier;
mod sensor_pose;
mod statistical_outlier;
mod uniform;
mod voxel;

pub use attribute_filter::{AttributeFilter, AttributeFilterConfig, CompareOp};
pub use boundary::{BoundaryDetection, BoundaryDetectionConfig};
pub use crop::{Crop, CropConfig};
pub use dbscan::{DbscanClustering, DbscanClusteringConfig};
pub use error::ConfigError;
pub use fusion::Fusion;
pub use plane_segmentation::{PlaneSegmentation, PlaneSegmentationConfig};
pub use radius_outlier::{RadiusOutlierRemoval, RadiusOutlierRemovalConfig};
pub use sensor_pose::SensorPose;
pub use statistical_outlier::{StatisticalOutlierRemoval, StatisticalOutlierRemovalConfig};
pub use uniform::{UniformDownsample, UniformDownsampleConfig};
pub use voxel::{VoxelDownsample, VoxelDownsampleConfig};
