use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),
    #[error("operator `{op}` is not meaningful on non-numeric value `{value}`")]
    NonNumericOrdering { op: String, value: String },
    #[error("stride `k` must be >= 1")]
    InvalidStride,
    #[error("voxel size must be finite")]
    InvalidVoxelSize,
}
