//! Errors of the point extraction pipeline

use crate::ingest::{ChannelKind, SourceError};
use teton_data::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointCloudError {
    #[error("Could not find '{name}' in the model outputs, use one of: {available:?}")]
    MissingChannel { name: String, available: Vec<String> },

    #[error("Channel '{name}' is {actual:?}, expected {expected:?}")]
    ChannelKindMismatch {
        name: String,
        expected: ChannelKind,
        actual: ChannelKind,
    },

    #[error("Cannot estimate normals and use normal_output_name '{0}' at the same time")]
    ConflictingNormalSources(String),

    #[error("reorient_normals needs estimate_normals or normal_output_name")]
    ReorientWithoutNormals,

    #[error("Rendered normals in '{channel}' must lie in [0, 1], found {value}")]
    NormalOutOfRange { channel: String, value: f64 },

    #[error("Channel '{name}' has {actual} values for {expected} rays")]
    OutputLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Intrinsic matrix is singular (determinant {determinant})")]
    SingularIntrinsics { determinant: f64 },

    #[error("{what} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}
