//! Error types for data loading and validation.

use thiserror::Error;

/// Errors raised while building data types or reading/writing files.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PLY parsing error: {0}")]
    Ply(String),

    #[error("NPY error: {0}")]
    Npy(String),

    #[error("Bounding box min {min:?} must be smaller than max {max:?} on every axis")]
    InvalidBoundingBox { min: [f64; 3], max: [f64; 3] },

    #[error("Length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
