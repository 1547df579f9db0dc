//! Dataset preparation errors

use teton_data::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Depth estimation failed: {0}")]
    DepthEstimation(String),

    #[error("Panoptic prediction failed: {0}")]
    Prediction(String),

    #[error("Image index {index} out of range ({count} images)")]
    ImageIndex { index: usize, count: usize },

    #[error("Invalid dataset: {0}")]
    InvalidData(String),
}
