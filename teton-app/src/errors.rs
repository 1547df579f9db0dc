//! Error types for the command-line tools.

use teton_data::DataError;
use teton_train::PointCloudError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Point cloud error: {0}")]
    PointCloud(#[from] PointCloudError),

    #[error("Progress bar template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),

    #[error("No depth for frame {frame}: {reason}")]
    MissingDepth { frame: usize, reason: String },
}
