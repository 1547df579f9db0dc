//! Ray batch sources for point extraction and supervision

use teton_data::{DataError, DepthMap, Mask, RayBundle, SemanticMap};

/// Ground truth that travels with a ray batch.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    /// Per-image depth, if the dataset carries it
    pub depth_image: Option<DepthMap>,
    /// Pixels that take part in training
    pub mask: Option<Mask>,
    /// Per-pixel semantic class ids
    pub semantics: Option<SemanticMap>,
}

/// One batch of rays plus its ground truth
#[derive(Debug, Clone)]
pub struct Batch {
    pub rays: RayBundle,
    pub ground_truth: GroundTruth,
}

impl Batch {
    pub fn new(rays: RayBundle) -> Self {
        Self {
            rays,
            ground_truth: GroundTruth::default(),
        }
    }

    pub fn with_ground_truth(rays: RayBundle, ground_truth: GroundTruth) -> Self {
        Self { rays, ground_truth }
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }
}

/// Trait for training-time ray batch sources
pub trait BatchSource {
    /// Get the batch for training step `step`.
    /// Returns None once the source is exhausted
    fn next_batch(&mut self, step: usize) -> Result<Option<Batch>, SourceError>;
}

/// Errors raised by batch sources and render models
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Render failed: {0}")]
    Render(String),
    #[error("Invalid batch data: {0}")]
    InvalidData(String),
}
