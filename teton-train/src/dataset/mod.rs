//! Dataset preparation for semantic depth training
//!
//! - Monocular pseudo-depth with an on-disk cache
//! - Per-image semantic labels, training masks and depth
//! - Panoptic segmentation of image folders

mod error;
mod pseudo_depth;
mod segmentation;
mod semantic_depth;

pub use error::DatasetError;
pub use pseudo_depth::{DepthOrigin, MonocularDepthEstimator, PseudoDepth, load_or_generate_depths};
pub use segmentation::{PanopticPrediction, PanopticPredictor, SegmentationSummary, add_segmentation};
pub use semantic_depth::{
    DepthSource, FrameMetadata, SemanticDepthConfig, SemanticDepthDataset, select_depth_source,
};
