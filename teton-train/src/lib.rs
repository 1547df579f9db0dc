//! Teton Training Crate
//!
//! Semantic and depth supervision support for NeRF training, and point
//! cloud extraction from trained models and posed depth datasets.
//!
//! ## Modules
//!
//! - [`ingest`]: Ray batch sources and render models (external collaborators)
//! - [`pointcloud`]: Streaming accumulation, unprojection, outliers and normals
//! - [`dataset`]: Pseudo-depth caching, semantic masks, panoptic segmentation
//! - [`supervision`]: Depth loss configuration, sigma schedule and metrics

pub mod dataset;
pub mod ingest;
pub mod pointcloud;
pub mod supervision;

pub use pointcloud::{GeneratedPointCloud, PointCloudConfig, PointCloudError, generate_point_cloud};
