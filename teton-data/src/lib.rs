//! Teton Data Crate
//!
//! Cameras, ray bundles, point clouds and the on-disk formats used around
//! them: depth caches, panoptic segmentations, camera files and PLY.
//! Nothing in here knows about render models or training.

pub mod bounds;
pub mod depth_cache;
pub mod error;
pub mod panoptic;
pub mod ply;
pub mod raster;
pub mod transforms;
pub mod types;

pub use bounds::{Aabb, BoundingRegion, OrientedBox};
pub use depth_cache::DepthStack;
pub use error::DataError;
pub use ply::{PlyFormat, load_point_cloud_ply, save_point_cloud_ply};
pub use raster::{DepthMap, Mask, SemanticMap};
pub use transforms::TransformsFile;
pub use types::{Camera, Intrinsics, PointCloud, RayBundle};
