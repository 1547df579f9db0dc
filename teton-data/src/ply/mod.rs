//! PLY point cloud reading and writing

mod loader;
mod writer;

pub use loader::{load_point_cloud_ply, read_point_cloud_ply};
pub use writer::{PlyFormat, save_point_cloud_ply, write_point_cloud_ply};
