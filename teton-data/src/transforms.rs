//! nerfstudio-style `transforms.json` camera files.
//!
//! Intrinsics may be given once at the top level or per frame; per-frame
//! values win. `transform_matrix` is a row-major 4x4 camera-to-world matrix.

use crate::error::DataError;
use crate::types::{Camera, Intrinsics};
use glam::DMat4;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformsFrame {
    pub file_path: PathBuf,
    pub transform_matrix: [[f64; 4]; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    /// Multiplier converting stored depth values to scene units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_unit_scale_factor: Option<f64>,
    pub frames: Vec<TransformsFrame>,
}

impl TransformsFile {
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        info!("Loaded {} frames", file.frames.len());
        Ok(file)
    }

    /// Camera of frame `index`.
    pub fn camera(&self, index: usize) -> Result<Camera, DataError> {
        let frame = self.frames.get(index).ok_or_else(|| {
            DataError::InvalidData(format!(
                "frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })?;

        fn pick<T: Copy>(frame: Option<T>, global: Option<T>, name: &str, index: usize) -> Result<T, DataError> {
            frame.or(global).ok_or_else(|| {
                DataError::InvalidData(format!("frame {} has no '{}'", index, name))
            })
        }

        let fx = pick(frame.fl_x, self.fl_x, "fl_x", index)?;
        let fy = pick(frame.fl_y, self.fl_y, "fl_y", index)?;
        let cx = pick(frame.cx, self.cx, "cx", index)?;
        let cy = pick(frame.cy, self.cy, "cy", index)?;
        let width = pick(frame.w, self.w, "w", index)?;
        let height = pick(frame.h, self.h, "h", index)?;

        // stored row-major; glam takes columns
        let camera_to_world = DMat4::from_cols_array_2d(&frame.transform_matrix).transpose();
        debug!("Frame {} camera at {:?}", index, camera_to_world.w_axis.truncate());

        Ok(Camera::new(
            Intrinsics::new(fx, fy, cx, cy),
            camera_to_world,
            width,
            height,
        ))
    }

    /// Image path of frame `index`, resolved against `base_dir`.
    pub fn image_path(&self, base_dir: &Path, index: usize) -> Option<PathBuf> {
        self.frames.get(index).map(|f| base_dir.join(&f.file_path))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
