//! Stacked per-image depth maps persisted as `.npy` arrays.
//!
//! The cache lives next to the first training image as `depths.npy` and
//! holds one `f32` depth map per image, shape `[N, H, W]`. Arrays saved
//! with a singleton channel axis (`[N, 1, H, W]`) are accepted on load.

use crate::error::DataError;
use crate::raster::DepthMap;
use image::ImageBuffer;
use npyz::WriterBuilder;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the depth cache.
pub const DEPTH_CACHE_FILE: &str = "depths.npy";

/// Location of the depth cache for a dataset whose first image is `first_image`.
pub fn cache_path(first_image: &Path) -> PathBuf {
    first_image
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(DEPTH_CACHE_FILE)
}

/// `N` depth maps of identical size, stored contiguously.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthStack {
    count: usize,
    height: u32,
    width: u32,
    data: Vec<f32>,
}

impl DepthStack {
    /// Stack depth maps. All maps must share one size.
    pub fn from_maps(maps: &[DepthMap]) -> Result<Self, DataError> {
        let Some(first) = maps.first() else {
            return Ok(Self {
                count: 0,
                height: 0,
                width: 0,
                data: Vec::new(),
            });
        };
        let (width, height) = first.dimensions();
        let mut data = Vec::with_capacity(maps.len() * (width * height) as usize);
        for (i, map) in maps.iter().enumerate() {
            if map.dimensions() != (width, height) {
                return Err(DataError::InvalidData(format!(
                    "depth map {} is {:?}, expected {:?}",
                    i,
                    map.dimensions(),
                    (width, height)
                )));
            }
            data.extend_from_slice(map.as_raw());
        }
        Ok(Self {
            count: maps.len(),
            height,
            width,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// (width, height) of each map.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Depth map for image `index`.
    pub fn get(&self, index: usize) -> Option<DepthMap> {
        if index >= self.count {
            return None;
        }
        let size = (self.width * self.height) as usize;
        let slice = &self.data[index * size..(index + 1) * size];
        ImageBuffer::from_raw(self.width, self.height, slice.to_vec())
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Load a stack from an `.npy` file.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let (shape, data) = read_npy_f32(path)?;
        let (count, height, width) = match shape.as_slice() {
            [n, h, w] => (*n, *h, *w),
            [n, 1, h, w] => (*n, *h, *w),
            other => {
                return Err(DataError::Npy(format!(
                    "expected depth stack of shape [N, H, W], got {:?}",
                    other
                )));
            }
        };
        info!("Loaded {} cached depth maps ({}x{})", count, width, height);
        Ok(Self {
            count: count as usize,
            height: height as u32,
            width: width as u32,
            data,
        })
    }

    /// Persist the stack as a C-order `[N, H, W]` float32 array.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        let file = BufWriter::new(File::create(path)?);
        let shape = [self.count as u64, self.height as u64, self.width as u64];
        let mut writer = npyz::WriteOptions::<f32>::new()
            .default_dtype()
            .shape(&shape)
            .writer(file)
            .begin_nd()?;
        writer.extend(self.data.iter().copied())?;
        writer.finish()?;
        debug!("Wrote {} depth maps", self.count);
        Ok(())
    }
}

/// Read a 2D float32 array, returning `(rows, cols, values)`.
pub fn read_npy_2d(path: &Path) -> Result<(u32, u32, Vec<f32>), DataError> {
    let (shape, data) = read_npy_f32(path)?;
    match shape.as_slice() {
        [rows, cols] => Ok((*rows as u32, *cols as u32, data)),
        other => Err(DataError::Npy(format!(
            "expected a 2D array, got shape {:?}",
            other
        ))),
    }
}

fn read_npy_f32(path: &Path) -> Result<(Vec<u64>, Vec<f32>), DataError> {
    let reader = BufReader::new(File::open(path)?);
    let npy = npyz::NpyFile::new(reader).map_err(|e| DataError::Npy(e.to_string()))?;
    if matches!(npy.order(), npyz::Order::Fortran) {
        return Err(DataError::Npy("Fortran-order arrays are not supported".into()));
    }
    let shape = npy.shape().to_vec();
    let data = npy
        .into_vec::<f32>()
        .map_err(|e| DataError::Npy(e.to_string()))?;
    Ok((shape, data))
}
