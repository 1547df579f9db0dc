//! Pixel grids, per-pixel camera rays and frame preparation for
//! dataset-based point extraction.

use crate::pointcloud::error::PointCloudError;
use crate::pointcloud::unproject::invert_intrinsics;
use glam::{DVec2, DVec3};
use image::RgbImage;
use teton_data::raster::{resize_nearest, stride_image, strided_mask};
use teton_data::{Camera, DepthMap, Mask, RayBundle};
use tracing::debug;

/// Default pixel selection stride of the dataset extraction.
pub const DEFAULT_MASK_STRIDE: u32 = 10;

/// Pixel grid of an image downsampled by an integer factor.
///
/// Grid pixel `(i, j)` maps to image coordinates `((i + 0.5) * f, (j + 0.5) * f)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    downsample: u32,
}

impl PixelGrid {
    pub fn new(image_width: u32, image_height: u32, downsample: u32) -> Result<Self, PointCloudError> {
        if downsample == 0 {
            return Err(PointCloudError::InvalidParameter {
                name: "downsample",
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self {
            width: image_width / downsample,
            height: image_height / downsample,
            downsample,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn downsample(&self) -> u32 {
        self.downsample
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image-space coordinates of the center of grid pixel `(x, y)`.
    pub fn pixel_center(&self, x: u32, y: u32) -> DVec2 {
        (DVec2::new(x as f64, y as f64) + 0.5) * self.downsample as f64
    }
}

/// Per-pixel rays of a posed camera.
pub trait CameraRays {
    /// One ray per grid pixel in row-major order, starting at the camera
    /// center. `directions_norm` converts z-depth to distance along the ray.
    fn pixel_rays(&self, grid: &PixelGrid) -> Result<RayBundle, PointCloudError>;
}

impl CameraRays for Camera {
    fn pixel_rays(&self, grid: &PixelGrid) -> Result<RayBundle, PointCloudError> {
        let k_inv = invert_intrinsics(self.intrinsic_matrix())?;
        let rotation = self.rotation();
        let center = self.center();

        let mut directions = Vec::with_capacity(grid.len());
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let pixel = grid.pixel_center(x, y);
                directions.push(rotation * (k_inv * DVec3::new(pixel.x, pixel.y, 1.0)));
            }
        }
        debug!("Generated {} pixel rays", directions.len());
        Ok(RayBundle::from_pixel_directions(
            vec![center; directions.len()],
            directions,
        )?)
    }
}

/// RGB, depth and mask brought to a common downsampled resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFrame {
    pub rgb: RgbImage,
    pub depth: DepthMap,
    pub mask: Mask,
    pub downsample: u32,
}

/// Stride the RGB image by `downsample` and resize depth and mask (nearest)
/// to its resolution. Without a mask, every [`DEFAULT_MASK_STRIDE`]-th
/// depth pixel is selected.
pub fn prepare_frame(
    rgb: &RgbImage,
    depth: &DepthMap,
    mask: Option<&Mask>,
    downsample: u32,
) -> Result<PreparedFrame, PointCloudError> {
    if downsample == 0 {
        return Err(PointCloudError::InvalidParameter {
            name: "downsample",
            reason: "must be at least 1".into(),
        });
    }
    let rgb = stride_image(rgb, downsample)?;
    let (width, height) = rgb.dimensions();

    let mask = match mask {
        Some(mask) => resize_nearest(mask, width, height),
        None => {
            let sparse = strided_mask(depth.width(), depth.height(), DEFAULT_MASK_STRIDE)?;
            resize_nearest(&sparse, width, height)
        }
    };

    Ok(PreparedFrame {
        depth: resize_nearest(depth, width, height),
        rgb,
        mask,
        downsample,
    })
}
