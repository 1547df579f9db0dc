//! Single-channel rasters (depth, masks, semantic labels) and resampling helpers.

use crate::depth_cache::read_npy_2d;
use crate::error::DataError;
use image::{GrayImage, ImageBuffer, Luma, Pixel};
use std::path::Path;
use tracing::debug;

/// Per-pixel depth.
pub type DepthMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Pixel selection. Non-zero entries are selected.
pub type Mask = GrayImage;

/// Per-pixel semantic class ids.
pub type SemanticMap = GrayImage;

/// Nearest-neighbour (order-0) resize.
///
/// Output pixel `x` samples input pixel `floor(x * src_width / width)`, so an
/// integer downscale picks the same pixels as [`stride_image`].
pub fn resize_nearest<P>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    if src.width() == 0 || src.height() == 0 || width == 0 || height == 0 {
        return ImageBuffer::new(width, height);
    }
    if src.dimensions() == (width, height) {
        return src.clone();
    }

    let scale_x = src.width() as f64 / width as f64;
    let scale_y = src.height() as f64 / height as f64;
    ImageBuffer::from_fn(width, height, |x, y| {
        let sx = ((x as f64 * scale_x).floor() as u32).min(src.width() - 1);
        let sy = ((y as f64 * scale_y).floor() as u32).min(src.height() - 1);
        *src.get_pixel(sx, sy)
    })
}

/// Keep every `step`-th row and column, starting at the origin.
pub fn stride_image<P>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    step: u32,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, DataError>
where
    P: Pixel,
{
    if step == 0 {
        return Err(DataError::InvalidData("stride must be at least 1".into()));
    }
    let width = src.width() / step;
    let height = src.height() / step;
    Ok(ImageBuffer::from_fn(width, height, |x, y| {
        *src.get_pixel(x * step, y * step)
    }))
}

pub fn is_selected(mask: &Mask, x: u32, y: u32) -> bool {
    mask.get_pixel(x, y)[0] != 0
}

pub fn selected_count(mask: &Mask) -> usize {
    mask.pixels().filter(|p| p[0] != 0).count()
}

/// Mask selecting every pixel.
pub fn full_mask(width: u32, height: u32) -> Mask {
    GrayImage::from_pixel(width, height, Luma([255]))
}

/// Mask selecting every `stride`-th pixel along both axes, starting at the origin.
pub fn strided_mask(width: u32, height: u32, stride: u32) -> Result<Mask, DataError> {
    if stride == 0 {
        return Err(DataError::InvalidData("mask stride must be at least 1".into()));
    }
    Ok(GrayImage::from_fn(width, height, |x, y| {
        if x % stride == 0 && y % stride == 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    }))
}

/// Pixel-wise AND of two masks of equal size.
pub fn intersect_masks(a: &Mask, b: &Mask) -> Result<Mask, DataError> {
    if a.dimensions() != b.dimensions() {
        return Err(DataError::InvalidData(format!(
            "mask sizes differ: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }
    Ok(GrayImage::from_fn(a.width(), a.height(), |x, y| {
        if is_selected(a, x, y) && is_selected(b, x, y) {
            Luma([255])
        } else {
            Luma([0])
        }
    }))
}

/// Load a depth image stored as a 16-bit PNG or a 2D `.npy` array.
///
/// Raw values are multiplied by `scale_factor` and resized (nearest) to
/// `width x height`.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_depth_image(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    scale_factor: f64,
) -> Result<DepthMap, DataError> {
    let path = path.as_ref();
    let is_npy = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("npy"));

    let depth: DepthMap = if is_npy {
        let (rows, cols, values) = read_npy_2d(path)?;
        let scaled = values
            .into_iter()
            .map(|v| (v as f64 * scale_factor) as f32)
            .collect();
        ImageBuffer::from_raw(cols, rows, scaled)
            .ok_or_else(|| DataError::InvalidData("depth array size mismatch".into()))?
    } else {
        let raw = image::open(path)?.into_luma16();
        ImageBuffer::from_fn(raw.width(), raw.height(), |x, y| {
            Luma([(raw.get_pixel(x, y)[0] as f64 * scale_factor) as f32])
        })
    };

    debug!(
        "Loaded depth image {}x{}, resizing to {}x{}",
        depth.width(),
        depth.height(),
        width,
        height
    );
    Ok(resize_nearest(&depth, width, height))
}
