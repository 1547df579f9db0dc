//! Point cloud of a posed dataset with per-image depth.

use crate::errors::AppError;
use image::{ImageBuffer, Luma};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use teton_data::depth_cache::cache_path;
use teton_data::raster::{intersect_masks, load_depth_image, resize_nearest, strided_mask};
use teton_data::{
    BoundingRegion, DepthMap, DepthStack, PlyFormat, PointCloud, TransformsFile,
    save_point_cloud_ply,
};
use teton_train::PointCloudConfig;
use teton_train::pointcloud::{statistical_outlier_indices, unproject_frame};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct UnprojectOptions {
    pub transforms: PathBuf,
    pub output: PathBuf,
    /// Depth stack; defaults to `depths.npy` next to the first image
    pub depths: Option<PathBuf>,
    pub downsample: u32,
    pub stride: u32,
    /// Overrides `depth_unit_scale_factor` of the camera file
    pub depth_scale: Option<f64>,
    pub config: PointCloudConfig,
    pub format: PlyFormat,
}

fn scale_depth(depth: DepthMap, scale: f64) -> DepthMap {
    if (scale - 1.0).abs() < f64::EPSILON {
        return depth;
    }
    ImageBuffer::from_fn(depth.width(), depth.height(), |x, y| {
        Luma([(depth.get_pixel(x, y)[0] as f64 * scale) as f32])
    })
}

fn find_depth_stack(transforms: &TransformsFile, base_dir: &Path, explicit: Option<&Path>) -> Result<Option<DepthStack>, AppError> {
    if let Some(path) = explicit {
        return Ok(Some(DepthStack::load(path)?));
    }
    let Some(first) = transforms.image_path(base_dir, 0) else {
        return Ok(None);
    };
    let cache = cache_path(&first);
    if cache.exists() {
        info!("Using depth cache {}", cache.display());
        return Ok(Some(DepthStack::load(&cache)?));
    }
    Ok(None)
}

/// Unproject every frame of a `transforms.json` dataset, optionally crop and
/// clean the result, and write it as PLY.
#[instrument(skip_all, fields(transforms = %options.transforms.display()))]
pub fn run(options: &UnprojectOptions) -> Result<PointCloud, AppError> {
    let transforms = TransformsFile::load(&options.transforms)?;
    let base_dir = options
        .transforms
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let stack = find_depth_stack(&transforms, &base_dir, options.depths.as_deref())?;
    if let Some(stack) = &stack {
        if stack.len() != transforms.len() {
            warn!("Depth stack has {} maps for {} frames", stack.len(), transforms.len());
        }
    }
    let depth_scale = options
        .depth_scale
        .or(transforms.depth_unit_scale_factor)
        .unwrap_or(1.0);
    let region = if options.config.use_bounding_box {
        BoundingRegion::resolve(options.config.aabb, options.config.crop_obb)
    } else {
        None
    };

    let pb = ProgressBar::new(transforms.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) {msg}")?
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Unprojecting frames");

    let mut cloud = PointCloud::default();
    for (i, frame) in transforms.frames.iter().enumerate() {
        let camera = transforms.camera(i)?;
        let rgb = image::open(base_dir.join(&frame.file_path))?.into_rgb8();

        let depth = match (&stack, &frame.depth_file_path) {
            (Some(stack), _) => {
                let depth = stack.get(i).ok_or_else(|| AppError::MissingDepth {
                    frame: i,
                    reason: format!("depth stack holds {} maps", stack.len()),
                })?;
                scale_depth(depth, depth_scale)
            }
            (None, Some(path)) => {
                load_depth_image(base_dir.join(path), camera.width, camera.height, depth_scale)?
            }
            (None, None) => {
                return Err(AppError::MissingDepth {
                    frame: i,
                    reason: "no depth stack and no depth_file_path".into(),
                });
            }
        };

        let mut mask = strided_mask(depth.width(), depth.height(), options.stride)?;
        if let Some(mask_path) = &frame.mask_path {
            let frame_mask = image::open(base_dir.join(mask_path))?.into_luma8();
            let frame_mask = resize_nearest(&frame_mask, depth.width(), depth.height());
            mask = intersect_masks(&mask, &frame_mask)?;
        }

        let mut frame_cloud = unproject_frame(&camera, &rgb, &depth, Some(&mask), options.downsample)?;
        if let Some(region) = &region {
            let inside: Vec<usize> = frame_cloud
                .points()
                .iter()
                .enumerate()
                .filter(|(_, p)| region.contains(**p))
                .map(|(i, _)| i)
                .collect();
            frame_cloud = frame_cloud.select(&inside)?;
        }
        debug!("Frame {} contributed {} points", i, frame_cloud.len());
        cloud.extend(frame_cloud);
        pb.inc(1);
    }
    pb.finish_with_message("Unprojected all frames");

    if options.config.remove_outliers {
        info!("Cleaning point cloud");
        let keep = statistical_outlier_indices(
            cloud.points(),
            options.config.outlier_neighbors,
            options.config.std_ratio,
        );
        info!("Removed {} outliers", cloud.len() - keep.len());
        cloud = cloud.select(&keep)?;
    }

    save_point_cloud_ply(&cloud, &options.output, options.format)?;
    info!("Saved {} points to {}", cloud.len(), options.output.display());
    Ok(cloud)
}
