//! Monocular pseudo-depth: load the per-dataset cache or generate it once.

use crate::dataset::error::DatasetError;
use image::DynamicImage;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use teton_data::depth_cache::{DepthStack, cache_path};
use teton_data::DepthMap;
use tracing::{info, instrument, warn};

/// Predicts a relative depth map from a single image.
pub trait MonocularDepthEstimator {
    fn estimate(&mut self, image: &DynamicImage) -> Result<DepthMap, DatasetError>;
}

/// Where the depth stack came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthOrigin {
    Cache,
    Generated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PseudoDepth {
    pub depths: DepthStack,
    pub origin: DepthOrigin,
    pub cache: PathBuf,
}

impl PseudoDepth {
    /// Freshly generated depth is only fit for pseudo-depth losses.
    pub fn forces_pseudodepth_loss(&self) -> bool {
        self.origin == DepthOrigin::Generated
    }
}

/// Load `depths.npy` next to the first image, or run `estimator` over every
/// image and persist the result there.
#[instrument(skip_all, fields(images = image_filenames.len()))]
pub fn load_or_generate_depths<E>(
    image_filenames: &[PathBuf],
    estimator: &mut E,
    progress: &ProgressBar,
) -> Result<PseudoDepth, DatasetError>
where
    E: MonocularDepthEstimator + ?Sized,
{
    let first = image_filenames
        .first()
        .ok_or_else(|| DatasetError::InvalidData("no images to estimate depth for".into()))?;
    let cache = cache_path(first);

    if cache.exists() {
        info!("Loading pseudodata depth from cache {}", cache.display());
        let depths = DepthStack::load(&cache)?;
        if depths.len() != image_filenames.len() {
            warn!(
                "Depth cache holds {} maps for {} images",
                depths.len(),
                image_filenames.len()
            );
        }
        return Ok(PseudoDepth {
            depths,
            origin: DepthOrigin::Cache,
            cache,
        });
    }

    info!("No depth data found, generating pseudodepth");
    let depths = generate_depths(image_filenames, estimator, progress)?;
    depths.save(&cache)?;
    info!("Saved {} depth maps to {}", depths.len(), cache.display());
    Ok(PseudoDepth {
        depths,
        origin: DepthOrigin::Generated,
        cache,
    })
}

fn generate_depths<E>(
    image_filenames: &[PathBuf],
    estimator: &mut E,
    progress: &ProgressBar,
) -> Result<DepthStack, DatasetError>
where
    E: MonocularDepthEstimator + ?Sized,
{
    progress.set_length(image_filenames.len() as u64);
    progress.set_message("Generating depth images");
    let mut maps = Vec::with_capacity(image_filenames.len());
    for path in image_filenames {
        maps.push(estimator.estimate(&open_image(path)?)?);
        progress.inc(1);
    }
    progress.finish();
    Ok(DepthStack::from_maps(&maps)?)
}

fn open_image(path: &Path) -> Result<DynamicImage, DatasetError> {
    Ok(image::open(path)?)
}
