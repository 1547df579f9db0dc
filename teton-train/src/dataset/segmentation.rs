//! Panoptic segmentation of every image folder of a dataset.

use crate::dataset::error::DatasetError;
use image::DynamicImage;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use teton_data::panoptic::{
    IMAGE_FOLDER_SUFFIXES, PanopticClasses, PanopticMap, SegmentInfo, SegmentationLayout,
    panoptic_to_semantic,
};
use tracing::{debug, info, instrument};

/// Output of a panoptic model for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct PanopticPrediction {
    pub panoptic: PanopticMap,
    pub segments: Vec<SegmentInfo>,
}

/// A panoptic segmentation model.
pub trait PanopticPredictor {
    /// Class metadata of the model
    fn classes(&self) -> PanopticClasses;

    fn predict(&mut self, image: &DynamicImage) -> Result<PanopticPrediction, DatasetError>;
}

/// Semantic PNGs written by [`add_segmentation`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationSummary {
    pub segmentation_files: Vec<PathBuf>,
    /// Pyramid folders that did not exist
    pub missing_folders: Vec<PathBuf>,
}

/// Segment every image of every `images{suffix}` folder under `root`.
///
/// Semantic labels go to `segmentations{suffix}/<name>.png` and the class
/// metadata to `panoptic_classes.json`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn add_segmentation<P>(
    root: &Path,
    predictor: &mut P,
    progress: &ProgressBar,
) -> Result<SegmentationSummary, DatasetError>
where
    P: PanopticPredictor + ?Sized,
{
    info!("Generating semantics");
    let layout = SegmentationLayout::new(root);
    let classes = predictor.classes();
    let num_things = u32::try_from(classes.num_things())
        .map_err(|_| DatasetError::InvalidData("too many thing classes".into()))?;

    let mut summary = SegmentationSummary::default();
    for suffix in IMAGE_FOLDER_SUFFIXES {
        let images_dir = layout.images_dir(suffix);
        if !images_dir.is_dir() {
            debug!("Skipping missing folder {}", images_dir.display());
            summary.missing_folders.push(images_dir);
            continue;
        }
        std::fs::create_dir_all(layout.segmentations_dir(suffix))?;

        let images = layout.image_files(suffix)?;
        progress.inc_length(images.len() as u64);
        for image_path in images {
            let Some(target) = layout.segmentation_path(suffix, &image_path) else {
                continue;
            };
            let prediction = predictor.predict(&image::open(&image_path)?)?;
            let semantic = panoptic_to_semantic(&prediction.panoptic, &prediction.segments, num_things)?;
            semantic.save(&target)?;
            summary.segmentation_files.push(target);
            progress.inc(1);
        }
    }

    classes.save(&layout.classes_path())?;
    progress.finish();
    info!(
        "Wrote {} segmentations and {}",
        summary.segmentation_files.len(),
        layout.classes_path().display()
    );
    Ok(summary)
}
