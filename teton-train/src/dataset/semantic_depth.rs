//! Per-image semantic labels, training mask and depth for the semantic
//! depth dataset.

use crate::dataset::error::DatasetError;
use crate::dataset::pseudo_depth::{MonocularDepthEstimator, load_or_generate_depths};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use teton_data::panoptic::{Semantics, load_semantic_map, semantic_mask};
use teton_data::raster::{intersect_masks, load_depth_image};
use teton_data::{Camera, DepthMap, DepthStack, Mask, SemanticMap};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticDepthConfig {
    /// Use monocular depth even when depth files exist (sensor depth is sparse).
    pub use_monocular_depth: bool,
    /// Image resolution scale applied to cameras, labels and depth.
    pub scale_factor: f64,
}

impl Default for SemanticDepthConfig {
    fn default() -> Self {
        Self {
            use_monocular_depth: true,
            scale_factor: 1.0,
        }
    }
}

/// Where per-image depth comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DepthSource {
    Stack(DepthStack),
    Files {
        filenames: Vec<PathBuf>,
        depth_unit_scale_factor: f64,
    },
}

/// Depth source for a dataset, and whether it forces the pseudo-depth loss.
///
/// Monocular depth (cached or freshly generated) is used unless
/// `use_monocular_depth` is off and depth files are available.
pub fn select_depth_source<E>(
    config: &SemanticDepthConfig,
    image_filenames: &[PathBuf],
    depth_filenames: Option<Vec<PathBuf>>,
    depth_unit_scale_factor: f64,
    estimator: &mut E,
    progress: &ProgressBar,
) -> Result<(DepthSource, bool), DatasetError>
where
    E: MonocularDepthEstimator + ?Sized,
{
    match depth_filenames {
        Some(filenames) if !config.use_monocular_depth => {
            if filenames.len() != image_filenames.len() {
                return Err(DatasetError::InvalidData(format!(
                    "{} depth files for {} images",
                    filenames.len(),
                    image_filenames.len()
                )));
            }
            info!("Using {} depth files", filenames.len());
            Ok((
                DepthSource::Files {
                    filenames,
                    depth_unit_scale_factor,
                },
                false,
            ))
        }
        _ => {
            let pseudo = load_or_generate_depths(image_filenames, estimator, progress)?;
            let forced = pseudo.forces_pseudodepth_loss();
            Ok((DepthSource::Stack(pseudo.depths), forced))
        }
    }
}

/// Metadata handed to the training batch for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    pub mask: Mask,
    pub semantics: SemanticMap,
    pub depth_image: DepthMap,
}

pub struct SemanticDepthDataset {
    semantics: Semantics,
    mask_ids: Vec<u8>,
    depth: DepthSource,
    image_sizes: Vec<(u32, u32)>,
    scale_factor: f64,
}

impl SemanticDepthDataset {
    pub fn new(
        semantics: Semantics,
        depth: DepthSource,
        cameras: &[Camera],
        scale_factor: f64,
    ) -> Result<Self, DatasetError> {
        if semantics.filenames.len() != cameras.len() {
            return Err(DatasetError::InvalidData(format!(
                "{} semantic maps for {} cameras",
                semantics.filenames.len(),
                cameras.len()
            )));
        }
        let mask_ids = semantics.mask_indices()?;
        debug!("Masking semantic ids {:?}", mask_ids);
        let image_sizes = cameras
            .iter()
            .map(|c| {
                (
                    (c.width as f64 * scale_factor) as u32,
                    (c.height as f64 * scale_factor) as u32,
                )
            })
            .collect();
        Ok(Self {
            semantics,
            mask_ids,
            depth,
            image_sizes,
            scale_factor,
        })
    }

    pub fn len(&self) -> usize {
        self.image_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_sizes.is_empty()
    }

    pub fn semantics(&self) -> &Semantics {
        &self.semantics
    }

    /// Semantic labels, training mask and depth of image `image_idx`.
    ///
    /// Pixels of mask classes are excluded; an existing `mask` is ANDed in.
    pub fn frame_metadata(
        &self,
        image_idx: usize,
        mask: Option<&Mask>,
    ) -> Result<FrameMetadata, DatasetError> {
        let count = self.len();
        let out_of_range = || DatasetError::ImageIndex {
            index: image_idx,
            count,
        };
        let label_path = self.semantics.filenames.get(image_idx).ok_or_else(out_of_range)?;
        let labels = load_semantic_map(label_path, self.scale_factor)?;
        let mut training_mask = semantic_mask(&labels, &self.mask_ids);
        if let Some(existing) = mask {
            training_mask = intersect_masks(&training_mask, existing)?;
        }

        let depth_image = match &self.depth {
            DepthSource::Stack(stack) => stack.get(image_idx).ok_or_else(out_of_range)?,
            DepthSource::Files {
                filenames,
                depth_unit_scale_factor,
            } => {
                let path = filenames.get(image_idx).ok_or_else(out_of_range)?;
                let (width, height) = self.image_sizes[image_idx];
                load_depth_image(path, width, height, depth_unit_scale_factor * self.scale_factor)?
            }
        };

        Ok(FrameMetadata {
            mask: training_mask,
            semantics: labels,
            depth_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DMat4;
    use image::{GrayImage, ImageBuffer, Luma};
    use teton_data::Intrinsics;
    use teton_data::panoptic::PanopticClasses;
    use teton_data::raster::selected_count;

    struct Unused;

    impl MonocularDepthEstimator for Unused {
        fn estimate(&mut self, _image: &image::DynamicImage) -> Result<DepthMap, DatasetError> {
            Err(DatasetError::DepthEstimation("not expected".into()))
        }
    }

    fn classes() -> PanopticClasses {
        PanopticClasses {
            thing_classes: vec!["chair".into()],
            stuff_classes: vec!["floor".into(), "window".into()],
            thing_colors: vec![[1, 1, 1]],
            stuff_colors: vec![[2, 2, 2], [3, 3, 3]],
            thing_dataset_id_to_contiguous_id: Default::default(),
            stuff_dataset_id_to_contiguous_id: Default::default(),
        }
    }

    fn camera() -> Camera {
        Camera::new(Intrinsics::new(1.0, 1.0, 1.0, 1.0), DMat4::IDENTITY, 3, 2)
    }

    #[test]
    fn test_frame_metadata_masks_classes() {
        let dir = tempfile::tempdir().unwrap();
        let label_path = dir.path().join("frame.png");
        GrayImage::from_raw(3, 2, vec![0, 2, 1, 2, 2, 0]).unwrap().save(&label_path).unwrap();

        let semantics = Semantics::from_classes(vec![label_path], &classes(), vec!["window".into()]);
        let depth: DepthMap = ImageBuffer::from_pixel(3, 2, Luma([1.5]));
        let stack = DepthStack::from_maps(&[depth]).unwrap();
        let dataset =
            SemanticDepthDataset::new(semantics, DepthSource::Stack(stack), &[camera()], 1.0).unwrap();

        let meta = dataset.frame_metadata(0, None).unwrap();
        assert_eq!(selected_count(&meta.mask), 3);
        assert_eq!(meta.depth_image.get_pixel(2, 1)[0], 1.5);

        let mut existing = GrayImage::from_pixel(3, 2, Luma([255]));
        existing.put_pixel(0, 0, Luma([0]));
        let meta = dataset.frame_metadata(0, Some(&existing)).unwrap();
        assert_eq!(selected_count(&meta.mask), 2);

        assert!(matches!(
            dataset.frame_metadata(1, None),
            Err(DatasetError::ImageIndex { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_depth_files_used_when_monocular_disabled() {
        let config = SemanticDepthConfig {
            use_monocular_depth: false,
            ..SemanticDepthConfig::default()
        };
        let images = vec![PathBuf::from("images/a.png")];
        let (source, forced) = select_depth_source(
            &config,
            &images,
            Some(vec![PathBuf::from("depth/a.png")]),
            0.001,
            &mut Unused,
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert!(!forced);
        assert!(matches!(source, DepthSource::Files { .. }));
    }

    #[test]
    fn test_depth_file_scaled_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        let label_path = dir.path().join("labels.png");
        GrayImage::from_pixel(3, 2, Luma([0])).save(&label_path).unwrap();
        let depth_path = dir.path().join("depth.png");
        let raw: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(6, 4, Luma([2000]));
        raw.save(&depth_path).unwrap();

        let semantics = Semantics::from_classes(vec![label_path], &classes(), Vec::new());
        let source = DepthSource::Files {
            filenames: vec![depth_path],
            depth_unit_scale_factor: 0.001,
        };
        let dataset = SemanticDepthDataset::new(semantics, source, &[camera()], 1.0).unwrap();
        let meta = dataset.frame_metadata(0, None).unwrap();
        assert_eq!(meta.depth_image.dimensions(), (3, 2));
        assert!((meta.depth_image.get_pixel(0, 0)[0] - 2.0).abs() < 1e-6);
        assert_eq!(selected_count(&meta.mask), 6);
    }
}
