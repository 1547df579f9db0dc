//! Panoptic segmentation artifacts: class metadata, on-disk layout and
//! conversion from panoptic segment ids to semantic class ids.

use crate::error::DataError;
use crate::raster::{Mask, SemanticMap, resize_nearest};
use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Folder suffixes of the image resolution pyramid (`images`, `images_2`, ...).
pub const IMAGE_FOLDER_SUFFIXES: [&str; 4] = ["", "_2", "_4", "_8"];

/// File name of the class metadata written next to the image folders.
pub const PANOPTIC_CLASSES_FILE: &str = "panoptic_classes.json";

/// Class names, colors and id maps of the panoptic model.
///
/// Semantic ids are contiguous: things first, then stuff offset by the
/// number of thing classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanopticClasses {
    pub thing_classes: Vec<String>,
    pub stuff_classes: Vec<String>,
    pub thing_colors: Vec<[u8; 3]>,
    pub stuff_colors: Vec<[u8; 3]>,
    #[serde(default)]
    pub thing_dataset_id_to_contiguous_id: BTreeMap<u32, u32>,
    #[serde(default)]
    pub stuff_dataset_id_to_contiguous_id: BTreeMap<u32, u32>,
}

impl PanopticClasses {
    pub fn num_things(&self) -> usize {
        self.thing_classes.len()
    }

    pub fn num_stuff(&self) -> usize {
        self.stuff_classes.len()
    }

    /// All class names in semantic-id order.
    pub fn class_names(&self) -> Vec<String> {
        self.thing_classes
            .iter()
            .chain(self.stuff_classes.iter())
            .cloned()
            .collect()
    }

    /// All class colors in semantic-id order.
    pub fn class_colors(&self) -> Vec<[u8; 3]> {
        self.thing_colors
            .iter()
            .chain(self.stuff_colors.iter())
            .copied()
            .collect()
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let classes: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        debug!(
            "Loaded {} thing and {} stuff classes",
            classes.num_things(),
            classes.num_stuff()
        );
        Ok(classes)
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }
}

/// One segment of a panoptic prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub id: u32,
    pub category_id: u32,
    #[serde(rename = "isthing")]
    pub is_thing: bool,
}

/// Per-pixel panoptic segment ids.
pub type PanopticMap = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Replace each segment id with its semantic class id.
///
/// Things map to `category_id`, stuff to `category_id + num_things`.
/// Pixels whose id matches no segment keep their raw value. Ids are looked
/// up in the original prediction, so a class id never gets remapped twice.
pub fn panoptic_to_semantic(
    panoptic: &PanopticMap,
    segments: &[SegmentInfo],
    num_things: u32,
) -> Result<SemanticMap, DataError> {
    let lookup: HashMap<u32, u32> = segments
        .iter()
        .map(|s| {
            let class = if s.is_thing {
                s.category_id
            } else {
                s.category_id + num_things
            };
            (s.id, class)
        })
        .collect();

    let mut semantic = GrayImage::new(panoptic.width(), panoptic.height());
    for (x, y, pixel) in panoptic.enumerate_pixels() {
        let raw = pixel[0];
        let class = lookup.get(&raw).copied().unwrap_or(raw);
        let class = u8::try_from(class).map_err(|_| {
            DataError::InvalidData(format!("semantic id {} does not fit in 8 bits", class))
        })?;
        semantic.put_pixel(x, y, Luma([class]));
    }
    Ok(semantic)
}

/// Directory layout of a dataset with panoptic segmentations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationLayout {
    root: PathBuf,
}

impl SegmentationLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, suffix: &str) -> PathBuf {
        self.root.join(format!("images{suffix}"))
    }

    pub fn segmentations_dir(&self, suffix: &str) -> PathBuf {
        self.root.join(format!("segmentations{suffix}"))
    }

    /// Segmentation PNG for `image` at pyramid level `suffix`.
    pub fn segmentation_path(&self, suffix: &str, image: &Path) -> Option<PathBuf> {
        let name = image.file_name()?;
        Some(
            self.segmentations_dir(suffix)
                .join(name)
                .with_extension("png"),
        )
    }

    pub fn classes_path(&self) -> PathBuf {
        self.root.join(PANOPTIC_CLASSES_FILE)
    }

    /// Image files of pyramid level `suffix`, sorted by name. A missing folder yields none.
    pub fn image_files(&self, suffix: &str) -> Result<Vec<PathBuf>, DataError> {
        let dir = self.images_dir(suffix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Semantic labelling of a dataset: one label image per training image.
#[derive(Debug, Clone, PartialEq)]
pub struct Semantics {
    pub filenames: Vec<PathBuf>,
    pub classes: Vec<String>,
    pub colors: Vec<[u8; 3]>,
    /// Classes whose pixels are excluded from training.
    pub mask_classes: Vec<String>,
}

impl Semantics {
    pub fn from_classes(
        filenames: Vec<PathBuf>,
        classes: &PanopticClasses,
        mask_classes: Vec<String>,
    ) -> Self {
        info!(
            "Semantics with {} classes over {} images",
            classes.num_things() + classes.num_stuff(),
            filenames.len()
        );
        Self {
            filenames,
            classes: classes.class_names(),
            colors: classes.class_colors(),
            mask_classes,
        }
    }

    /// Semantic ids of the mask classes.
    pub fn mask_indices(&self) -> Result<Vec<u8>, DataError> {
        self.mask_classes
            .iter()
            .map(|name| {
                let index = self
                    .classes
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| {
                        DataError::InvalidData(format!("mask class '{}' is not a known class", name))
                    })?;
                u8::try_from(index).map_err(|_| {
                    DataError::InvalidData(format!("class index {} does not fit in 8 bits", index))
                })
            })
            .collect()
    }
}

/// Load a semantic label image, resized by `scale_factor` (nearest).
pub fn load_semantic_map(path: &Path, scale_factor: f64) -> Result<SemanticMap, DataError> {
    let labels = image::open(path)?.into_luma8();
    if (scale_factor - 1.0).abs() < f64::EPSILON {
        return Ok(labels);
    }
    let width = (labels.width() as f64 * scale_factor) as u32;
    let height = (labels.height() as f64 * scale_factor) as u32;
    Ok(resize_nearest(&labels, width, height))
}

/// Select pixels whose label is not one of `mask_ids`.
pub fn semantic_mask(semantics: &SemanticMap, mask_ids: &[u8]) -> Mask {
    GrayImage::from_fn(semantics.width(), semantics.height(), |x, y| {
        if mask_ids.contains(&semantics.get_pixel(x, y)[0]) {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}
