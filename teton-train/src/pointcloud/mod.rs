//! Point cloud extraction from a trained render model and from datasets
//! with depth.
//!
//! [`generate_point_cloud`] validates a [`PointCloudConfig`], accumulates
//! rendered points, removes statistical outliers and sources normals.
//! [`unproject_frame`] handles the static per-image variant.

mod accumulator;
mod error;
mod neighbors;
mod normals;
mod outliers;
mod projector;
mod unproject;

pub use accumulator::{
    ALPHA_THRESHOLD, Accumulation, AccumulationBudget, AccumulationSettings, OutputSelection,
    Termination, accumulate,
};
pub use error::PointCloudError;
pub use normals::{DEFAULT_NORMAL_NEIGHBORS, estimate_normals, reorient_normals};
pub use outliers::{DEFAULT_OUTLIER_NEIGHBORS, DEFAULT_STD_RATIO, statistical_outlier_indices};
pub use projector::{CameraRays, DEFAULT_MASK_STRIDE, PixelGrid, PreparedFrame, prepare_frame};
pub use unproject::{Unprojection, invert_intrinsics, unproject, unproject_frame};

use crate::ingest::{BatchSource, RenderModel};
use glam::DVec3;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use teton_data::{Aabb, BoundingRegion, OrientedBox, PointCloud};
use tracing::{info, instrument};

/// Settings of [`generate_point_cloud`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudConfig {
    /// Points to accumulate; fewer remain if outliers are removed.
    pub num_points: usize,
    pub remove_outliers: bool,
    pub outlier_neighbors: usize,
    pub std_ratio: f64,
    pub estimate_normals: bool,
    pub normal_neighbors: usize,
    pub reorient_normals: bool,
    pub rgb_output_name: String,
    pub depth_output_name: String,
    pub normal_output_name: Option<String>,
    pub use_bounding_box: bool,
    pub aabb: Option<Aabb>,
    pub crop_obb: Option<OrientedBox>,
    pub max_iterations: usize,
    pub time_budget: Option<Duration>,
}

impl Default for PointCloudConfig {
    fn default() -> Self {
        let outputs = OutputSelection::default();
        Self {
            num_points: 1_000_000,
            remove_outliers: true,
            outlier_neighbors: DEFAULT_OUTLIER_NEIGHBORS,
            std_ratio: DEFAULT_STD_RATIO,
            estimate_normals: false,
            normal_neighbors: DEFAULT_NORMAL_NEIGHBORS,
            reorient_normals: false,
            rgb_output_name: outputs.rgb,
            depth_output_name: outputs.depth,
            normal_output_name: outputs.normal,
            use_bounding_box: true,
            aabb: None,
            crop_obb: None,
            max_iterations: AccumulationBudget::default().max_iterations,
            time_budget: None,
        }
    }
}

/// Where the final normals come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalSource {
    None,
    Estimated { neighbors: usize },
    Rendered(String),
}

impl PointCloudConfig {
    pub fn with_num_points(mut self, num_points: usize) -> Self {
        self.num_points = num_points;
        self
    }

    pub fn with_outlier_removal(mut self, enabled: bool) -> Self {
        self.remove_outliers = enabled;
        self
    }

    pub fn with_std_ratio(mut self, std_ratio: f64) -> Self {
        self.std_ratio = std_ratio;
        self
    }

    pub fn with_estimated_normals(mut self) -> Self {
        self.estimate_normals = true;
        self
    }

    pub fn with_normal_output(mut self, name: impl Into<String>) -> Self {
        self.normal_output_name = Some(name.into());
        self
    }

    pub fn with_reoriented_normals(mut self) -> Self {
        self.reorient_normals = true;
        self
    }

    pub fn with_aabb(mut self, aabb: Aabb) -> Self {
        self.aabb = Some(aabb);
        self
    }

    pub fn with_crop_obb(mut self, obb: OrientedBox) -> Self {
        self.crop_obb = Some(obb);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_time_budget(mut self, time_budget: Duration) -> Self {
        self.time_budget = Some(time_budget);
        self
    }

    /// Reject inconsistent settings and pick the normal source.
    pub fn validate(&self) -> Result<NormalSource, PointCloudError> {
        if self.max_iterations == 0 {
            return Err(PointCloudError::InvalidParameter {
                name: "max_iterations",
                reason: "must be at least 1".into(),
            });
        }
        if self.remove_outliers && self.outlier_neighbors == 0 {
            return Err(PointCloudError::InvalidParameter {
                name: "outlier_neighbors",
                reason: "must be at least 1 when removing outliers".into(),
            });
        }
        if self.std_ratio.is_nan() || self.std_ratio < 0.0 {
            return Err(PointCloudError::InvalidParameter {
                name: "std_ratio",
                reason: format!("must be non-negative, got {}", self.std_ratio),
            });
        }

        let source = match (self.estimate_normals, &self.normal_output_name) {
            (true, Some(name)) => return Err(PointCloudError::ConflictingNormalSources(name.clone())),
            (true, None) => {
                if self.normal_neighbors < 3 {
                    return Err(PointCloudError::InvalidParameter {
                        name: "normal_neighbors",
                        reason: "needs at least 3 neighbours".into(),
                    });
                }
                NormalSource::Estimated {
                    neighbors: self.normal_neighbors,
                }
            }
            (false, Some(name)) => NormalSource::Rendered(name.clone()),
            (false, None) => NormalSource::None,
        };
        if self.reorient_normals && source == NormalSource::None {
            return Err(PointCloudError::ReorientWithoutNormals);
        }
        Ok(source)
    }

    /// Accumulation settings derived from this config.
    pub fn accumulation_settings(&self) -> AccumulationSettings {
        let region = if self.use_bounding_box {
            BoundingRegion::resolve(self.aabb, self.crop_obb)
        } else {
            None
        };
        AccumulationSettings {
            target_points: self.num_points,
            outputs: OutputSelection {
                rgb: self.rgb_output_name.clone(),
                depth: self.depth_output_name.clone(),
                normal: self.normal_output_name.clone(),
            },
            region,
            budget: AccumulationBudget {
                max_iterations: self.max_iterations,
                time_budget: self.time_budget,
            },
        }
    }
}

/// Final cloud plus the accumulation report.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPointCloud {
    pub cloud: PointCloud,
    /// Index-aligned with `cloud`
    pub view_directions: Vec<DVec3>,
    pub iterations: usize,
    pub empty_iterations: usize,
    pub termination: Termination,
    pub removed_outliers: usize,
}

/// Extract a point cloud from `model`, drawing rays from `source`.
///
/// Configuration errors surface before the first batch is requested.
#[instrument(skip_all, fields(num_points = config.num_points))]
pub fn generate_point_cloud<S, M>(
    source: &mut S,
    model: &mut M,
    config: &PointCloudConfig,
    progress: &ProgressBar,
) -> Result<GeneratedPointCloud, PointCloudError>
where
    S: BatchSource + ?Sized,
    M: RenderModel + ?Sized,
{
    let normal_source = config.validate()?;
    let settings = config.accumulation_settings();

    let acc = accumulate(source, model, &settings, progress)?;
    let mut points = acc.points;
    let mut colors = acc.colors;
    let mut view_directions = acc.view_directions;
    let mut normals = acc.normals;

    let accumulated = points.len();
    if config.remove_outliers {
        info!("Cleaning point cloud");
        let keep = statistical_outlier_indices(&points, config.outlier_neighbors, config.std_ratio);
        let pick = |values: &[DVec3]| keep.iter().map(|&i| values[i]).collect::<Vec<_>>();
        points = pick(&points);
        colors = pick(&colors);
        view_directions = pick(&view_directions);
        normals = normals.map(|n| pick(&n));
    }
    let removed_outliers = accumulated - points.len();

    let normals = match normal_source {
        NormalSource::Estimated { neighbors } => {
            info!("Estimating point cloud normals");
            Some(estimate_normals(&points, neighbors))
        }
        NormalSource::Rendered(_) => normals,
        NormalSource::None => None,
    };

    let mut cloud = PointCloud::new(points, colors)?;
    if let Some(normals) = normals {
        cloud.set_normals(normals)?;
    }
    if config.reorient_normals {
        if let Some(normals) = cloud.normals_mut() {
            let flipped = reorient_normals(normals, &view_directions)?;
            info!("Re-oriented {} normals", flipped);
        }
    }

    info!(
        "Point cloud has {} points ({} removed as outliers)",
        cloud.len(),
        removed_outliers
    );
    Ok(GeneratedPointCloud {
        cloud,
        view_directions,
        iterations: acc.iterations,
        empty_iterations: acc.empty_iterations,
        termination: acc.termination,
        removed_outliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PointCloudConfig::default();
        assert_eq!(config.num_points, 1_000_000);
        assert!(config.remove_outliers);
        assert_eq!(config.std_ratio, 10.0);
        assert_eq!(config.validate().unwrap(), NormalSource::None);
    }

    #[test]
    fn test_conflicting_normal_sources() {
        let config = PointCloudConfig::default()
            .with_estimated_normals()
            .with_normal_output("normals");
        assert!(matches!(
            config.validate(),
            Err(PointCloudError::ConflictingNormalSources(name)) if name == "normals"
        ));
    }

    #[test]
    fn test_reorient_needs_normals() {
        let config = PointCloudConfig::default().with_reoriented_normals();
        assert!(matches!(config.validate(), Err(PointCloudError::ReorientWithoutNormals)));
        let config = config.with_normal_output("normals");
        assert_eq!(config.validate().unwrap(), NormalSource::Rendered("normals".into()));
    }

    #[test]
    fn test_zero_iteration_budget_rejected() {
        let config = PointCloudConfig::default().with_max_iterations(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_obb_wins_over_aabb() {
        let aabb = Aabb::new(DVec3::splat(-1.0), DVec3::ONE).unwrap();
        let obb = OrientedBox::new(glam::DMat3::IDENTITY, DVec3::ZERO, DVec3::splat(10.0));
        let settings = PointCloudConfig::default()
            .with_aabb(aabb)
            .with_crop_obb(obb)
            .accumulation_settings();
        assert_eq!(settings.region, Some(BoundingRegion::Oriented(obb)));

        let mut config = PointCloudConfig::default().with_aabb(aabb);
        config.use_bounding_box = false;
        assert_eq!(config.accumulation_settings().region, None);
    }

    #[test]
    fn test_config_from_json() {
        let config: PointCloudConfig = serde_json::from_str(
            r#"{"num_points": 5000, "aabb": {"min": [-1, -1, -1], "max": [1, 1, 1]}}"#,
        )
        .unwrap();
        assert_eq!(config.num_points, 5000);
        assert!(config.aabb.is_some());
        assert!(config.remove_outliers);

        let bad = serde_json::from_str::<PointCloudConfig>(
            r#"{"aabb": {"min": [1, 0, 0], "max": [0, 1, 1]}}"#,
        );
        assert!(bad.is_err());
    }
}
