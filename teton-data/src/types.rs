//! Core data types for cameras, ray batches and point clouds.
//!
//! These are CPU-side, f64 representations shared by the point cloud
//! extraction pipeline and the dataset helpers.

use crate::error::DataError;
use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// The 3x3 intrinsic matrix `K`.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.fx, 0.0, 0.0),
            DVec3::new(0.0, self.fy, 0.0),
            DVec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// Scale intrinsics for an image resized by `factor` (e.g. 0.5 for half resolution).
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            fx: self.fx * factor,
            fy: self.fy * factor,
            cx: self.cx * factor,
            cy: self.cy * factor,
        }
    }
}

/// A posed pinhole camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub intrinsics: Intrinsics,
    /// Camera-to-world rigid transform.
    pub camera_to_world: DMat4,
    pub width: u32,
    pub height: u32,
}

impl Camera {
    pub fn new(intrinsics: Intrinsics, camera_to_world: DMat4, width: u32, height: u32) -> Self {
        Self {
            intrinsics,
            camera_to_world,
            width,
            height,
        }
    }

    /// Rotation block of the camera-to-world transform.
    pub fn rotation(&self) -> DMat3 {
        DMat3::from_mat4(self.camera_to_world)
    }

    /// Camera center in world space (translation column).
    pub fn center(&self) -> DVec3 {
        self.camera_to_world.w_axis.truncate()
    }

    pub fn intrinsic_matrix(&self) -> DMat3 {
        self.intrinsics.matrix()
    }
}

/// A batch of rays with optional depth-scale metadata.
///
/// Directions are unit length. When the bundle was built from pixel
/// directions, `directions_norm` holds the length of each un-normalized
/// direction so a z-depth can be converted to a distance along the ray.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RayBundle {
    origins: Vec<DVec3>,
    directions: Vec<DVec3>,
    directions_norm: Option<Vec<f64>>,
}

impl RayBundle {
    /// Create a bundle from origins and unit directions.
    pub fn new(origins: Vec<DVec3>, directions: Vec<DVec3>) -> Result<Self, DataError> {
        if origins.len() != directions.len() {
            return Err(DataError::LengthMismatch {
                what: "ray directions",
                expected: origins.len(),
                actual: directions.len(),
            });
        }
        Ok(Self {
            origins,
            directions,
            directions_norm: None,
        })
    }

    /// Create a bundle from un-normalized pixel directions, recording their norms.
    pub fn from_pixel_directions(
        origins: Vec<DVec3>,
        pixel_directions: Vec<DVec3>,
    ) -> Result<Self, DataError> {
        let norms: Vec<f64> = pixel_directions.iter().map(|d| d.length()).collect();
        let directions = pixel_directions
            .iter()
            .map(|d| d.normalize_or_zero())
            .collect();
        Self::new(origins, directions)?.with_directions_norm(norms)
    }

    /// Attach per-ray direction norms.
    pub fn with_directions_norm(mut self, norms: Vec<f64>) -> Result<Self, DataError> {
        if norms.len() != self.origins.len() {
            return Err(DataError::LengthMismatch {
                what: "directions_norm",
                expected: self.origins.len(),
                actual: norms.len(),
            });
        }
        self.directions_norm = Some(norms);
        Ok(self)
    }

    pub fn origins(&self) -> &[DVec3] {
        &self.origins
    }

    pub fn directions(&self) -> &[DVec3] {
        &self.directions
    }

    pub fn directions_norm(&self) -> Option<&[f64]> {
        self.directions_norm.as_deref()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Point at `distance` along ray `index`.
    pub fn point_at(&self, index: usize, distance: f64) -> DVec3 {
        self.origins[index] + self.directions[index] * distance
    }
}

/// Points with parallel colors and optional normals.
///
/// All collections share one length and index correspondence; the
/// constructors and [`PointCloud::select`] keep it that way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<DVec3>,
    colors: Vec<DVec3>,
    normals: Option<Vec<DVec3>>,
}

impl PointCloud {
    /// Create a point cloud from points and RGB colors in `[0, 1]`.
    pub fn new(points: Vec<DVec3>, colors: Vec<DVec3>) -> Result<Self, DataError> {
        if points.len() != colors.len() {
            return Err(DataError::LengthMismatch {
                what: "colors",
                expected: points.len(),
                actual: colors.len(),
            });
        }
        Ok(Self {
            points,
            colors,
            normals: None,
        })
    }

    /// Attach normals, replacing any existing ones.
    pub fn with_normals(mut self, normals: Vec<DVec3>) -> Result<Self, DataError> {
        self.set_normals(normals)?;
        Ok(self)
    }

    pub fn set_normals(&mut self, normals: Vec<DVec3>) -> Result<(), DataError> {
        if normals.len() != self.points.len() {
            return Err(DataError::LengthMismatch {
                what: "normals",
                expected: self.points.len(),
                actual: normals.len(),
            });
        }
        self.normals = Some(normals);
        Ok(())
    }

    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    pub fn colors(&self) -> &[DVec3] {
        &self.colors
    }

    pub fn normals(&self) -> Option<&[DVec3]> {
        self.normals.as_deref()
    }

    pub fn normals_mut(&mut self) -> Option<&mut [DVec3]> {
        self.normals.as_deref_mut()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append another cloud. Normals survive only if both sides carry them.
    pub fn extend(&mut self, other: PointCloud) {
        let was_empty = self.points.is_empty();
        self.points.extend(other.points);
        self.colors.extend(other.colors);
        self.normals = match (self.normals.take(), other.normals) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend(theirs);
                Some(mine)
            }
            (None, Some(theirs)) if was_empty => Some(theirs),
            _ => None,
        };
    }

    /// Keep only the entries at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Result<Self, DataError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.points.len()) {
            return Err(DataError::InvalidData(format!(
                "index {} out of range for point cloud of {} points",
                bad,
                self.points.len()
            )));
        }
        Ok(Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            colors: indices.iter().map(|&i| self.colors[i]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i]).collect()),
        })
    }

    pub fn into_parts(self) -> (Vec<DVec3>, Vec<DVec3>, Option<Vec<DVec3>>) {
        (self.points, self.colors, self.normals)
    }
}
