//! Cropping volumes used to restrict point extraction.

use crate::error::DataError;
use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Axis-aligned box. `min < max` holds on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AabbRepr", into = "AabbRepr")]
pub struct Aabb {
    min: DVec3,
    max: DVec3,
}

#[derive(Serialize, Deserialize)]
struct AabbRepr {
    min: [f64; 3],
    max: [f64; 3],
}

impl TryFrom<AabbRepr> for Aabb {
    type Error = DataError;

    fn try_from(repr: AabbRepr) -> Result<Self, Self::Error> {
        Aabb::new(DVec3::from_array(repr.min), DVec3::from_array(repr.max))
    }
}

impl From<Aabb> for AabbRepr {
    fn from(aabb: Aabb) -> Self {
        Self {
            min: aabb.min.to_array(),
            max: aabb.max.to_array(),
        }
    }
}

impl Aabb {
    /// Validate and build a box. Fails unless `min` is strictly below `max` per axis.
    pub fn new(min: DVec3, max: DVec3) -> Result<Self, DataError> {
        if !min.cmplt(max).all() {
            return Err(DataError::InvalidBoundingBox {
                min: min.to_array(),
                max: max.to_array(),
            });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> DVec3 {
        self.min
    }

    pub fn max(&self) -> DVec3 {
        self.max
    }

    /// Strict containment: every coordinate lies strictly between min and max.
    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpgt(self.min).all() && point.cmplt(self.max).all()
    }
}

/// Box with arbitrary orientation, described by its center, rotation and full extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    /// Box-to-world rotation.
    pub rotation: DMat3,
    pub center: DVec3,
    /// Full edge lengths along the box axes.
    pub size: DVec3,
}

impl OrientedBox {
    pub fn new(rotation: DMat3, center: DVec3, size: DVec3) -> Self {
        Self {
            rotation,
            center,
            size,
        }
    }

    /// Inclusive containment test in the box frame.
    pub fn contains(&self, point: DVec3) -> bool {
        let local = self.rotation.transpose() * (point - self.center);
        let half = self.size * 0.5;
        local.abs().cmple(half).all()
    }
}

/// The single cropping volume active for an accumulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingRegion {
    Aabb(Aabb),
    Oriented(OrientedBox),
}

impl BoundingRegion {
    /// Pick the active region. The oriented box wins when both are supplied.
    pub fn resolve(aabb: Option<Aabb>, obb: Option<OrientedBox>) -> Option<Self> {
        match (aabb, obb) {
            (Some(_), Some(obb)) => {
                warn!("Provided aabb and crop_obb at the same time, using only the obb");
                Some(Self::Oriented(obb))
            }
            (None, Some(obb)) => Some(Self::Oriented(obb)),
            (Some(aabb), None) => Some(Self::Aabb(aabb)),
            (None, None) => None,
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        match self {
            Self::Aabb(aabb) => aabb.contains(point),
            Self::Oriented(obb) => obb.contains(point),
        }
    }
}
