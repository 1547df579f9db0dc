//! Normal estimation and view-consistent re-orientation.

use crate::pointcloud::error::PointCloudError;
use crate::pointcloud::neighbors::NeighborIndex;
use glam::DVec3;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;

/// Neighbourhood size of the covariance fit.
pub const DEFAULT_NORMAL_NEIGHBORS: usize = 30;

/// Unit normal per point from the smallest-eigenvalue eigenvector of the
/// covariance of its `k` nearest points (itself included). Points with
/// fewer than three neighbours get `+Z`. The sign is arbitrary; see
/// [`reorient_normals`].
pub fn estimate_normals(points: &[DVec3], k: usize) -> Vec<DVec3> {
    if points.is_empty() {
        return Vec::new();
    }
    let index = NeighborIndex::new(points);

    points
        .par_iter()
        .map(|&p| {
            let neighbors = index.nearest(p, k);
            if neighbors.len() < 3 {
                return DVec3::Z;
            }

            let centroid = neighbors.iter().map(|&i| points[i]).sum::<DVec3>() / neighbors.len() as f64;
            let mut cov = Matrix3::<f64>::zeros();
            for &i in &neighbors {
                let d = points[i] - centroid;
                let d = Vector3::new(d.x, d.y, d.z);
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f64;

            let eigen = SymmetricEigen::new(cov);
            let smallest = (0..3)
                .min_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]))
                .unwrap_or(2);
            let n = eigen.eigenvectors.column(smallest);
            DVec3::new(n[0], n[1], n[2]).normalize_or(DVec3::Z)
        })
        .collect()
}

/// Flip every normal that points along its view direction
/// (`dot(view_direction, normal) > 0`).
///
/// View directions point from the camera into the scene, so kept normals
/// face the camera. Applying this twice changes nothing.
pub fn reorient_normals(normals: &mut [DVec3], view_directions: &[DVec3]) -> Result<usize, PointCloudError> {
    if normals.len() != view_directions.len() {
        return Err(PointCloudError::OutputLengthMismatch {
            name: "view_directions".into(),
            expected: normals.len(),
            actual: view_directions.len(),
        });
    }
    let mut flipped = 0;
    for (normal, view) in normals.iter_mut().zip(view_directions) {
        if view.dot(*normal) > 0.0 {
            *normal = -*normal;
            flipped += 1;
        }
    }
    Ok(flipped)
}
