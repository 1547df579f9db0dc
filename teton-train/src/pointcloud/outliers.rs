//! Statistical outlier removal.

use crate::pointcloud::neighbors::NeighborIndex;
use glam::DVec3;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Neighbours used for each point's mean distance.
pub const DEFAULT_OUTLIER_NEIGHBORS: usize = 20;

/// Default number of standard deviations a point may sit above the mean.
pub const DEFAULT_STD_RATIO: f64 = 10.0;

/// Indices of the points to keep, in ascending order.
///
/// Each point's mean distance to its `nb_neighbors` nearest other points is
/// compared against `mean + std_ratio * std` of all those means (sample
/// standard deviation); points above the threshold are dropped. Unlike
/// Open3D's `remove_statistical_outlier`, the point itself is not counted
/// among its neighbours, and points with a zero mean distance are kept.
///
/// Points with non-finite coordinates are always dropped and take no part
/// in the statistics. Fewer than two finite points are kept whole.
pub fn statistical_outlier_indices(points: &[DVec3], nb_neighbors: usize, std_ratio: f64) -> Vec<usize> {
    let finite: Vec<usize> = (0..points.len())
        .filter(|&i| points[i].is_finite())
        .collect();
    if finite.len() < points.len() {
        warn!(
            "Dropping {} points with non-finite coordinates",
            points.len() - finite.len()
        );
    }
    if finite.len() < 2 || nb_neighbors == 0 {
        return finite;
    }

    let positions: Vec<DVec3> = finite.iter().map(|&i| points[i]).collect();
    let index = NeighborIndex::new(&positions);
    let mean_distances: Vec<f64> = positions
        .par_iter()
        .enumerate()
        .map(|(i, &p)| {
            let distances = index.neighbor_distances(i, p, nb_neighbors);
            distances.iter().sum::<f64>() / distances.len() as f64
        })
        .collect();

    let n = mean_distances.len() as f64;
    let mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances
        .iter()
        .map(|d| (d - mean) * (d - mean))
        .sum::<f64>()
        / (n - 1.0);
    let threshold = mean + std_ratio * variance.sqrt();

    let kept: Vec<usize> = mean_distances
        .iter()
        .zip(&finite)
        .filter(|&(&d, _)| d <= threshold)
        .map(|(_, &i)| i)
        .collect();
    debug!(
        "Outlier threshold {:.6} (mean {:.6}), keeping {} of {} points",
        threshold,
        mean,
        kept.len(),
        points.len()
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with_outlier() -> Vec<DVec3> {
        let mut points: Vec<DVec3> = (0..10)
            .flat_map(|x| (0..10).map(move |y| DVec3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        points.push(DVec3::new(50.0, 50.0, 50.0));
        points
    }

    #[test]
    fn test_far_point_removed() {
        let points = grid_with_outlier();
        let kept = statistical_outlier_indices(&points, DEFAULT_OUTLIER_NEIGHBORS, 2.0);
        assert_eq!(kept.len(), 100);
        assert!(!kept.contains(&100));
        assert!(kept.iter().all(|&i| i < points.len()));
    }

    #[test]
    fn test_uniform_cloud_kept() {
        let points: Vec<DVec3> = (0..50).map(|i| DVec3::new(i as f64, 0.0, 0.0)).collect();
        let kept = statistical_outlier_indices(&points, 4, DEFAULT_STD_RATIO);
        assert_eq!(kept, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_tiny_clouds_kept() {
        assert!(statistical_outlier_indices(&[], 20, 1.0).is_empty());
        assert_eq!(statistical_outlier_indices(&[DVec3::ONE], 20, 1.0), vec![0]);
    }

    #[test]
    fn test_non_finite_points_dropped_without_poisoning_threshold() {
        let points = [
            DVec3::ZERO,
            DVec3::X,
            DVec3::new(f64::NAN, 0.0, 0.0),
            DVec3::Y,
            DVec3::new(0.0, f64::INFINITY, 0.0),
        ];
        assert_eq!(statistical_outlier_indices(&points, 2, DEFAULT_STD_RATIO), vec![0, 1, 3]);
    }

    #[test]
    fn test_lone_finite_point_kept() {
        let points = [DVec3::new(f64::NAN, 0.0, 0.0), DVec3::ONE];
        assert_eq!(statistical_outlier_indices(&points, 20, 1.0), vec![1]);
    }
}
