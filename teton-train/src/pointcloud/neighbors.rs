//! k-nearest-neighbour queries over point positions.

use glam::DVec3;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

// RTree entry remembering its index in the source slice
struct IndexedPoint {
    index: usize,
    position: [f64; 3],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Spatial index over a point slice.
pub(crate) struct NeighborIndex {
    tree: RTree<IndexedPoint>,
}

impl NeighborIndex {
    pub(crate) fn new(points: &[DVec3]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(index, p)| IndexedPoint {
                index,
                position: p.to_array(),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices of the `k` points closest to `query`, closest first.
    pub(crate) fn nearest(&self, query: DVec3, k: usize) -> Vec<usize> {
        self.tree
            .nearest_neighbor_iter(&query.to_array())
            .take(k)
            .map(|e| e.index)
            .collect()
    }

    /// Distances from point `index` to its `k` closest other points.
    pub(crate) fn neighbor_distances(&self, index: usize, position: DVec3, k: usize) -> Vec<f64> {
        let query = position.to_array();
        self.tree
            .nearest_neighbor_iter(&query)
            .filter(|e| e.index != index)
            .take(k)
            .map(|e| e.distance_2(&query).sqrt())
            .collect()
    }
}
