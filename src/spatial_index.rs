use geo::Coord;
use rstar::RTree;
use rstar::primitives::GeomWithData;

/// An indexed point carrying the id of the vertex (or feature) it was built from.
pub type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Nearest-neighbour / radius index over 2D points.
///
/// Backed by an R*-tree; bulk loading is O(n log n) and removals are applied
/// in place, so queries after a removal never see the removed point.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    pub fn build(points: impl IntoIterator<Item = (Coord, usize)>) -> Self {
        let elements: Vec<IndexedPoint> = points
            .into_iter()
            .map(|(c, id)| GeomWithData::new([c.x, c.y], id))
            .collect();
        Self {
            tree: RTree::bulk_load(elements),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Up to `k` points ordered nearest first.
    pub fn nearest_k(&self, query: Coord, k: usize) -> Vec<(Coord, usize)> {
        self.tree
            .nearest_neighbor_iter(&[query.x, query.y])
            .take(k)
            .map(to_pair)
            .collect()
    }

    /// Every point whose squared distance to `query` is at most `radius_squared`.
    pub fn within_radius(&self, query: Coord, radius_squared: f64) -> Vec<(Coord, usize)> {
        self.tree
            .locate_within_distance([query.x, query.y], radius_squared)
            .map(to_pair)
            .collect()
    }

    /// Removing a point that is not indexed is a no-op.
    pub fn remove(&mut self, point: Coord, id: usize) -> bool {
        self.tree
            .remove(&GeomWithData::new([point.x, point.y], id))
            .is_some()
    }
}

fn to_pair(p: &IndexedPoint) -> (Coord, usize) {
    let [x, y] = *p.geom();
    (Coord { x, y }, p.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialIndex {
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                pts.push((
                    Coord {
                        x: i as f64,
                        y: j as f64,
                    },
                    i * 5 + j,
                ));
            }
        }
        SpatialIndex::build(pts)
    }

    #[test]
    fn test_nearest_k_orders_by_distance() {
        let index = grid();
        let found = index.nearest_k(Coord { x: 0.1, y: 0.0 }, 3);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].1, 0);
        // (0,1) and (1,0) tie in distance order after the origin
        let rest: Vec<usize> = found[1..].iter().map(|p| p.1).collect();
        assert!(rest.contains(&5));
        assert!(rest.contains(&1));
    }

    #[test]
    fn test_nearest_k_returns_what_is_available() {
        let index = SpatialIndex::build(vec![(Coord { x: 0.0, y: 0.0 }, 7)]);
        assert_eq!(index.nearest_k(Coord { x: 1.0, y: 1.0 }, 4).len(), 1);
        let empty = SpatialIndex::build(Vec::new());
        assert!(empty.nearest_k(Coord { x: 1.0, y: 1.0 }, 4).is_empty());
    }

    #[test]
    fn test_within_radius() {
        let index = grid();
        let found = index.within_radius(Coord { x: 2.0, y: 2.0 }, 1.0);
        assert_eq!(found.len(), 5);
        let none = index.within_radius(Coord { x: 100.0, y: 100.0 }, 1.0);
        assert!(none.is_empty());
        let exact = index.within_radius(Coord { x: 3.0, y: 3.0 }, 0.0);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].1, 18);
    }

    #[test]
    fn test_remove_excludes_point() {
        let mut index = grid();
        let origin = Coord { x: 0.0, y: 0.0 };
        assert!(index.remove(origin, 0));
        assert!(!index.remove(origin, 0));
        assert_eq!(index.len(), 24);
        let found = index.nearest_k(origin, 24);
        assert!(found.iter().all(|p| p.1 != 0));
        // removing an unknown point is not an error
        assert!(!index.remove(Coord { x: 9.0, y: 9.0 }, 99));
    }
}
