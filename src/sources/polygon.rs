use super::{GeometryKind, VectorFeatureSource};
use crate::error::{GraphError, Result};
use ahash::AHashSet;
use geo::{BoundingRect, Contains, Coord, Geometry, Intersects, Line, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialPredicate {
    /// Touches any polygon at all
    Intersects,
    /// Intersects a polygon without lying fully inside it
    Crosses,
    /// Fully contained in a polygon
    Within,
}

/// Tests candidate lines against a set of polygons.
pub trait PolygonPredicate {
    /// Ids of the candidates that satisfy `predicate` for any polygon.
    fn select(&self, predicate: SpatialPredicate, candidates: &[(i64, Line)]) -> Result<AHashSet<i64>>;

    fn contains_point(&self, point: Coord) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PolygonLayer {
    polygons: Vec<Polygon>,
    bounds: Vec<Rect>,
}

impl PolygonLayer {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        let bounds = polygons
            .iter()
            .map(|p| {
                p.bounding_rect()
                    .unwrap_or_else(|| Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }))
            })
            .collect();
        Self { polygons, bounds }
    }

    /// Fails when the source does not hold polygons.
    pub fn from_source(source: &dyn VectorFeatureSource) -> Result<Self> {
        if source.geometry_kind() != GeometryKind::Polygon {
            return Err(GraphError::config(format!(
                "expected a polygon layer, got {:?}",
                source.geometry_kind()
            )));
        }
        let mut polygons = Vec::new();
        for feature in source.features()? {
            match feature.geometry {
                Geometry::Polygon(p) => polygons.push(p),
                Geometry::MultiPolygon(MultiPolygon(parts)) => polygons.extend(parts),
                Geometry::Rect(r) => polygons.push(r.to_polygon()),
                Geometry::Triangle(t) => polygons.push(t.to_polygon()),
                _ => {}
            }
        }
        Ok(Self::new(polygons))
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    fn matches(&self, predicate: SpatialPredicate, line: &Line) -> bool {
        let line_bounds = line.bounding_rect();
        self.polygons
            .iter()
            .zip(self.bounds.iter())
            .filter(|(_, bounds)| bounds.intersects(&line_bounds))
            .any(|(polygon, _)| match predicate {
                SpatialPredicate::Intersects => polygon.intersects(line),
                SpatialPredicate::Crosses => polygon.intersects(line) && !polygon.contains(line),
                SpatialPredicate::Within => polygon.contains(line),
            })
    }
}

impl PolygonPredicate for PolygonLayer {
    fn select(&self, predicate: SpatialPredicate, candidates: &[(i64, Line)]) -> Result<AHashSet<i64>> {
        Ok(candidates
            .iter()
            .filter(|(_, line)| self.matches(predicate, line))
            .map(|(id, _)| *id)
            .collect())
    }

    fn contains_point(&self, point: Coord) -> Result<bool> {
        let point = Point::from(point);
        Ok(self.polygons.iter().any(|p| p.contains(&point)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemoryLayer;
    use geo::polygon;

    fn square() -> PolygonLayer {
        PolygonLayer::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]])
    }

    fn l(x1: f64, y1: f64, x2: f64, y2: f64) -> Line {
        Line::new(Coord { x: x1, y: y1 }, Coord { x: x2, y: y2 })
    }

    #[test]
    fn test_predicates() {
        let layer = square();
        let candidates = vec![
            (0, l(1.0, 1.0, 2.0, 2.0)),
            (1, l(5.0, 5.0, 15.0, 5.0)),
            (2, l(20.0, 20.0, 30.0, 30.0)),
        ];
        let inside = layer.select(SpatialPredicate::Within, &candidates).unwrap();
        let crosses = layer.select(SpatialPredicate::Crosses, &candidates).unwrap();
        let touches = layer.select(SpatialPredicate::Intersects, &candidates).unwrap();
        assert_eq!(inside, [0].into_iter().collect());
        assert_eq!(crosses, [1].into_iter().collect());
        assert_eq!(touches, [0, 1].into_iter().collect());
        assert!(layer.contains_point(Coord { x: 3.0, y: 3.0 }).unwrap());
        assert!(!layer.contains_point(Coord { x: 13.0, y: 3.0 }).unwrap());
    }

    #[test]
    fn test_from_source_requires_polygons() {
        let points = MemoryLayer::new(GeometryKind::Point, "EPSG:4326");
        assert!(PolygonLayer::from_source(&points).is_err());
    }
}
