use geo::{Coord, Distance, Euclidean, GeodesicMeasure, HaversineMeasure, Line, LineLocatePoint, Point};
use serde::{Deserialize, Serialize};

/// Fixed sphere radius used by the `geodesic` metric.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

const HAVERSINE: HaversineMeasure = HaversineMeasure::new(EARTH_RADIUS_METERS);

/// Reference ellipsoid for the `ellipsoidal` metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Equatorial radius in meters
    pub semi_major_axis: f64,
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        inverse_flattening: 298.257_223_563,
    };

    pub const GRS80: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        inverse_flattening: 298.257_222_101,
    };

    pub const BESSEL_1841: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_377_397.155,
        inverse_flattening: 299.152_812_8,
    };

    pub fn from_name(name: &str) -> Option<Ellipsoid> {
        match name.to_lowercase().as_str() {
            "wgs84" | "epsg:7030" => Some(Ellipsoid::WGS84),
            "grs80" | "epsg:7019" => Some(Ellipsoid::GRS80),
            "bessel1841" | "bessel" | "epsg:7004" => Some(Ellipsoid::BESSEL_1841),
            _ => None,
        }
    }

    pub fn flattening(&self) -> f64 {
        1.0 / self.inverse_flattening
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Ellipsoid::WGS84
    }
}

pub fn euclidean_distance(a: Coord, b: Coord) -> f64 {
    Euclidean.distance(Point::from(a), Point::from(b))
}

pub fn manhattan_distance(a: Coord, b: Coord) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

/// Great circle distance in meters, coordinates are (lon, lat) degrees.
pub fn haversine_distance(a: Coord, b: Coord) -> f64 {
    HAVERSINE.distance(Point::from(a), Point::from(b))
}

/// Karney geodesic in meters on the given ellipsoid, coordinates are (lon, lat) degrees.
pub fn ellipsoidal_distance(a: Coord, b: Coord, ellipsoid: &Ellipsoid) -> f64 {
    if *ellipsoid == Ellipsoid::WGS84 {
        return geo::Geodesic.distance(Point::from(a), Point::from(b));
    }
    let measure = GeodesicMeasure::new(ellipsoid.semi_major_axis, ellipsoid.flattening());
    measure.distance(Point::from(a), Point::from(b))
}

/// Projection of a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Position along the segment in [0, 1]
    pub fraction: f64,
    /// Distance from the segment start to the projected point
    pub distance_along: f64,
    /// Distance from the point to the segment
    pub distance_to: f64,
}

pub fn project_onto_segment(point: Coord, segment: &Line) -> SegmentProjection {
    let fraction = segment
        .line_locate_point(&Point::from(point))
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let projected = Coord {
        x: segment.start.x + fraction * segment.dx(),
        y: segment.start.y + fraction * segment.dy(),
    };
    SegmentProjection {
        fraction,
        distance_along: euclidean_distance(segment.start, projected),
        distance_to: euclidean_distance(point, projected),
    }
}

pub fn midpoint(segment: &Line) -> Coord {
    Coord {
        x: (segment.start.x + segment.end.x) / 2.0,
        y: (segment.start.y + segment.end.y) / 2.0,
    }
}
