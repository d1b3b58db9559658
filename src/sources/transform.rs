// ===========================================================================
// Coordinate transforms between EPSG:4326 and Web Mercator (EPSG:3857)
// ===========================================================================
use crate::error::{GraphError, Result};
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS: f64 = 6378137.0;

/// Meters per degree along the equator of the Web Mercator sphere.
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_58;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Feet,
    Yards,
    Miles,
    NauticalMiles,
    Degrees,
}

impl DistanceUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1000.0,
            DistanceUnit::Feet => 0.3048,
            DistanceUnit::Yards => 0.9144,
            DistanceUnit::Miles => 1609.344,
            DistanceUnit::NauticalMiles => 1852.0,
            DistanceUnit::Degrees => METERS_PER_DEGREE,
        }
    }
}

/// Converts points, extents and distances between reference systems.
pub trait CoordinateTransform {
    fn transform(&self, coord: Coord, from_crs: &str, to_crs: &str) -> Result<Coord>;

    /// Native unit of a reference system's coordinates.
    fn native_unit(&self, crs: &str) -> Result<DistanceUnit>;

    fn transform_rect(&self, rect: Rect, from_crs: &str, to_crs: &str) -> Result<Rect> {
        let min = self.transform(rect.min(), from_crs, to_crs)?;
        let max = self.transform(rect.max(), from_crs, to_crs)?;
        Ok(Rect::new(min, max))
    }

    /// Expresses `value` given in `unit` in the native unit of `crs`.
    fn convert_distance(&self, value: f64, unit: DistanceUnit, crs: &str) -> Result<f64> {
        let native = self.native_unit(crs)?;
        Ok(value * unit.meters_per_unit() / native.meters_per_unit())
    }
}

/// Handles EPSG:4326 <-> EPSG:3857 and identity transforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercatorTransform;

/// Convert lat/lng (EPSG:4326) to Web Mercator (EPSG:3857).
/// Input: (longitude, latitude) in degrees, output in meters
pub fn lat_lng_to_web_merc(coord: Coord) -> Coord {
    Coord {
        x: EARTH_RADIUS * coord.x.to_radians(),
        y: EARTH_RADIUS * ((std::f64::consts::FRAC_PI_4 + coord.y.to_radians() / 2.0).tan()).ln(),
    }
}

/// Convert Web Mercator (EPSG:3857) to lat/lng (EPSG:4326).
pub fn web_merc_to_lat_lng(coord: Coord) -> Coord {
    Coord {
        x: (coord.x / EARTH_RADIUS).to_degrees(),
        y: (2.0 * (coord.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
    }
}

fn normalize(crs: &str) -> String {
    let upper = crs.trim().to_uppercase();
    match upper.as_str() {
        "WGS84" | "CRS84" | "OGC:CRS84" => "EPSG:4326".to_string(),
        "EPSG:900913" | "EPSG:102100" => "EPSG:3857".to_string(),
        _ => upper,
    }
}

impl CoordinateTransform for WebMercatorTransform {
    fn transform(&self, coord: Coord, from_crs: &str, to_crs: &str) -> Result<Coord> {
        let from = normalize(from_crs);
        let to = normalize(to_crs);
        if from == to {
            return Ok(coord);
        }
        match (from.as_str(), to.as_str()) {
            ("EPSG:4326", "EPSG:3857") => Ok(lat_lng_to_web_merc(coord)),
            ("EPSG:3857", "EPSG:4326") => Ok(web_merc_to_lat_lng(coord)),
            _ => Err(GraphError::collaborator(
                "coordinate transform",
                format!("no transform from {from_crs} to {to_crs}"),
            )),
        }
    }

    fn native_unit(&self, crs: &str) -> Result<DistanceUnit> {
        let crs = normalize(crs);
        let code = crs
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok());
        match code {
            Some(4326) | Some(4258) | Some(4269) => Ok(DistanceUnit::Degrees),
            Some(3857) => Ok(DistanceUnit::Meters),
            // UTM zones on WGS84 and ETRS89
            Some(32601..=32660) | Some(32701..=32760) | Some(25828..=25838) => {
                Ok(DistanceUnit::Meters)
            }
            _ => Err(GraphError::collaborator(
                "coordinate transform",
                format!("unknown map unit for {crs}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_mercator_round_trip() {
        let t = WebMercatorTransform;
        let osnabrueck = Coord { x: 8.047, y: 52.279 };
        let merc = t.transform(osnabrueck, "EPSG:4326", "EPSG:3857").unwrap();
        assert!((merc.x - 895_800.0).abs() < 1000.0);
        let back = t.transform(merc, "EPSG:3857", "epsg:4326").unwrap();
        assert!((back.x - osnabrueck.x).abs() < 1e-9);
        assert!((back.y - osnabrueck.y).abs() < 1e-9);
        assert!(t.transform(osnabrueck, "EPSG:4326", "EPSG:2056").is_err());
    }

    #[test]
    fn test_convert_distance() {
        let t = WebMercatorTransform;
        assert_eq!(
            t.convert_distance(2.0, DistanceUnit::Kilometers, "EPSG:3857").unwrap(),
            2000.0
        );
        let deg = t
            .convert_distance(METERS_PER_DEGREE, DistanceUnit::Meters, "EPSG:4326")
            .unwrap();
        assert!((deg - 1.0).abs() < 1e-12);
        assert!(t.convert_distance(1.0, DistanceUnit::Meters, "EPSG:99999").is_err());
    }
}
