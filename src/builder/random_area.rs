// Named areas for random graphs.
//
// Each named area is a bounding box in EPSG:4326 that gets transformed into
// the CRS of the graph before vertices are drawn from it.

use crate::error::{GraphError, Result};
use crate::sources::CoordinateTransform;
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const AREA_CRS: &str = "EPSG:4326";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum RandomArea {
    #[default]
    Germany,
    France,
    Osnabrueck,
    UnitedStates,
    Rome,
    Australia,
    /// Rectangle given directly in the graph CRS
    Custom {
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    },
}

pub struct AreaConfig {
    pub name: &'static str,
    pub display_name: &'static str,
    /// (min_lon, min_lat, max_lon, max_lat)
    pub bbox: (f64, f64, f64, f64),
}

impl RandomArea {
    /// All named areas
    pub const NAMED: &'static [RandomArea] = &[
        RandomArea::Germany,
        RandomArea::France,
        RandomArea::Osnabrueck,
        RandomArea::UnitedStates,
        RandomArea::Rome,
        RandomArea::Australia,
    ];

    /// `None` for a custom rectangle.
    pub fn config(&self) -> Option<AreaConfig> {
        Some(match self {
            RandomArea::Germany => AreaConfig {
                name: "germany",
                display_name: "Germany",
                bbox: (6.803, 47.420, 13.480, 55.000),
            },
            RandomArea::France => AreaConfig {
                name: "france",
                display_name: "France",
                bbox: (-3.163, 43.830, 6.426, 50.055),
            },
            RandomArea::Osnabrueck => AreaConfig {
                name: "osnabrueck",
                display_name: "Osnabrueck",
                bbox: (8.01050, 52.24311, 8.09776, 52.30802),
            },
            RandomArea::UnitedStates => AreaConfig {
                name: "united-states",
                display_name: "United States",
                // contiguous states without the far north-west and south
                bbox: (-122.892, 33.725, -74.157, 46.052),
            },
            RandomArea::Rome => AreaConfig {
                name: "rome",
                display_name: "Rome",
                bbox: (12.40009, 41.83013, 12.57946, 41.97905),
            },
            RandomArea::Australia => AreaConfig {
                name: "australia",
                display_name: "Australia",
                bbox: (115.157, -37.211, 150.167, -14.210),
            },
            RandomArea::Custom { .. } => return None,
        })
    }

    /// Human readable name for logs.
    pub fn label(&self) -> String {
        match self.config() {
            Some(config) => config.display_name.to_string(),
            None => format!("custom area {self}"),
        }
    }

    /// Extent of the area in `crs`. Fails for empty or non-finite bounds.
    pub fn extent(&self, transform: &dyn CoordinateTransform, crs: &str) -> Result<Rect> {
        let rect = self.raw_extent(transform, crs)?;
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(GraphError::config(format!(
                "{} has non-finite bounds in {crs}",
                self.label()
            )));
        }
        Ok(rect)
    }

    fn raw_extent(&self, transform: &dyn CoordinateTransform, crs: &str) -> Result<Rect> {
        match (self, self.config()) {
            (
                RandomArea::Custom {
                    x_min,
                    y_min,
                    x_max,
                    y_max,
                },
                _,
            ) => {
                if ![x_min, y_min, x_max, y_max].iter().all(|v| v.is_finite()) {
                    return Err(GraphError::config(format!(
                        "custom area ({x_min}, {y_min}, {x_max}, {y_max}) has non-finite bounds"
                    )));
                }
                if x_min >= x_max || y_min >= y_max {
                    return Err(GraphError::config(format!(
                        "custom area ({x_min}, {y_min}, {x_max}, {y_max}) is empty"
                    )));
                }
                Ok(Rect::new(
                    Coord { x: *x_min, y: *y_min },
                    Coord { x: *x_max, y: *y_max },
                ))
            }
            (_, Some(config)) => {
                let (min_x, min_y, max_x, max_y) = config.bbox;
                let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
                transform.transform_rect(rect, AREA_CRS, crs)
            }
            (_, None) => Err(GraphError::config("area has no extent")),
        }
    }
}

impl FromStr for RandomArea {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(' ', "-").as_str() {
            "germany" | "de" => Ok(RandomArea::Germany),
            "france" | "fr" => Ok(RandomArea::France),
            "osnabrueck" | "osnabrück" => Ok(RandomArea::Osnabrueck),
            "united-states" | "unitedstates" | "us" | "usa" => Ok(RandomArea::UnitedStates),
            "rome" => Ok(RandomArea::Rome),
            "australia" | "au" => Ok(RandomArea::Australia),
            other => {
                // x_min,y_min,x_max,y_max
                let parts: Vec<f64> = other
                    .split(',')
                    .map(|p| p.trim().parse::<f64>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| {
                        format!(
                            "Unknown area: '{s}'. Valid options: germany, france, osnabrueck, united-states, rome, australia or x_min,y_min,x_max,y_max"
                        )
                    })?;
                match parts.as_slice() {
                    [x_min, y_min, x_max, y_max] => Ok(RandomArea::Custom {
                        x_min: *x_min,
                        y_min: *y_min,
                        x_max: *x_max,
                        y_max: *y_max,
                    }),
                    _ => Err(format!("Custom area '{s}' needs four numbers")),
                }
            }
        }
    }
}

impl std::fmt::Display for RandomArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RandomArea::Custom {
                x_min,
                y_min,
                x_max,
                y_max,
            } => write!(f, "{x_min},{y_min},{x_max},{y_max}"),
            named => match named.config() {
                Some(config) => write!(f, "{}", config.name),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::WebMercatorTransform;

    #[test]
    fn test_parse_and_display() {
        for area in RandomArea::NAMED {
            assert_eq!(area.to_string().parse::<RandomArea>(), Ok(*area));
        }
        assert_eq!("United States".parse::<RandomArea>(), Ok(RandomArea::UnitedStates));
        let custom: RandomArea = "0,0,10,5".parse().unwrap();
        assert_eq!(
            custom,
            RandomArea::Custom {
                x_min: 0.0,
                y_min: 0.0,
                x_max: 10.0,
                y_max: 5.0
            }
        );
        assert!("atlantis".parse::<RandomArea>().is_err());
    }

    #[test]
    fn test_extent_in_target_crs() {
        let t = WebMercatorTransform;
        let degrees = RandomArea::Rome.extent(&t, "EPSG:4326").unwrap();
        assert_eq!(degrees.min().x, 12.40009);

        let meters = RandomArea::Rome.extent(&t, "EPSG:3857").unwrap();
        assert!(meters.min().x > 1_380_000.0 && meters.max().x < 1_401_000.0);

        let custom = RandomArea::Custom {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 10.0,
            y_max: 5.0,
        };
        assert_eq!(custom.extent(&t, "EPSG:3857").unwrap().width(), 10.0);
        assert!(
            RandomArea::Custom {
                x_min: 1.0,
                y_min: 0.0,
                x_max: 1.0,
                y_max: 5.0
            }
            .extent(&t, "EPSG:3857")
            .is_err()
        );
    }

    #[test]
    fn test_non_finite_bounds_are_rejected() {
        let t = WebMercatorTransform;
        for (x_min, x_max) in [(f64::NAN, 10.0), (0.0, f64::INFINITY), (f64::NEG_INFINITY, 1.0)] {
            let area = RandomArea::Custom {
                x_min,
                y_min: 0.0,
                x_max,
                y_max: 5.0,
            };
            let err = area.extent(&t, "EPSG:3857").unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        }
        let parsed: RandomArea = "NaN,0,10,5".parse().unwrap();
        assert!(parsed.extent(&t, "EPSG:3857").is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(RandomArea::UnitedStates.label(), "United States");
        let custom = RandomArea::Custom {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 10.0,
            y_max: 5.0,
        };
        assert_eq!(custom.label(), "custom area 0,0,10,5");
    }
}
