//! Collaborator interfaces the engine consumes, plus in-memory implementations
//! used by the binary and the tests.

pub mod cluster;
pub mod polygon;
pub mod raster;
pub mod transform;

pub use cluster::{Clusterer, KMeansClusterer};
pub use polygon::{PolygonLayer, PolygonPredicate, SpatialPredicate};
pub use raster::{GridRaster, RasterSample, RasterSource};
pub use transform::{CoordinateTransform, DistanceUnit, WebMercatorTransform};

use crate::error::{GraphError, Result};
use crate::graph::FeatureId;
use ahash::AHashMap;
use geo::Geometry;
use geojson::GeoJson;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry) -> Option<GeometryKind> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryKind::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryKind::Line)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryKind::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl AttributeValue {
    /// Numeric reading of an attribute: null is 0, numeric text is parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Null => Some(0.0),
        }
    }
}

impl From<&serde_json::Value> for AttributeValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(AttributeValue::Number)
                .unwrap_or(AttributeValue::Null),
            serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
            other => AttributeValue::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    pub attributes: AHashMap<String, AttributeValue>,
}

impl Feature {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Enumerable point, line or polygon features with named attributes.
pub trait VectorFeatureSource {
    fn geometry_kind(&self) -> GeometryKind;

    /// Spatial reference identifier, e.g. `EPSG:4326`.
    fn crs(&self) -> &str;

    fn field_names(&self) -> Vec<String>;

    fn features(&self) -> Result<Vec<Feature>>;
}

/// Vector layer held in memory.
#[derive(Debug, Clone)]
pub struct MemoryLayer {
    kind: GeometryKind,
    crs: String,
    fields: Vec<String>,
    features: Vec<Feature>,
}

impl MemoryLayer {
    pub fn new(kind: GeometryKind, crs: impl Into<String>) -> Self {
        Self {
            kind,
            crs: crs.into(),
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Appends a feature with the next sequential id.
    pub fn push(
        &mut self,
        geometry: impl Into<Geometry>,
        attributes: Vec<(&str, AttributeValue)>,
    ) -> Result<FeatureId> {
        let geometry = geometry.into();
        if GeometryKind::of(&geometry) != Some(self.kind) {
            return Err(GraphError::config(format!(
                "feature geometry does not match a {:?} layer",
                self.kind
            )));
        }
        let id = self.features.len() as FeatureId;
        let mut map = AHashMap::new();
        for (name, value) in attributes {
            if !self.fields.iter().any(|f| f == name) {
                self.fields.push(name.to_string());
            }
            map.insert(name.to_string(), value);
        }
        self.features.push(Feature {
            id,
            geometry,
            attributes: map,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Reads a GeoJSON feature collection (or a single feature / geometry).
    ///
    /// All features must share one geometry kind. Numeric feature ids are kept,
    /// anything else is numbered by position.
    pub fn from_geojson(text: &str, crs: impl Into<String>) -> Result<Self> {
        let parsed: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| GraphError::config(format!("invalid GeoJSON: {e}")))?;

        let raw_features = match parsed {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(g) => vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
        };

        let mut kind = None;
        let mut fields: Vec<String> = Vec::new();
        let mut features = Vec::with_capacity(raw_features.len());

        for (position, raw) in raw_features.into_iter().enumerate() {
            let Some(raw_geometry) = raw.geometry else {
                continue;
            };
            let geometry: Geometry = Geometry::try_from(raw_geometry)
                .map_err(|e| GraphError::config(format!("unsupported geometry: {e}")))?;

            let this_kind = GeometryKind::of(&geometry)
                .ok_or_else(|| GraphError::config("geometry collections are not supported"))?;
            match kind {
                None => kind = Some(this_kind),
                Some(k) if k != this_kind => {
                    return Err(GraphError::config(format!(
                        "mixed geometry kinds in one layer: {k:?} and {this_kind:?}"
                    )));
                }
                Some(_) => {}
            }

            let id = match &raw.id {
                Some(geojson::feature::Id::Number(n)) => {
                    n.as_i64().unwrap_or(position as FeatureId)
                }
                _ => position as FeatureId,
            };

            let mut attributes = AHashMap::new();
            if let Some(properties) = &raw.properties {
                for (name, value) in properties {
                    if !fields.contains(name) {
                        fields.push(name.clone());
                    }
                    attributes.insert(name.clone(), AttributeValue::from(value));
                }
            }

            features.push(Feature {
                id,
                geometry,
                attributes,
            });
        }

        let kind = kind.ok_or_else(|| GraphError::config("GeoJSON input has no geometries"))?;
        Ok(Self {
            kind,
            crs: crs.into(),
            fields,
            features,
        })
    }
}

impl VectorFeatureSource for MemoryLayer {
    fn geometry_kind(&self) -> GeometryKind {
        self.kind
    }

    fn crs(&self) -> &str {
        &self.crs
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn features(&self) -> Result<Vec<Feature>> {
        Ok(self.features.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_attribute_numbers() {
        assert_eq!(AttributeValue::Number(2.5).as_number(), Some(2.5));
        assert_eq!(AttributeValue::Text(" 12 ".into()).as_number(), Some(12.0));
        assert_eq!(AttributeValue::Null.as_number(), Some(0.0));
        assert_eq!(AttributeValue::Text("fast".into()).as_number(), None);
    }

    #[test]
    fn test_memory_layer_rejects_wrong_kind() {
        let mut layer = MemoryLayer::new(GeometryKind::Line, "EPSG:4326");
        assert!(layer.push(point!(x: 1.0, y: 2.0), vec![]).is_err());
    }

    #[test]
    fn test_from_geojson() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 7, "properties": {"speed": 30, "name": "a"},
                 "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}},
                {"type": "Feature", "properties": {"speed": "50"},
                 "geometry": {"type": "LineString", "coordinates": [[1,1],[2,2]]}}
            ]
        }"#;
        let layer = MemoryLayer::from_geojson(text, "EPSG:4326").unwrap();
        assert_eq!(layer.geometry_kind(), GeometryKind::Line);
        assert_eq!(layer.field_names(), vec!["speed".to_string(), "name".to_string()]);
        let features = layer.features().unwrap();
        assert_eq!(features[0].id, 7);
        assert_eq!(features[1].id, 1);
        assert_eq!(features[1].attribute("speed").unwrap().as_number(), Some(50.0));
    }

    #[test]
    fn test_from_geojson_mixed_kinds() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "Point", "coordinates": [0,0]}},
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "LineString", "coordinates": [[1,1],[2,2]]}}
            ]
        }"#;
        assert!(MemoryLayer::from_geojson(text, "EPSG:4326").is_err());
    }
}
