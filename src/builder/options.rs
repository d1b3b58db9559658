use super::random_area::RandomArea;
use crate::connection::ConnectionPolicy;
use crate::error::{GraphError, Result};
use crate::geometry::Ellipsoid;
use crate::graph::{DistanceStrategy, EdgeDirection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named cost formula; its costs end up in a slot of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostFunction {
    pub name: String,
    pub formula: String,
}

/// Vertices drawn uniformly from an area instead of read from a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomOptions {
    pub count: usize,
    #[serde(default)]
    pub area: RandomArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BuildOptions {
    pub distance_strategy: DistanceStrategy,
    pub edge_direction: EdgeDirection,
    pub connection: ConnectionPolicy,
    /// Name of the ellipsoid used by `ellipsoidal` distances
    pub ellipsoid: String,
    /// CRS of random graphs. Layer input keeps the CRS of its layers.
    pub crs: Option<String>,
    pub random: Option<RandomOptions>,
    /// Seed for every random choice of the build
    pub seed: Option<u64>,
    pub cost_functions: Vec<CostFunction>,
    /// Also evaluate each cost function per vertex
    pub vertex_costs: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            distance_strategy: DistanceStrategy::default(),
            edge_direction: EdgeDirection::default(),
            connection: ConnectionPolicy::default(),
            ellipsoid: "WGS84".to_string(),
            crs: None,
            random: None,
            seed: None,
            cost_functions: Vec::new(),
            vertex_costs: false,
        }
    }
}

impl BuildOptions {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GraphError::config(format!("invalid options: {e}")))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| GraphError::config(format!("invalid options: {e}")))
    }

    /// Reads `.ron` or `.json` options, picked by extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => Self::from_ron_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(GraphError::config(format!(
                "{} is neither .ron nor .json",
                path.display()
            ))),
        }
    }

    pub fn resolve_ellipsoid(&self) -> Result<Ellipsoid> {
        Ellipsoid::from_name(&self.ellipsoid)
            .ok_or_else(|| GraphError::config(format!("unknown ellipsoid '{}'", self.ellipsoid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_ron_options() {
        let options = BuildOptions::from_ron_str(
            r#"(
                distance_strategy: Advanced,
                edge_direction: Directed,
                connection: NearestNeighbor(k: 3, allow_double_edges: true),
                random: Some((count: 25, area: Rome)),
                seed: Some(42),
                cost_functions: [(name: "time", formula: "euclidean / 13.9")],
            )"#,
        )
        .unwrap();
        assert_eq!(options.distance_strategy, DistanceStrategy::Advanced);
        assert_eq!(
            options.connection,
            ConnectionPolicy::NearestNeighbor {
                k: 3,
                allow_double_edges: true
            }
        );
        assert_eq!(options.random.map(|r| r.area), Some(RandomArea::Rome));
        assert_eq!(options.ellipsoid, "WGS84");
        assert_eq!(options.cost_functions[0].name, "time");
    }

    #[test]
    fn test_json_options() {
        let options = BuildOptions::from_json_str(
            r#"{"connection": {"Cluster": {"count": 3, "mode": "Complete"}}, "vertex_costs": true}"#,
        )
        .unwrap();
        assert!(options.vertex_costs);
        assert_eq!(options.edge_direction, EdgeDirection::Undirected);
    }

    #[test]
    fn test_unknown_key_is_configuration_error() {
        let err = BuildOptions::from_json_str(r#"{"connection": "Complete", "colour": "red"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = BuildOptions::from_ron_str("(random: Some((count: 3, shape: Circle)))").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_ellipsoid_names() {
        let mut options = BuildOptions::default();
        assert_eq!(options.resolve_ellipsoid().unwrap(), Ellipsoid::WGS84);
        options.ellipsoid = "Hayford".into();
        assert!(options.resolve_ellipsoid().is_err());
    }
}
