//! Edge construction strategies. Each strategy adds edges to a graph whose
//! vertices already exist.

pub mod cluster;
pub mod complete;
pub mod line_topology;
pub mod nearest;
pub mod random;

use crate::builder::progress::{CancellationToken, ProgressReporter};
use crate::error::Result;
use crate::graph::{EdgeDirection, Graph};
use crate::sources::{Clusterer, CoordinateTransform, DistanceUnit, Feature};
use log::debug;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMode {
    Complete,
    NearestNeighbor { k: usize },
}

/// How vertices get connected. Exactly one policy applies per build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionPolicy {
    /// No edges for point input; line input keeps its own segments as edges.
    None,
    Complete,
    NearestNeighbor {
        k: usize,
        allow_double_edges: bool,
    },
    DistanceNeighbor {
        distance: f64,
        unit: DistanceUnit,
        allow_double_edges: bool,
    },
    Cluster {
        count: usize,
        mode: ClusterMode,
    },
    /// Points snapped onto a line network and joined along its topology.
    LineTopology {
        tolerance: f64,
        unit: DistanceUnit,
        degree_threshold: usize,
    },
    Random {
        count: usize,
    },
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        ConnectionPolicy::NearestNeighbor {
            k: 2,
            allow_double_edges: false,
        }
    }
}

impl ConnectionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionPolicy::None => "none",
            ConnectionPolicy::Complete => "complete",
            ConnectionPolicy::NearestNeighbor { .. } => "nearest neighbor",
            ConnectionPolicy::DistanceNeighbor { .. } => "distance neighbor",
            ConnectionPolicy::Cluster { .. } => "cluster",
            ConnectionPolicy::LineTopology { .. } => "line topology",
            ConnectionPolicy::Random { .. } => "random",
        }
    }
}

/// Everything a strategy needs besides the graph itself.
pub struct ConnectionContext<'a> {
    pub direction: EdgeDirection,
    pub rng: &'a mut StdRng,
    pub cancel: &'a CancellationToken,
    pub progress: &'a mut ProgressReporter,
    pub clusterer: &'a dyn Clusterer,
    pub transform: &'a dyn CoordinateTransform,
    /// CRS the vertex coordinates are expressed in
    pub crs: &'a str,
}

/// Runs `policy` over the vertices of `graph`.
///
/// `lines` is the line network for [`ConnectionPolicy::LineTopology`]. Returns
/// early without error when the token is canceled; callers check the token.
pub fn connect(
    graph: &mut Graph,
    policy: &ConnectionPolicy,
    ctx: &mut ConnectionContext<'_>,
    lines: Option<&[Feature]>,
) -> Result<()> {
    debug!(
        "connecting {} vertices with policy {}",
        graph.vertex_count(),
        policy.name()
    );
    match policy {
        ConnectionPolicy::None => Ok(()),
        ConnectionPolicy::Complete => complete::connect_complete(graph, ctx),
        ConnectionPolicy::NearestNeighbor {
            k,
            allow_double_edges,
        } => nearest::connect_nearest(graph, ctx, *k, *allow_double_edges),
        ConnectionPolicy::DistanceNeighbor {
            distance,
            unit,
            allow_double_edges,
        } => {
            let radius = ctx.transform.convert_distance(*distance, *unit, ctx.crs)?;
            nearest::connect_within_distance(graph, ctx, radius, *allow_double_edges)
        }
        ConnectionPolicy::Cluster { count, mode } => {
            cluster::connect_clusters(graph, ctx, *count, *mode)
        }
        ConnectionPolicy::LineTopology {
            tolerance,
            unit,
            degree_threshold,
        } => {
            let tolerance = ctx.transform.convert_distance(*tolerance, *unit, ctx.crs)?;
            line_topology::connect_along_lines(graph, ctx, lines, tolerance, *degree_threshold)
        }
        ConnectionPolicy::Random { count } => random::connect_random(graph, ctx, *count),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::sources::{KMeansClusterer, WebMercatorTransform};
    use geo::Coord;
    use rand::SeedableRng;

    pub struct Harness {
        pub rng: StdRng,
        pub cancel: CancellationToken,
        pub progress: ProgressReporter,
        pub clusterer: KMeansClusterer,
        pub transform: WebMercatorTransform,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                rng: StdRng::seed_from_u64(7),
                cancel: CancellationToken::new(),
                progress: ProgressReporter::silent(),
                clusterer: KMeansClusterer::default(),
                transform: WebMercatorTransform,
            }
        }

        pub fn ctx(&mut self, direction: EdgeDirection) -> ConnectionContext<'_> {
            ConnectionContext {
                direction,
                rng: &mut self.rng,
                cancel: &self.cancel,
                progress: &mut self.progress,
                clusterer: &self.clusterer,
                transform: &self.transform,
                crs: "EPSG:3857",
            }
        }
    }

    pub fn graph_of(points: &[(f64, f64)]) -> Graph {
        let mut graph = Graph::new();
        for (x, y) in points {
            graph.add_vertex(Coord { x: *x, y: *y }, None).unwrap();
        }
        graph
    }
}
