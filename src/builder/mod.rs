// ===========================================================================
// Graph build orchestration
//
// Idle -> VerticesBuilt -> EdgesBuilt -> [PolygonsFiltered] -> [CostsAssigned]
// -> Done, with Canceled reachable from every non-terminal state.
// ===========================================================================
pub mod options;
pub mod progress;
pub mod random_area;

#[cfg(test)]
mod builder_tests;

use crate::connection::line_topology::explode_lines;
use crate::connection::{self, ConnectionContext, ConnectionPolicy};
use crate::cost::{CostEngine, CostSources, RasterInput, SyntaxReport};
use crate::error::{GraphError, Result};
use crate::graph::{DistanceStrategy, EdgeDirection, EdgeId, FeatureId, Graph, VertexId};
use crate::sources::{
    Clusterer, CoordinateTransform, Feature, GeometryKind, KMeansClusterer, PolygonLayer,
    PolygonPredicate, RasterSource, SpatialPredicate, VectorFeatureSource, WebMercatorTransform,
};
use crate::spatial_index::SpatialIndex;
use ahash::{AHashMap, AHashSet};
use geo::{Coord, Geometry, Line};
use log::{debug, info, warn};
use options::{BuildOptions, CostFunction};
use ordered_float::OrderedFloat;
use progress::{CancellationToken, Phase, ProgressReporter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_RANDOM_CRS: &str = "EPSG:4326";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    VerticesBuilt,
    EdgesBuilt,
    PolygonsFiltered,
    CostsAssigned,
    Done,
    Canceled,
}

/// Either a finished graph or a cancellation. Cancellation is not an error.
#[derive(Debug)]
pub enum BuildOutcome {
    Built(Graph),
    Canceled,
}

impl BuildOutcome {
    pub fn graph(self) -> Option<Graph> {
        match self {
            BuildOutcome::Built(graph) => Some(graph),
            BuildOutcome::Canceled => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, BuildOutcome::Canceled)
    }
}

struct StateLog {
    state: BuildState,
}

impl StateLog {
    fn advance(&mut self, next: BuildState) {
        debug!("build state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn cancel(&mut self) -> Result<BuildOutcome> {
        info!("build canceled in state {:?}", self.state);
        self.advance(BuildState::Canceled);
        Ok(BuildOutcome::Canceled)
    }
}

/// Turns layers, rasters and options into a weighted [`Graph`].
pub struct GraphBuilder<'a> {
    options: BuildOptions,
    points: Option<&'a dyn VectorFeatureSource>,
    lines: Option<&'a dyn VectorFeatureSource>,
    additional_points: Option<&'a dyn VectorFeatureSource>,
    rasters: Vec<RasterInput<'a>>,
    cost_polygons: Vec<PolygonLayer>,
    forbidden_areas: Vec<PolygonLayer>,
    clusterer: Box<dyn Clusterer + 'a>,
    transform: Box<dyn CoordinateTransform + 'a>,
    state: BuildState,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            points: None,
            lines: None,
            additional_points: None,
            rasters: Vec::new(),
            cost_polygons: Vec::new(),
            forbidden_areas: Vec::new(),
            clusterer: Box::new(KMeansClusterer::default()),
            transform: Box::new(WebMercatorTransform),
            state: BuildState::Idle,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn set_points(&mut self, source: &'a dyn VectorFeatureSource) -> Result<()> {
        if source.geometry_kind() != GeometryKind::Point {
            return Err(GraphError::config(format!(
                "point input must be a point layer, got {:?}",
                source.geometry_kind()
            )));
        }
        self.points = Some(source);
        Ok(())
    }

    pub fn set_lines(&mut self, source: &'a dyn VectorFeatureSource) -> Result<()> {
        if source.geometry_kind() != GeometryKind::Line {
            return Err(GraphError::config(format!(
                "line input must be a line layer, got {:?}",
                source.geometry_kind()
            )));
        }
        self.lines = Some(source);
        Ok(())
    }

    /// Extra points for a line-derived graph. Each becomes a vertex joined
    /// to its nearest line vertex.
    pub fn set_additional_points(&mut self, source: &'a dyn VectorFeatureSource) -> Result<()> {
        if source.geometry_kind() != GeometryKind::Point {
            return Err(GraphError::config(format!(
                "additional points must be a point layer, got {:?}",
                source.geometry_kind()
            )));
        }
        self.additional_points = Some(source);
        Ok(())
    }

    /// Registers a raster band as `raster[i]` and returns `i`.
    pub fn add_raster(&mut self, source: &'a dyn RasterSource, band: usize) -> Result<usize> {
        if band >= source.band_count() {
            return Err(GraphError::config(format!(
                "raster '{}' has no band {band}",
                source.name()
            )));
        }
        self.rasters.push(RasterInput { source, band });
        Ok(self.rasters.len() - 1)
    }

    /// Registers a polygon layer as `polygon[i]` and returns `i`.
    pub fn add_polygon_layer(&mut self, source: &dyn VectorFeatureSource) -> Result<usize> {
        self.cost_polygons.push(PolygonLayer::from_source(source)?);
        Ok(self.cost_polygons.len() - 1)
    }

    /// Edges touching any polygon of `source` are dropped from the graph.
    pub fn add_forbidden_area(&mut self, source: &dyn VectorFeatureSource) -> Result<()> {
        self.forbidden_areas.push(PolygonLayer::from_source(source)?);
        Ok(())
    }

    pub fn set_clusterer(&mut self, clusterer: Box<dyn Clusterer + 'a>) {
        self.clusterer = clusterer;
    }

    pub fn set_transform(&mut self, transform: Box<dyn CoordinateTransform + 'a>) {
        self.transform = transform;
    }

    fn field_names(&self) -> AHashSet<String> {
        self.points
            .iter()
            .chain(self.lines.iter())
            .chain(self.additional_points.iter())
            .flat_map(|source| source.field_names())
            .collect()
    }

    /// Engine used for syntax checks only; it sees no features.
    fn checking_engine(&self) -> CostEngine<'_> {
        CostEngine::new(CostSources {
            rasters: self.rasters.clone(),
            polygons: self
                .cost_polygons
                .iter()
                .map(|p| p as &dyn PolygonPredicate)
                .collect(),
            fields: self.field_names(),
            ..Default::default()
        })
    }

    pub fn check_formula(&self, formula: &str) -> SyntaxReport {
        self.checking_engine().check(formula)
    }

    /// Adds a cost function after checking it against the current inputs.
    pub fn add_cost_function(&mut self, name: &str, formula: &str) -> Result<usize> {
        let index = self.options.cost_functions.len();
        self.checking_engine().compile(index, name, formula)?;
        self.options.cost_functions.push(CostFunction {
            name: name.to_string(),
            formula: formula.to_string(),
        });
        Ok(index)
    }

    /// CRS of the graph: the layer CRS for layer input, else `options.crs`.
    fn graph_crs(&self) -> Result<String> {
        let layer_crs = match (self.points, self.lines) {
            (Some(points), Some(lines)) if points.crs() != lines.crs() => {
                return Err(GraphError::config(format!(
                    "point layer is in {} but line layer is in {}",
                    points.crs(),
                    lines.crs()
                )));
            }
            (Some(source), _) | (None, Some(source)) => Some(source.crs().to_string()),
            (None, None) => None,
        };
        match (layer_crs, &self.options.crs) {
            (Some(layer), Some(requested)) if &layer != requested => Err(GraphError::config(
                format!("input layers are in {layer}, not {requested}"),
            )),
            (Some(layer), _) => Ok(layer),
            (None, Some(requested)) => Ok(requested.clone()),
            (None, None) => Ok(DEFAULT_RANDOM_CRS.to_string()),
        }
    }

    /// Every check that can fail before build work starts.
    pub fn validate(&self) -> Result<()> {
        let options = &self.options;
        options.resolve_ellipsoid()?;
        self.graph_crs()?;

        if options.random.is_none() && self.points.is_none() && self.lines.is_none() {
            return Err(GraphError::config(
                "no vertex source: configure random vertices, a point layer or a line layer",
            ));
        }
        if let Some(random) = &options.random {
            if self.points.is_some() {
                return Err(GraphError::config(
                    "random vertices and a point layer cannot be combined",
                ));
            }
            random.area.extent(self.transform.as_ref(), &self.graph_crs()?)?;
        }
        if let Some(additional) = self.additional_points {
            if self.lines.is_none() || self.points.is_some() || options.random.is_some() {
                return Err(GraphError::config(
                    "additional points only extend a graph built from a line layer",
                ));
            }
            let crs = self.graph_crs()?;
            if additional.crs() != crs {
                return Err(GraphError::config(format!(
                    "additional points are in {}, not {crs}",
                    additional.crs()
                )));
            }
        }

        match &options.connection {
            ConnectionPolicy::LineTopology { .. } => {
                if self.lines.is_none() {
                    return Err(GraphError::config(
                        "line topology connections need a line layer",
                    ));
                }
                if self.points.is_none() && options.random.is_none() {
                    return Err(GraphError::config(
                        "line topology connections need points to snap onto the lines",
                    ));
                }
            }
            ConnectionPolicy::Cluster { count: 0, .. } => {
                return Err(GraphError::config("cluster count must be at least 1"));
            }
            ConnectionPolicy::DistanceNeighbor { distance, .. } if *distance < 0.0 => {
                return Err(GraphError::config("neighbour distance must not be negative"));
            }
            _ => {}
        }

        if options.distance_strategy == DistanceStrategy::Advanced {
            if options.cost_functions.is_empty() {
                return Err(GraphError::config(
                    "the advanced distance strategy needs at least one cost function",
                ));
            }
            let engine = self.checking_engine();
            for (index, function) in options.cost_functions.iter().enumerate() {
                engine.compile(index, &function.name, &function.formula)?;
            }
        } else if !options.cost_functions.is_empty() {
            warn!(
                "{} cost function(s) ignored under the {:?} strategy",
                options.cost_functions.len(),
                options.distance_strategy
            );
        }
        Ok(())
    }

    /// Runs the whole build. Progress reaches 100 only when a graph is returned.
    pub fn build(
        &mut self,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
    ) -> Result<BuildOutcome> {
        let mut log = StateLog {
            state: BuildState::Idle,
        };
        let outcome = self.run(cancel, progress, &mut log);
        self.state = log.state;
        outcome
    }

    fn run(
        &self,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
        log: &mut StateLog,
    ) -> Result<BuildOutcome> {
        self.validate()?;
        let options = &self.options;
        let crs = self.graph_crs()?;
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut graph = Graph::new();
        graph.set_distance_strategy(options.distance_strategy);
        graph.set_edge_direction(options.edge_direction);
        graph.set_ellipsoid(options.resolve_ellipsoid()?);
        graph.set_crs(crs.clone());

        let point_features = match self.points {
            Some(source) => source.features()?,
            None => Vec::new(),
        };
        let line_features = match self.lines {
            Some(source) => source.features()?,
            None => Vec::new(),
        };
        let additional_features = match self.additional_points {
            Some(source) => source.features()?,
            None => Vec::new(),
        };

        // vertices
        let line_derived = options.random.is_none() && self.points.is_none();
        if let Some(random) = &options.random {
            let extent = random.area.extent(self.transform.as_ref(), &crs)?;
            info!(
                "drawing {} random vertices in {}",
                random.count,
                random.area.label()
            );
            for i in 0..random.count {
                if cancel.is_canceled() {
                    return log.cancel();
                }
                progress.step(Phase::Vertices, i, random.count);
                let coord = Coord {
                    x: rng.random_range(extent.min().x..extent.max().x),
                    y: rng.random_range(extent.min().y..extent.max().y),
                };
                graph.add_vertex(coord, None)?;
            }
        } else if self.points.is_some() {
            add_point_vertices(&mut graph, &point_features, cancel, progress)?;
        } else {
            add_line_vertices(
                &mut graph,
                &line_features,
                options.connection == ConnectionPolicy::None,
                cancel,
                progress,
            )?;
            add_extra_points(
                &mut graph,
                &additional_features,
                options.connection == ConnectionPolicy::None,
                cancel,
            )?;
        }
        if cancel.is_canceled() {
            return log.cancel();
        }
        progress.complete_phase(Phase::Vertices);
        info!("{} vertices built", graph.vertex_count());
        log.advance(BuildState::VerticesBuilt);

        // edges
        if !(line_derived && options.connection == ConnectionPolicy::None) {
            let mut ctx = ConnectionContext {
                direction: options.edge_direction,
                rng: &mut rng,
                cancel,
                progress: &mut *progress,
                clusterer: self.clusterer.as_ref(),
                transform: self.transform.as_ref(),
                crs: &crs,
            };
            let lines = self.lines.map(|_| line_features.as_slice());
            connection::connect(&mut graph, &options.connection, &mut ctx, lines)?;
        }
        if cancel.is_canceled() {
            return log.cancel();
        }
        if options.edge_direction == EdgeDirection::Undirected {
            let added = graph.add_reverse_edges()?;
            debug!("added {added} reverse edges");
        }
        progress.complete_phase(Phase::Edges);
        info!("{} edges built", graph.edge_count());
        log.advance(BuildState::EdgesBuilt);

        // forbidden areas
        if !self.forbidden_areas.is_empty() {
            let candidates: Vec<(EdgeId, Line)> = graph
                .edges()
                .map(|e| graph.edge_line(e.id).map(|line| (e.id, line)))
                .collect::<Result<_>>()?;
            let mut removed: AHashSet<EdgeId> = AHashSet::new();
            for (i, layer) in self.forbidden_areas.iter().enumerate() {
                if cancel.is_canceled() {
                    return log.cancel();
                }
                progress.step(Phase::Polygons, i, self.forbidden_areas.len());
                removed.extend(layer.select(SpatialPredicate::Intersects, &candidates)?);
            }
            graph = graph.rebuilt_without_edges(&removed)?;
            info!(
                "{} edges removed by forbidden areas, {} remain",
                removed.len(),
                graph.edge_count()
            );
            progress.complete_phase(Phase::Polygons);
            log.advance(BuildState::PolygonsFiltered);
        }

        // costs
        if options.distance_strategy == DistanceStrategy::Advanced {
            let mut engine = CostEngine::new(CostSources {
                rasters: self.rasters.clone(),
                polygons: self
                    .cost_polygons
                    .iter()
                    .map(|p| p as &dyn PolygonPredicate)
                    .collect(),
                line_features: by_id(line_features),
                point_features: by_id(point_features.into_iter().chain(additional_features).collect()),
                fields: self.field_names(),
            });
            let count = options.cost_functions.len();
            for (index, function) in options.cost_functions.iter().enumerate() {
                if cancel.is_canceled() {
                    return log.cancel();
                }
                let formula = engine.compile(index, &function.name, &function.formula)?;
                let Some(costs) = engine.evaluate_edges(
                    &graph,
                    &formula,
                    &mut rng,
                    cancel,
                    progress,
                    (index, count),
                )?
                else {
                    return log.cancel();
                };
                graph.add_edge_cost_slot(&function.name, costs)?;

                if options.vertex_costs {
                    let Some(costs) =
                        engine.evaluate_vertices(&graph, &formula, &mut rng, cancel)?
                    else {
                        return log.cancel();
                    };
                    graph.add_vertex_cost_slot(&function.name, costs)?;
                }
                info!("cost function '{}' evaluated", function.name);
            }
            debug!("{} raster path searches", engine.path_searches());
            log.advance(BuildState::CostsAssigned);
        }

        if cancel.is_canceled() {
            return log.cancel();
        }
        progress.finish();
        log.advance(BuildState::Done);
        Ok(BuildOutcome::Built(graph))
    }
}

fn by_id(features: Vec<Feature>) -> AHashMap<FeatureId, Feature> {
    features.into_iter().map(|f| (f.id, f)).collect()
}

fn point_coords(feature: &Feature) -> Vec<Coord> {
    match &feature.geometry {
        Geometry::Point(p) => vec![p.0],
        Geometry::MultiPoint(mp) => mp.iter().map(|p| p.0).collect(),
        _ => Vec::new(),
    }
}

fn add_point_vertices(
    graph: &mut Graph,
    features: &[Feature],
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<()> {
    for (i, feature) in features.iter().enumerate() {
        if cancel.is_canceled() {
            return Ok(());
        }
        progress.step(Phase::Vertices, i, features.len());
        let coords = point_coords(feature);
        for coord in coords {
            let id = graph.add_vertex(coord, None)?;
            graph.match_vertex_feature(id, feature.id)?;
        }
    }
    Ok(())
}

/// Adds a vertex per point. With `link` each one also gets an edge to the
/// nearest vertex that existed before.
fn add_extra_points(
    graph: &mut Graph,
    features: &[Feature],
    link: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    if features.is_empty() {
        return Ok(());
    }
    let network: Vec<(VertexId, Coord)> = graph.vertices().map(|v| (v.id, v.coord)).collect();
    let index = SpatialIndex::build(network.iter().map(|(_, c)| *c).zip(0..));

    let mut linked = 0;
    for feature in features {
        if cancel.is_canceled() {
            return Ok(());
        }
        let coords = point_coords(feature);
        for coord in coords {
            let id = graph.add_vertex(coord, None)?;
            graph.match_vertex_feature(id, feature.id)?;
            if !link {
                continue;
            }
            if let Some((_, position)) = index.nearest_k(coord, 1).into_iter().next() {
                graph.add_edge(id, network[position].0, None)?;
                linked += 1;
            }
        }
    }
    debug!("{linked} additional points linked to the line network");
    Ok(())
}

/// Segment endpoints become vertices, shared where coordinates are identical.
/// With `segments_as_edges` every segment also becomes an edge matched to its
/// feature.
fn add_line_vertices(
    graph: &mut Graph,
    features: &[Feature],
    segments_as_edges: bool,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<()> {
    let segments = explode_lines(features);
    let mut known: AHashMap<(OrderedFloat<f64>, OrderedFloat<f64>), VertexId> = AHashMap::new();
    let mut vertex_at = |graph: &mut Graph, c: Coord| -> Result<VertexId> {
        let key = (OrderedFloat(c.x), OrderedFloat(c.y));
        if let Some(id) = known.get(&key) {
            return Ok(*id);
        }
        let id = graph.add_vertex(c, None)?;
        known.insert(key, id);
        Ok(id)
    };

    for (i, segment) in segments.iter().enumerate() {
        if cancel.is_canceled() {
            return Ok(());
        }
        progress.step(Phase::Vertices, i, segments.len());
        let from = vertex_at(graph, segment.line.start)?;
        let to = vertex_at(graph, segment.line.end)?;
        if segments_as_edges {
            let edge = graph.add_edge(from, to, None)?;
            graph.match_edge_feature(edge, segment.feature)?;
        }
    }
    Ok(())
}
