// ===========================================================================
// Line topology connections
//
// Points are snapped onto the segments of a line network. Points sharing a
// segment are chained along it, and a depth-first walk over the segment
// adjacency joins the closest points of neighbouring segments. Segments that
// caught no point get a temporary midpoint vertex so the walk can pass through
// them; those are dissolved at the end.
// ===========================================================================
use super::ConnectionContext;
use crate::builder::progress::Phase;
use crate::error::{GraphError, Result};
use crate::geometry::{euclidean_distance, midpoint, project_onto_segment};
use crate::graph::{EdgeId, FeatureId, Graph, VertexId};
use crate::sources::Feature;
use ahash::{AHashMap, AHashSet};
use geo::{Coord, Geometry, Line};
use log::{debug, info};
use ordered_float::OrderedFloat;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Line as IndexLine};

type IndexedSegment = GeomWithData<IndexLine<[f64; 2]>, usize>;

#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub line: Line,
    pub feature: FeatureId,
}

/// Splits every line feature into its two-point segments, skipping degenerate ones.
pub(crate) fn explode_lines(features: &[Feature]) -> Vec<Segment> {
    let mut segments = Vec::new();
    for feature in features {
        let lines: Vec<Line> = match &feature.geometry {
            Geometry::Line(l) => vec![*l],
            Geometry::LineString(ls) => ls.lines().collect(),
            Geometry::MultiLineString(mls) => mls.iter().flat_map(|ls| ls.lines()).collect(),
            _ => Vec::new(),
        };
        segments.extend(
            lines
                .into_iter()
                .filter(|l| l.start != l.end)
                .map(|line| Segment {
                    line,
                    feature: feature.id,
                }),
        );
    }
    segments
}

type CoordKey = (OrderedFloat<f64>, OrderedFloat<f64>);

fn key_of(c: Coord) -> CoordKey {
    (OrderedFloat(c.x), OrderedFloat(c.y))
}

/// Segment adjacency as a graph: segment endpoints are vertices and every
/// segment is one edge whose id is the segment's position.
fn segment_graph(segments: &[Segment]) -> Result<Graph> {
    let mut help = Graph::new();
    let mut endpoints: AHashMap<CoordKey, VertexId> = AHashMap::new();
    for (idx, segment) in segments.iter().enumerate() {
        let mut endpoint = |c: Coord, help: &mut Graph| -> Result<VertexId> {
            if let Some(id) = endpoints.get(&key_of(c)) {
                return Ok(*id);
            }
            let id = help.add_vertex(c, None)?;
            endpoints.insert(key_of(c), id);
            Ok(id)
        };
        let from = endpoint(segment.line.start, &mut help)?;
        let to = endpoint(segment.line.end, &mut help)?;
        help.add_edge(from, to, Some(idx as EdgeId))?;
    }
    Ok(help)
}

fn snap_points(
    graph: &Graph,
    segments: &[Segment],
    tolerance: f64,
) -> Vec<Vec<VertexId>> {
    let tree: RTree<IndexedSegment> = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(idx, s)| {
                GeomWithData::new(
                    IndexLine::new([s.line.start.x, s.line.start.y], [s.line.end.x, s.line.end.y]),
                    idx,
                )
            })
            .collect(),
    );

    let mut buckets: Vec<Vec<VertexId>> = vec![Vec::new(); segments.len()];
    for vertex in graph.vertices() {
        let query = [vertex.coord.x, vertex.coord.y];
        if tolerance <= 0.0 {
            if let Some(nearest) = tree.nearest_neighbor_iter(&query).next() {
                buckets[nearest.data].push(vertex.id);
            }
        } else {
            for hit in tree.locate_within_distance(query, tolerance * tolerance) {
                buckets[hit.data].push(vertex.id);
            }
        }
    }
    buckets
}

struct Walk<'a> {
    graph: &'a mut Graph,
    help: &'a Graph,
    segments: &'a [Segment],
    buckets: &'a [Vec<VertexId>],
}

impl Walk<'_> {
    fn coord(&self, id: VertexId) -> Result<Coord> {
        self.graph
            .vertex(id)
            .map(|v| v.coord)
            .ok_or(GraphError::UnknownVertex(id))
    }

    fn link(&mut self, a: VertexId, b: VertexId, segment: usize) -> Result<()> {
        if a == b || self.graph.has_connection(a, b) {
            return Ok(());
        }
        let edge = self.graph.add_edge(a, b, None)?;
        self.graph.match_edge_feature(edge, self.segments[segment].feature)
    }

    /// Joins the closest pair of points between two segments.
    fn join_segments(&mut self, segment: usize, arrived_by: usize) -> Result<()> {
        let mut best: Option<(f64, VertexId, VertexId)> = None;
        for &a in &self.buckets[segment] {
            let ca = self.coord(a)?;
            for &b in &self.buckets[arrived_by] {
                let d = euclidean_distance(ca, self.coord(b)?);
                if best.is_none_or(|(min, _, _)| d < min) {
                    best = Some((d, a, b));
                }
            }
        }
        if let Some((_, a, b)) = best {
            self.link(a, b, segment)?;
        }
        Ok(())
    }

    fn dfs(&mut self, start: VertexId, visited: &mut AHashSet<VertexId>) -> Result<usize> {
        let mut stack = vec![start];
        let mut arrived_by: AHashMap<VertexId, EdgeId> = AHashMap::new();
        let mut count = 0;

        while let Some(v) = stack.pop() {
            if !visited.insert(v) {
                continue;
            }
            count += 1;
            let Some(vertex) = self.help.vertex(v) else {
                continue;
            };
            let incident: Vec<EdgeId> = vertex
                .incoming
                .iter()
                .chain(vertex.outgoing.iter())
                .copied()
                .collect();

            for edge_id in &incident {
                if let Some(edge) = self.help.edge(*edge_id) {
                    let other = if edge.from == v { edge.to } else { edge.from };
                    arrived_by.insert(other, *edge_id);
                    stack.push(other);
                }
            }

            // the walk's first vertex was not reached over any segment
            let Some(&via) = arrived_by.get(&v) else {
                continue;
            };
            for edge_id in incident {
                if edge_id != via {
                    self.join_segments(edge_id as usize, via as usize)?;
                }
            }
        }
        Ok(count)
    }
}

/// Connects the graph's vertices along the topology of `lines`.
///
/// `tolerance` is in map units; 0 snaps every point to its single nearest
/// segment. Placeholder vertices with more than `degree_threshold` neighbours
/// are dropped without reconnecting them.
pub fn connect_along_lines(
    graph: &mut Graph,
    ctx: &mut ConnectionContext<'_>,
    lines: Option<&[Feature]>,
    tolerance: f64,
    degree_threshold: usize,
) -> Result<()> {
    let lines = lines.ok_or_else(|| {
        GraphError::config("line topology connections need a line network")
    })?;
    let segments = explode_lines(lines);
    if segments.is_empty() {
        return Err(GraphError::collaborator(
            "line network",
            "line network has no segments",
        ));
    }

    let mut buckets = snap_points(graph, &segments, tolerance);

    // chain the points of each segment by distance from the segment start
    for (idx, bucket) in buckets.iter().enumerate() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        if bucket.len() < 2 {
            continue;
        }
        let mut ordered: Vec<(f64, VertexId)> = Vec::with_capacity(bucket.len());
        for id in bucket {
            let coord = graph
                .vertex(*id)
                .map(|v| v.coord)
                .ok_or(GraphError::UnknownVertex(*id))?;
            let along = project_onto_segment(coord, &segments[idx].line).distance_along;
            ordered.push((along, *id));
        }
        ordered.sort_by_key(|(d, id)| (OrderedFloat(*d), *id));
        for pair in ordered.windows(2) {
            let (a, b) = (pair[0].1, pair[1].1);
            if a != b && !graph.has_connection(a, b) {
                let edge = graph.add_edge(a, b, None)?;
                graph.match_edge_feature(edge, segments[idx].feature)?;
            }
        }
    }
    ctx.progress.step(Phase::Edges, 1, 4);

    let help = segment_graph(&segments)?;

    let mut placeholders: Vec<(VertexId, usize)> = Vec::new();
    for (idx, bucket) in buckets.iter_mut().enumerate() {
        if bucket.is_empty() {
            let id = graph.add_vertex(midpoint(&segments[idx].line), None)?;
            bucket.push(id);
            placeholders.push((id, idx));
        }
    }
    debug!(
        "{} segments, {} placeholder vertices",
        segments.len(),
        placeholders.len()
    );

    let mut visited: AHashSet<VertexId> = AHashSet::new();
    let mut walk = Walk {
        graph: &mut *graph,
        help: &help,
        segments: &segments,
        buckets: &buckets,
    };
    let mut reached = 0;
    // start at dead ends so no branch is entered from its middle
    for vertex in help.vertices() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        if !visited.contains(&vertex.id) && vertex.degree() == 1 {
            reached += walk.dfs(vertex.id, &mut visited)?;
        }
    }
    // cycles have no dead ends
    if reached != help.vertex_count() {
        for vertex in help.vertices() {
            if ctx.cancel.is_canceled() {
                return Ok(());
            }
            if !visited.contains(&vertex.id) {
                walk.dfs(vertex.id, &mut visited)?;
            }
        }
    }
    ctx.progress.step(Phase::Edges, 2, 4);

    for (done, (placeholder, segment)) in placeholders.iter().rev().enumerate() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        ctx.progress.step(Phase::Edges, 2 * placeholders.len() + done, 4 * placeholders.len().max(1));

        let vertex = graph
            .vertex(*placeholder)
            .ok_or(GraphError::UnknownVertex(*placeholder))?;
        let mut neighbours: Vec<VertexId> = Vec::new();
        for edge_id in vertex.incoming.iter().chain(vertex.outgoing.iter()) {
            if let Some(edge) = graph.edge(*edge_id) {
                neighbours.push(if edge.from == *placeholder { edge.to } else { edge.from });
            }
        }

        if neighbours.len() <= degree_threshold {
            for i in 0..neighbours.len() {
                for j in (i + 1)..neighbours.len() {
                    let (a, b) = (neighbours[i], neighbours[j]);
                    if a != b && !graph.has_connection(a, b) {
                        let edge = graph.add_edge(a, b, None)?;
                        graph.match_edge_feature(edge, segments[*segment].feature)?;
                    }
                }
            }
        }
        graph.delete_vertex(*placeholder)?;
    }

    info!(
        "line topology produced {} edges between {} vertices",
        graph.edge_count(),
        graph.vertex_count()
    );
    Ok(())
}
