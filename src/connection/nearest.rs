use super::ConnectionContext;
use crate::builder::progress::Phase;
use crate::error::{GraphError, Result};
use crate::graph::{EdgeDirection, Graph, VertexId};
use crate::spatial_index::SpatialIndex;
use geo::Coord;

fn coords_of(graph: &Graph, ids: &[VertexId]) -> Result<Vec<Coord>> {
    ids.iter()
        .map(|id| {
            graph
                .vertex(*id)
                .map(|v| v.coord)
                .ok_or(GraphError::UnknownVertex(*id))
        })
        .collect()
}

pub fn connect_nearest(
    graph: &mut Graph,
    ctx: &mut ConnectionContext<'_>,
    k: usize,
    allow_double_edges: bool,
) -> Result<()> {
    let ids = graph.vertex_ids();
    connect_nearest_among(graph, ctx, &ids, k, allow_double_edges)
}

/// Connects every vertex in `ids` to its `k` nearest neighbours among `ids`.
///
/// Vertices are processed in the order given. Without double edges a
/// processed vertex leaves the index, so later vertices cannot pick it.
/// Undirected builds only ask for as many neighbours as the vertex still lacks
/// incoming edges. A vertex left without any edge is joined to its nearest
/// vertex regardless of removals, so no vertex ends up isolated.
pub(crate) fn connect_nearest_among(
    graph: &mut Graph,
    ctx: &mut ConnectionContext<'_>,
    ids: &[VertexId],
    k: usize,
    allow_double_edges: bool,
) -> Result<()> {
    if ids.len() < 2 || k == 0 {
        return Ok(());
    }
    let coords = coords_of(graph, ids)?;
    let mut index = SpatialIndex::build(coords.iter().copied().zip(0..));
    // every vertex, never shrunk
    let fallback =
        (!allow_double_edges).then(|| SpatialIndex::build(coords.iter().copied().zip(0..)));

    for (pos, id) in ids.iter().enumerate() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        ctx.progress.step(Phase::Edges, pos, ids.len());

        let wanted = match ctx.direction {
            EdgeDirection::Directed => k + 1,
            EdgeDirection::Undirected => {
                let incoming = graph.vertex(*id).map_or(0, |v| v.incoming.len());
                if incoming < k { k + 1 - incoming } else { 0 }
            }
        };

        if wanted > 0 {
            let neighbours: Vec<usize> = index
                .nearest_k(coords[pos], wanted)
                .into_iter()
                .map(|(_, other)| other)
                .filter(|other| *other != pos)
                .take(wanted - 1)
                .collect();
            for other in neighbours {
                graph.add_edge(*id, ids[other], None)?;
            }
        }

        if let Some(fallback) = &fallback {
            if graph.vertex(*id).is_some_and(|v| v.degree() == 0) {
                let nearest = fallback
                    .nearest_k(coords[pos], 2)
                    .into_iter()
                    .map(|(_, other)| other)
                    .find(|other| *other != pos);
                if let Some(other) = nearest {
                    graph.add_edge(*id, ids[other], None)?;
                }
            }
            index.remove(coords[pos], pos);
        }
    }
    Ok(())
}

/// Connects every vertex to all vertices within `radius` map units.
pub fn connect_within_distance(
    graph: &mut Graph,
    ctx: &mut ConnectionContext<'_>,
    radius: f64,
    allow_double_edges: bool,
) -> Result<()> {
    let ids = graph.vertex_ids();
    if ids.len() < 2 {
        return Ok(());
    }
    let coords = coords_of(graph, &ids)?;
    let mut index = SpatialIndex::build(coords.iter().copied().zip(0..));
    let radius_squared = radius * radius;

    for (pos, id) in ids.iter().enumerate() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        ctx.progress.step(Phase::Edges, pos, ids.len());

        let mut neighbours: Vec<usize> = index
            .within_radius(coords[pos], radius_squared)
            .into_iter()
            .map(|(_, other)| other)
            .filter(|other| *other != pos)
            .collect();
        neighbours.sort_unstable();
        for other in neighbours {
            graph.add_edge(*id, ids[other], None)?;
        }

        if !allow_double_edges {
            index.remove(coords[pos], pos);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::{Harness, graph_of};

    fn line_of_points(n: usize) -> Vec<(f64, f64)> {
        (0..n).map(|i| (i as f64 * i as f64, 0.0)).collect()
    }

    #[test]
    fn test_nearest_without_double_edges() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&line_of_points(10));
        connect_nearest(&mut graph, &mut harness.ctx(EdgeDirection::Directed), 1, false).unwrap();
        // the last processed vertex finds nobody left in the index
        assert_eq!(graph.edge_count(), 9);
        for v in graph.vertices() {
            assert!(v.degree() > 0);
        }
    }

    #[test]
    fn test_nearest_with_double_edges() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&line_of_points(10));
        connect_nearest(&mut graph, &mut harness.ctx(EdgeDirection::Directed), 2, true).unwrap();
        assert_eq!(graph.edge_count(), 20);
        // spacing grows along the line, so 0's nearest are 1 and 2
        assert!(graph.has_edge(0, 1).is_some());
        assert!(graph.has_edge(0, 2).is_some());
    }

    #[test]
    fn test_nearest_needs_two_vertices() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&[(0.0, 0.0)]);
        connect_nearest(&mut graph, &mut harness.ctx(EdgeDirection::Directed), 3, false).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_undirected_counts_incoming() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&[(0.0, 0.0), (1.0, 0.0), (10.0, 0.0)]);
        connect_nearest(&mut graph, &mut harness.ctx(EdgeDirection::Undirected), 1, true).unwrap();
        // vertex 1 already has an incoming edge from 0 and asks for nothing
        assert!(graph.has_edge(0, 1).is_some());
        assert!(graph.has_edge(1, 0).is_none());
        assert!(graph.has_edge(2, 1).is_some());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_undirected_never_isolates_a_vertex() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&[(0.0, 0.0), (1.0, 0.0), (100.0, 0.0)]);
        connect_nearest(&mut graph, &mut harness.ctx(EdgeDirection::Undirected), 1, false).unwrap();
        // 1 asks for nothing and leaves the index before 2 is processed
        for v in graph.vertices() {
            assert!(v.degree() > 0, "vertex {} has no edges", v.id);
        }
        assert!(graph.has_edge(2, 1).is_some());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_no_isolated_vertices_on_spread_points() {
        let mut harness = Harness::new();
        let points: Vec<(f64, f64)> = (0..30)
            .map(|i| ((i * 37 % 101) as f64, (i * 53 % 89) as f64))
            .collect();
        for direction in [EdgeDirection::Directed, EdgeDirection::Undirected] {
            let mut graph = graph_of(&points);
            connect_nearest(&mut graph, &mut harness.ctx(direction), 1, false).unwrap();
            assert!(graph.vertices().all(|v| v.degree() > 0));
            assert!(graph.edge_count() <= points.len());
        }
    }

    #[test]
    fn test_within_distance() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&[(0.0, 0.0), (3.0, 0.0), (0.0, 4.0), (50.0, 50.0)]);
        connect_within_distance(&mut graph, &mut harness.ctx(EdgeDirection::Directed), 4.0, true)
            .unwrap();
        assert!(graph.has_edge(0, 1).is_some());
        assert!(graph.has_edge(0, 2).is_some());
        assert!(graph.has_edge(1, 0).is_some());
        // (3,0) to (0,4) is 5 apart
        assert!(graph.has_edge(1, 2).is_none());
        assert_eq!(graph.vertex(3).unwrap().degree(), 0);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_within_zero_distance_joins_duplicates_only() {
        let mut harness = Harness::new();
        let mut graph = graph_of(&[(1.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        connect_within_distance(&mut graph, &mut harness.ctx(EdgeDirection::Directed), 0.0, false)
            .unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.has_edge(0, 1).is_some());
    }
}
