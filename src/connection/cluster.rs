use super::complete::connect_all_pairs;
use super::nearest::connect_nearest_among;
use super::{ClusterMode, ConnectionContext};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, VertexId};
use geo::Coord;
use log::debug;

/// Partitions the vertices with the clusterer, then connects inside each
/// cluster only. Cluster ids are stored on the vertices.
pub fn connect_clusters(
    graph: &mut Graph,
    ctx: &mut ConnectionContext<'_>,
    count: usize,
    mode: ClusterMode,
) -> Result<()> {
    let ids = graph.vertex_ids();
    let coords: Vec<Coord> = graph.vertices().map(|v| v.coord).collect();
    let assignment = ctx.clusterer.cluster(&coords, count)?;
    if assignment.len() != ids.len() {
        return Err(GraphError::collaborator(
            "clusterer",
            format!(
                "returned {} assignments for {} vertices",
                assignment.len(),
                ids.len()
            ),
        ));
    }

    let mut members: Vec<Vec<VertexId>> = vec![Vec::new(); count];
    for (id, cluster) in ids.iter().zip(assignment.iter()) {
        let slot = members.get_mut(*cluster).ok_or_else(|| {
            GraphError::collaborator("clusterer", format!("cluster id {cluster} out of range"))
        })?;
        slot.push(*id);
        graph.set_cluster_id(*id, Some(*cluster))?;
    }

    for (cluster, cluster_ids) in members.iter().enumerate() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        debug!("cluster {cluster}: {} vertices", cluster_ids.len());
        match mode {
            ClusterMode::Complete => connect_all_pairs(graph, ctx, cluster_ids)?,
            ClusterMode::NearestNeighbor { k } => {
                connect_nearest_among(graph, ctx, cluster_ids, k, false)?
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::{Harness, graph_of};
    use crate::graph::EdgeDirection;

    fn two_groups() -> Graph {
        graph_of(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (0.0, 1.0),
            (100.0, 100.0),
            (101.0, 100.0),
            (100.0, 101.0),
        ])
    }

    #[test]
    fn test_cluster_complete_stays_inside_clusters() {
        let mut harness = Harness::new();
        let mut graph = two_groups();
        connect_clusters(
            &mut graph,
            &mut harness.ctx(EdgeDirection::Undirected),
            2,
            ClusterMode::Complete,
        )
        .unwrap();
        assert_eq!(graph.edge_count(), 6);
        for edge in graph.edges() {
            let a = graph.vertex(edge.from).unwrap().cluster_id;
            let b = graph.vertex(edge.to).unwrap().cluster_id;
            assert!(a.is_some());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_cluster_nearest() {
        let mut harness = Harness::new();
        let mut graph = two_groups();
        connect_clusters(
            &mut graph,
            &mut harness.ctx(EdgeDirection::Directed),
            2,
            ClusterMode::NearestNeighbor { k: 1 },
        )
        .unwrap();
        // three vertices per cluster, the last one in each finds nobody
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.connected_components().len() == 2);
    }
}
