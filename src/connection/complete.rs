use super::ConnectionContext;
use crate::builder::progress::Phase;
use crate::error::Result;
use crate::graph::{EdgeDirection, Graph, VertexId};

/// One edge per unordered pair, both directions when directed.
pub fn connect_complete(graph: &mut Graph, ctx: &mut ConnectionContext<'_>) -> Result<()> {
    let ids = graph.vertex_ids();
    connect_all_pairs(graph, ctx, &ids)
}

pub(crate) fn connect_all_pairs(
    graph: &mut Graph,
    ctx: &mut ConnectionContext<'_>,
    ids: &[VertexId],
) -> Result<()> {
    let n = ids.len();
    for i in 0..n.saturating_sub(1) {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        ctx.progress.step(Phase::Edges, i, n);
        for j in (i + 1)..n {
            graph.add_edge(ids[i], ids[j], None)?;
            if ctx.direction == EdgeDirection::Directed {
                graph.add_edge(ids[j], ids[i], None)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::{Harness, graph_of};

    fn ring(n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|i| {
                let a = i as f64 / n as f64 * std::f64::consts::TAU;
                (a.cos(), a.sin())
            })
            .collect()
    }

    #[test]
    fn test_complete_counts() {
        let mut harness = Harness::new();
        let mut undirected = graph_of(&ring(6));
        connect_complete(&mut undirected, &mut harness.ctx(EdgeDirection::Undirected)).unwrap();
        assert_eq!(undirected.edge_count(), 15);

        let mut directed = graph_of(&ring(6));
        connect_complete(&mut directed, &mut harness.ctx(EdgeDirection::Directed)).unwrap();
        assert_eq!(directed.edge_count(), 30);
    }

    #[test]
    fn test_complete_stops_when_canceled() {
        let mut harness = Harness::new();
        harness.cancel.cancel();
        let mut graph = graph_of(&ring(4));
        connect_complete(&mut graph, &mut harness.ctx(EdgeDirection::Directed)).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }
}
