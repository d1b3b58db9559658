use super::{EdgeId, Graph, VertexId};
use crate::error::{GraphError, Result};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Copy, Clone, Eq, PartialEq)]
struct State {
    cost: OrderedFloat<f64>,
    vertex: VertexId,
}

// Min-heap on cost, ties broken by vertex id so Ord agrees with PartialEq.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| self.vertex.cmp(&other.vertex))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of a single-source Dijkstra run over outgoing edges.
#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    pub source: VertexId,
    pub distances: AHashMap<VertexId, f64>,
    /// Edge used to reach each vertex other than the source
    pub predecessor_edges: AHashMap<VertexId, EdgeId>,
}

impl ShortestPathTree {
    pub fn distance_to(&self, target: VertexId) -> Option<f64> {
        self.distances.get(&target).copied()
    }

    /// Edges from the source to `target`, in travel order.
    pub fn path_to(&self, graph: &Graph, target: VertexId) -> Option<Vec<EdgeId>> {
        if !self.distances.contains_key(&target) {
            return None;
        }
        let mut path = Vec::new();
        let mut current = target;
        while current != self.source {
            let edge_id = *self.predecessor_edges.get(&current)?;
            path.push(edge_id);
            current = graph.edge(edge_id)?.from;
        }
        path.reverse();
        Some(path)
    }
}

/// Dijkstra from `source` using `cost_of_edge(edge, slot)` as weights.
///
/// Negative weights are rejected since they break the settle order.
pub fn shortest_path_tree(graph: &Graph, source: VertexId, slot: usize) -> Result<ShortestPathTree> {
    if graph.vertex(source).is_none() {
        return Err(GraphError::UnknownVertex(source));
    }

    let mut distances: AHashMap<VertexId, f64> = AHashMap::new();
    let mut predecessor_edges: AHashMap<VertexId, EdgeId> = AHashMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source, 0.0);
    heap.push(State {
        cost: OrderedFloat(0.0),
        vertex: source,
    });

    while let Some(State { cost, vertex }) = heap.pop() {
        if distances.get(&vertex).is_some_and(|d| cost.0 > *d) {
            continue;
        }
        let Some(v) = graph.vertex(vertex) else {
            continue;
        };
        for edge_id in &v.outgoing {
            let weight = graph.cost_of_edge(*edge_id, slot)?;
            if weight < 0.0 {
                return Err(GraphError::config(format!(
                    "negative cost {weight} on edge {edge_id}"
                )));
            }
            let Some(edge) = graph.edge(*edge_id) else {
                continue;
            };
            let next = cost.0 + weight;
            let better = distances.get(&edge.to).is_none_or(|d| next < *d);
            if better {
                distances.insert(edge.to, next);
                predecessor_edges.insert(edge.to, *edge_id);
                heap.push(State {
                    cost: OrderedFloat(next),
                    vertex: edge.to,
                });
            }
        }
    }

    Ok(ShortestPathTree {
        source,
        distances,
        predecessor_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DistanceStrategy;
    use geo::Coord;

    #[test]
    fn test_prefers_cheaper_detour() {
        let mut g = Graph::new();
        let a = g.add_vertex(Coord { x: 0.0, y: 0.0 }, None).unwrap();
        let b = g.add_vertex(Coord { x: 1.0, y: 0.0 }, None).unwrap();
        let c = g.add_vertex(Coord { x: 2.0, y: 0.0 }, None).unwrap();
        let direct = g.add_edge(a, c, None).unwrap();
        let ab = g.add_edge(a, b, None).unwrap();
        let bc = g.add_edge(b, c, None).unwrap();

        g.set_distance_strategy(DistanceStrategy::Advanced);
        let mut costs = vec![0.0; 3];
        costs[g.edge_position(direct).unwrap()] = 10.0;
        costs[g.edge_position(ab).unwrap()] = 1.0;
        costs[g.edge_position(bc).unwrap()] = 2.0;
        g.add_edge_cost_slot("time", costs).unwrap();

        let tree = shortest_path_tree(&g, a, 0).unwrap();
        assert_eq!(tree.distance_to(c), Some(3.0));
        assert_eq!(tree.path_to(&g, c), Some(vec![ab, bc]));
        assert_eq!(tree.path_to(&g, a), Some(vec![]));
    }

    #[test]
    fn test_unreachable_and_unknown() {
        let mut g = Graph::new();
        let a = g.add_vertex(Coord { x: 0.0, y: 0.0 }, None).unwrap();
        let b = g.add_vertex(Coord { x: 1.0, y: 0.0 }, None).unwrap();
        g.add_edge(b, a, None).unwrap();

        let tree = shortest_path_tree(&g, a, 0).unwrap();
        assert_eq!(tree.distance_to(b), None);
        assert!(tree.path_to(&g, b).is_none());
        assert!(shortest_path_tree(&g, 99, 0).is_err());
    }
}
