// ===========================================================================
// Arena graph: vertices and directed edges addressed by stable ids
// ===========================================================================
pub mod shortest_path;

use crate::error::{GraphError, Result};
use crate::geometry::{self, Ellipsoid};
use ahash::{AHashMap, AHashSet};
use geo::{Coord, Line};
use serde::{Deserialize, Serialize};

pub type VertexId = i64;
pub type EdgeId = i64;
pub type FeatureId = i64;

/// How `cost_of_edge` interprets an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceStrategy {
    #[default]
    Euclidean,
    Manhattan,
    Geodesic,
    Ellipsoidal,
    /// Costs come from formula slots
    Advanced,
    None,
}

impl DistanceStrategy {
    pub fn metric(&self) -> Option<DistanceMetric> {
        match self {
            DistanceStrategy::Euclidean => Some(DistanceMetric::Euclidean),
            DistanceStrategy::Manhattan => Some(DistanceMetric::Manhattan),
            DistanceStrategy::Geodesic => Some(DistanceMetric::Geodesic),
            DistanceStrategy::Ellipsoidal => Some(DistanceMetric::Ellipsoidal),
            DistanceStrategy::Advanced | DistanceStrategy::None => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Geodesic,
    Ellipsoidal,
}

impl DistanceMetric {
    pub fn measure(&self, a: Coord, b: Coord, ellipsoid: &Ellipsoid) -> f64 {
        match self {
            DistanceMetric::Euclidean => geometry::euclidean_distance(a, b),
            DistanceMetric::Manhattan => geometry::manhattan_distance(a, b),
            DistanceMetric::Geodesic => geometry::haversine_distance(a, b),
            DistanceMetric::Ellipsoidal => geometry::ellipsoidal_distance(a, b, ellipsoid),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgeDirection {
    Directed,
    #[default]
    Undirected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: VertexId,
    pub coord: Coord,
    pub cluster_id: Option<usize>,
    pub incoming: Vec<EdgeId>,
    pub outgoing: Vec<EdgeId>,
}

impl Vertex {
    pub fn degree(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: VertexId,
    pub to: VertexId,
    pub highlighted: bool,
}

/// One named cost function's values, aligned with the edge (or vertex) arena.
#[derive(Debug, Clone, PartialEq)]
pub struct CostSlot {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    vertex_index: AHashMap<VertexId, usize>,
    edge_index: AHashMap<EdgeId, usize>,
    next_vertex_id: VertexId,
    next_edge_id: EdgeId,
    distance_strategy: DistanceStrategy,
    edge_direction: EdgeDirection,
    ellipsoid: Ellipsoid,
    crs: String,
    edge_cost_slots: Vec<CostSlot>,
    vertex_cost_slots: Vec<CostSlot>,
    // edge id -> originating line feature
    feature_matching: AHashMap<EdgeId, FeatureId>,
    vertex_features: AHashMap<VertexId, FeatureId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty graph sharing this graph's strategy, direction, ellipsoid and CRS.
    pub fn empty_like(&self) -> Self {
        Self {
            distance_strategy: self.distance_strategy,
            edge_direction: self.edge_direction,
            ellipsoid: self.ellipsoid,
            crs: self.crs.clone(),
            ..Self::default()
        }
    }

    // ------------------------------------------------------------------
    // settings
    // ------------------------------------------------------------------

    pub fn distance_strategy(&self) -> DistanceStrategy {
        self.distance_strategy
    }

    /// Switching the strategy only changes how `cost_of_edge` reads edges.
    pub fn set_distance_strategy(&mut self, strategy: DistanceStrategy) {
        self.distance_strategy = strategy;
    }

    pub fn edge_direction(&self) -> EdgeDirection {
        self.edge_direction
    }

    pub fn set_edge_direction(&mut self, direction: EdgeDirection) {
        self.edge_direction = direction;
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn set_ellipsoid(&mut self, ellipsoid: Ellipsoid) {
        self.ellipsoid = ellipsoid;
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn set_crs(&mut self, crs: impl Into<String>) {
        self.crs = crs.into();
    }

    // ------------------------------------------------------------------
    // vertices
    // ------------------------------------------------------------------

    pub fn add_vertex(&mut self, coord: Coord, explicit_id: Option<VertexId>) -> Result<VertexId> {
        let id = match explicit_id {
            Some(id) => {
                if self.vertex_index.contains_key(&id) {
                    return Err(GraphError::DuplicateId(id));
                }
                id
            }
            None => self.next_vertex_id,
        };
        self.next_vertex_id = self.next_vertex_id.max(id + 1);

        self.vertex_index.insert(id, self.vertices.len());
        self.vertices.push(Vertex {
            id,
            coord,
            cluster_id: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        for slot in &mut self.vertex_cost_slots {
            slot.values.push(0.0);
        }
        Ok(id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertex_index.get(&id).map(|&idx| &self.vertices[idx])
    }

    fn vertex_or_err(&self, id: VertexId) -> Result<&Vertex> {
        self.vertex(id).ok_or(GraphError::UnknownVertex(id))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.iter()
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices.iter().map(|v| v.id).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Position of a vertex in the arena, used to align vertex cost slots.
    pub fn vertex_position(&self, id: VertexId) -> Option<usize> {
        self.vertex_index.get(&id).copied()
    }

    pub fn set_cluster_id(&mut self, id: VertexId, cluster_id: Option<usize>) -> Result<()> {
        let idx = *self
            .vertex_index
            .get(&id)
            .ok_or(GraphError::UnknownVertex(id))?;
        self.vertices[idx].cluster_id = cluster_id;
        Ok(())
    }

    /// Deletes a vertex and every incident edge. Ids of all other vertices are untouched.
    pub fn delete_vertex(&mut self, id: VertexId) -> Result<Vec<EdgeId>> {
        let vertex = self.vertex_or_err(id)?;
        let mut incident: Vec<EdgeId> = vertex
            .outgoing
            .iter()
            .chain(vertex.incoming.iter())
            .copied()
            .collect();
        // self loops show up in both lists
        let mut seen = AHashSet::new();
        incident.retain(|e| seen.insert(*e));

        for edge_id in &incident {
            self.delete_edge(*edge_id)?;
        }

        let idx = self.vertex_index[&id];
        self.vertices.remove(idx);
        self.vertex_index.remove(&id);
        for slot in &mut self.vertex_cost_slots {
            slot.values.remove(idx);
        }
        for (pos, v) in self.vertices.iter().enumerate().skip(idx) {
            self.vertex_index.insert(v.id, pos);
        }
        self.vertex_features.remove(&id);

        Ok(incident)
    }

    // ------------------------------------------------------------------
    // edges
    // ------------------------------------------------------------------

    pub fn add_edge(
        &mut self,
        from: VertexId,
        to: VertexId,
        explicit_id: Option<EdgeId>,
    ) -> Result<EdgeId> {
        let from_idx = *self
            .vertex_index
            .get(&from)
            .ok_or(GraphError::UnknownVertex(from))?;
        let to_idx = *self
            .vertex_index
            .get(&to)
            .ok_or(GraphError::UnknownVertex(to))?;

        let id = match explicit_id {
            Some(id) => {
                if self.edge_index.contains_key(&id) {
                    return Err(GraphError::DuplicateId(id));
                }
                id
            }
            None => self.next_edge_id,
        };
        self.next_edge_id = self.next_edge_id.max(id + 1);

        self.edge_index.insert(id, self.edges.len());
        self.edges.push(Edge {
            id,
            from,
            to,
            highlighted: false,
        });
        self.vertices[from_idx].outgoing.push(id);
        self.vertices[to_idx].incoming.push(id);

        // keeps len(slot) == edge_count for slots populated before this edge existed
        for slot in &mut self.edge_cost_slots {
            slot.values.push(0.0);
        }
        Ok(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_index.get(&id).map(|&idx| &self.edges[idx])
    }

    fn edge_or_err(&self, id: EdgeId) -> Result<&Edge> {
        self.edge(id).ok_or(GraphError::UnknownEdge(id))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().map(|e| e.id).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_position(&self, id: EdgeId) -> Option<usize> {
        self.edge_index.get(&id).copied()
    }

    /// Directed lookup: only an edge running `from -> to` matches.
    pub fn has_edge(&self, from: VertexId, to: VertexId) -> Option<EdgeId> {
        let vertex = self.vertex(from)?;
        vertex
            .outgoing
            .iter()
            .copied()
            .find(|e| self.edge(*e).is_some_and(|edge| edge.to == to))
    }

    /// Either direction.
    pub fn has_connection(&self, a: VertexId, b: VertexId) -> bool {
        self.has_edge(a, b).is_some() || self.has_edge(b, a).is_some()
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        let idx = *self.edge_index.get(&id).ok_or(GraphError::UnknownEdge(id))?;
        let edge = self.edges.remove(idx);
        self.edge_index.remove(&id);
        for (pos, e) in self.edges.iter().enumerate().skip(idx) {
            self.edge_index.insert(e.id, pos);
        }
        for slot in &mut self.edge_cost_slots {
            slot.values.remove(idx);
        }

        if let Some(&from_idx) = self.vertex_index.get(&edge.from) {
            self.vertices[from_idx].outgoing.retain(|e| *e != id);
        }
        if let Some(&to_idx) = self.vertex_index.get(&edge.to) {
            self.vertices[to_idx].incoming.retain(|e| *e != id);
        }
        self.feature_matching.remove(&id);
        Ok(())
    }

    pub fn set_highlighted(&mut self, id: EdgeId, highlighted: bool) -> Result<()> {
        let idx = *self.edge_index.get(&id).ok_or(GraphError::UnknownEdge(id))?;
        self.edges[idx].highlighted = highlighted;
        Ok(())
    }

    /// Adds `to -> from` for every edge currently in the graph.
    ///
    /// Calling this twice quadruples the edge count; the builder calls it exactly once.
    pub fn add_reverse_edges(&mut self) -> Result<usize> {
        let snapshot: Vec<(EdgeId, VertexId, VertexId)> =
            self.edges.iter().map(|e| (e.id, e.from, e.to)).collect();
        for (id, from, to) in &snapshot {
            let reverse = self.add_edge(*to, *from, None)?;
            if let Some(feature) = self.feature_matching.get(id).copied() {
                self.feature_matching.insert(reverse, feature);
            }
        }
        Ok(snapshot.len())
    }

    pub fn edge_line(&self, id: EdgeId) -> Result<Line> {
        let edge = self.edge_or_err(id)?;
        let from = self.vertex_or_err(edge.from)?.coord;
        let to = self.vertex_or_err(edge.to)?.coord;
        Ok(Line::new(from, to))
    }

    pub fn edge_length(&self, id: EdgeId, metric: DistanceMetric) -> Result<f64> {
        let line = self.edge_line(id)?;
        Ok(metric.measure(line.start, line.end, &self.ellipsoid))
    }

    /// Cost of an edge under the active distance strategy.
    ///
    /// Geometric strategies ignore `slot`. `Advanced` reads the slot and fails
    /// when it has not been populated. `None` yields 0.
    pub fn cost_of_edge(&self, id: EdgeId, slot: usize) -> Result<f64> {
        match self.distance_strategy.metric() {
            Some(metric) => self.edge_length(id, metric),
            None if self.distance_strategy == DistanceStrategy::None => {
                self.edge_or_err(id)?;
                Ok(0.0)
            }
            None => {
                let idx = *self.edge_index.get(&id).ok_or(GraphError::UnknownEdge(id))?;
                let cost_slot =
                    self.edge_cost_slots
                        .get(slot)
                        .ok_or(GraphError::CostSlotOutOfRange {
                            slot,
                            populated: self.edge_cost_slots.len(),
                        })?;
                Ok(cost_slot.values[idx])
            }
        }
    }

    // ------------------------------------------------------------------
    // cost slots
    // ------------------------------------------------------------------

    pub fn add_edge_cost_slot(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<usize> {
        if values.len() != self.edges.len() {
            return Err(GraphError::CostSlotLength {
                expected: self.edges.len(),
                got: values.len(),
            });
        }
        self.edge_cost_slots.push(CostSlot {
            name: name.into(),
            values,
        });
        Ok(self.edge_cost_slots.len() - 1)
    }

    pub fn edge_cost_slots(&self) -> &[CostSlot] {
        &self.edge_cost_slots
    }

    pub fn set_edge_cost(&mut self, id: EdgeId, slot: usize, value: f64) -> Result<()> {
        let idx = *self.edge_index.get(&id).ok_or(GraphError::UnknownEdge(id))?;
        let populated = self.edge_cost_slots.len();
        let cost_slot = self
            .edge_cost_slots
            .get_mut(slot)
            .ok_or(GraphError::CostSlotOutOfRange { slot, populated })?;
        cost_slot.values[idx] = value;
        Ok(())
    }

    pub fn add_vertex_cost_slot(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<usize> {
        if values.len() != self.vertices.len() {
            return Err(GraphError::CostSlotLength {
                expected: self.vertices.len(),
                got: values.len(),
            });
        }
        self.vertex_cost_slots.push(CostSlot {
            name: name.into(),
            values,
        });
        Ok(self.vertex_cost_slots.len() - 1)
    }

    pub fn vertex_cost_slots(&self) -> &[CostSlot] {
        &self.vertex_cost_slots
    }

    pub fn cost_of_vertex(&self, id: VertexId, slot: usize) -> Result<f64> {
        let idx = *self
            .vertex_index
            .get(&id)
            .ok_or(GraphError::UnknownVertex(id))?;
        let cost_slot = self
            .vertex_cost_slots
            .get(slot)
            .ok_or(GraphError::CostSlotOutOfRange {
                slot,
                populated: self.vertex_cost_slots.len(),
            })?;
        Ok(cost_slot.values[idx])
    }

    // ------------------------------------------------------------------
    // feature matching
    // ------------------------------------------------------------------

    pub fn match_edge_feature(&mut self, edge: EdgeId, feature: FeatureId) -> Result<()> {
        self.edge_or_err(edge)?;
        self.feature_matching.insert(edge, feature);
        Ok(())
    }

    pub fn edge_feature(&self, edge: EdgeId) -> Option<FeatureId> {
        self.feature_matching.get(&edge).copied()
    }

    pub fn has_feature_matching(&self) -> bool {
        !self.feature_matching.is_empty()
    }

    pub fn match_vertex_feature(&mut self, vertex: VertexId, feature: FeatureId) -> Result<()> {
        self.vertex_or_err(vertex)?;
        self.vertex_features.insert(vertex, feature);
        Ok(())
    }

    pub fn vertex_feature(&self, vertex: VertexId) -> Option<FeatureId> {
        self.vertex_features.get(&vertex).copied()
    }

    // ------------------------------------------------------------------
    // whole-graph operations
    // ------------------------------------------------------------------

    /// Fresh graph without the given edges. Vertices keep their order but are
    /// renumbered from 0, edges likewise.
    pub fn rebuilt_without_edges(&self, removed: &AHashSet<EdgeId>) -> Result<Graph> {
        let mut rebuilt = self.empty_like();
        let mut vertex_map: AHashMap<VertexId, VertexId> = AHashMap::new();

        for vertex in &self.vertices {
            let new_id = rebuilt.add_vertex(vertex.coord, None)?;
            rebuilt.set_cluster_id(new_id, vertex.cluster_id)?;
            if let Some(feature) = self.vertex_features.get(&vertex.id) {
                rebuilt.vertex_features.insert(new_id, *feature);
            }
            vertex_map.insert(vertex.id, new_id);
        }

        let mut kept_positions = Vec::new();
        for (pos, edge) in self.edges.iter().enumerate() {
            if removed.contains(&edge.id) {
                continue;
            }
            let new_id = rebuilt.add_edge(vertex_map[&edge.from], vertex_map[&edge.to], None)?;
            rebuilt.set_highlighted(new_id, edge.highlighted)?;
            if let Some(feature) = self.feature_matching.get(&edge.id) {
                rebuilt.feature_matching.insert(new_id, *feature);
            }
            kept_positions.push(pos);
        }

        for slot in &self.edge_cost_slots {
            let values = kept_positions.iter().map(|&p| slot.values[p]).collect();
            rebuilt.add_edge_cost_slot(slot.name.clone(), values)?;
        }
        for slot in &self.vertex_cost_slots {
            rebuilt.add_vertex_cost_slot(slot.name.clone(), slot.values.clone())?;
        }

        Ok(rebuilt)
    }

    /// Weakly connected components, found by depth-first search.
    pub fn connected_components(&self) -> Vec<Vec<VertexId>> {
        let mut visited: AHashSet<VertexId> = AHashSet::new();
        let mut components = Vec::new();

        for vertex in &self.vertices {
            if !visited.insert(vertex.id) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![vertex.id];
            while let Some(current) = stack.pop() {
                component.push(current);
                let Some(v) = self.vertex(current) else {
                    continue;
                };
                for edge_id in v.outgoing.iter().chain(v.incoming.iter()) {
                    if let Some(edge) = self.edge(*edge_id) {
                        let other = if edge.from == current { edge.to } else { edge.from };
                        if visited.insert(other) {
                            stack.push(other);
                        }
                    }
                }
            }
            components.push(component);
        }

        components
    }
}
