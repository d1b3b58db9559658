// GeoJSON output of a built graph: one collection of points for the vertices
// and one of two-point line strings for the edges.

use crate::error::{GraphError, Result};
use crate::graph::{CostSlot, Graph};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::Value;

fn number(value: f64) -> Value {
    // NaN and infinities have no JSON representation
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn feature(id: i64, value: geojson::Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry {
            bbox: None,
            value,
            foreign_members: None,
        }),
        id: Some(geojson::feature::Id::Number(id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn insert_slots(properties: &mut JsonObject, slots: &[CostSlot], position: usize) {
    for slot in slots {
        properties.insert(slot.name.clone(), number(slot.values[position]));
    }
}

pub fn vertices_to_geojson(graph: &Graph) -> GeoJson {
    let features = graph
        .vertices()
        .enumerate()
        .map(|(position, vertex)| {
            let mut properties = JsonObject::new();
            properties.insert(String::from("id"), Value::from(vertex.id));
            if let Some(cluster) = vertex.cluster_id {
                properties.insert(String::from("cluster"), Value::from(cluster));
            }
            if let Some(source) = graph.vertex_feature(vertex.id) {
                properties.insert(String::from("feature"), Value::from(source));
            }
            insert_slots(&mut properties, graph.vertex_cost_slots(), position);
            feature(
                vertex.id,
                geojson::Value::Point(vec![vertex.coord.x, vertex.coord.y]),
                properties,
            )
        })
        .collect();

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Edges with their endpoints, matched feature and every cost slot. Geometric
/// strategies also get a `length` under the active metric.
pub fn edges_to_geojson(graph: &Graph) -> Result<GeoJson> {
    let metric = graph.distance_strategy().metric();
    let mut features = Vec::with_capacity(graph.edge_count());
    for (position, edge) in graph.edges().enumerate() {
        let line = graph.edge_line(edge.id)?;
        let mut properties = JsonObject::new();
        properties.insert(String::from("id"), Value::from(edge.id));
        properties.insert(String::from("from"), Value::from(edge.from));
        properties.insert(String::from("to"), Value::from(edge.to));
        if edge.highlighted {
            properties.insert(String::from("highlighted"), Value::Bool(true));
        }
        if let Some(source) = graph.edge_feature(edge.id) {
            properties.insert(String::from("feature"), Value::from(source));
        }
        if let Some(metric) = metric {
            properties.insert(
                String::from("length"),
                number(graph.edge_length(edge.id, metric)?),
            );
        }
        insert_slots(&mut properties, graph.edge_cost_slots(), position);
        features.push(feature(
            edge.id,
            geojson::Value::LineString(vec![
                vec![line.start.x, line.start.y],
                vec![line.end.x, line.end.y],
            ]),
            properties,
        ));
    }

    Ok(GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }))
}

pub fn write_geojson(path: &std::path::Path, geojson: &GeoJson) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| GraphError::collaborator("export", format!("{}: {e}", path.display())))?;
    serde_json::to_writer(std::io::BufWriter::new(file), geojson)
        .map_err(|e| GraphError::collaborator("export", format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    #[test]
    fn test_edge_properties() {
        let mut graph = Graph::new();
        let a = graph.add_vertex(Coord { x: 0.0, y: 0.0 }, None).unwrap();
        let b = graph.add_vertex(Coord { x: 3.0, y: 4.0 }, None).unwrap();
        let e = graph.add_edge(a, b, None).unwrap();
        graph.match_edge_feature(e, 42).unwrap();
        graph.add_edge_cost_slot("time", vec![f64::INFINITY]).unwrap();

        let GeoJson::FeatureCollection(fc) = edges_to_geojson(&graph).unwrap() else {
            panic!("expected a feature collection");
        };
        let properties = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["from"], Value::from(a));
        assert_eq!(properties["feature"], Value::from(42));
        assert_eq!(properties["length"], Value::from(5.0));
        assert_eq!(properties["time"], Value::Null);
    }

    #[test]
    fn test_vertex_collection() {
        let mut graph = Graph::new();
        graph.add_vertex(Coord { x: 1.0, y: 2.0 }, Some(7)).unwrap();
        graph.add_vertex_cost_slot("height", vec![3.5]).unwrap();

        let GeoJson::FeatureCollection(fc) = vertices_to_geojson(&graph) else {
            panic!("expected a feature collection");
        };
        assert_eq!(fc.features.len(), 1);
        let properties = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["id"], Value::from(7));
        assert_eq!(properties["height"], Value::from(3.5));
    }
}
