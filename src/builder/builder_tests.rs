use super::options::{BuildOptions, RandomOptions};
use super::progress::{CancellationToken, ProgressReporter};
use super::random_area::RandomArea;
use super::*;
use crate::error::ErrorKind;
use crate::sources::{AttributeValue, DistanceUnit, GeometryKind, GridRaster, MemoryLayer};
use geo::{Point, line_string, polygon};
use std::sync::{Arc, Mutex};

fn random_options(count: usize, connection: ConnectionPolicy) -> BuildOptions {
    BuildOptions {
        edge_direction: EdgeDirection::Directed,
        connection,
        crs: Some("EPSG:3857".into()),
        random: Some(RandomOptions {
            count,
            area: RandomArea::Custom {
                x_min: 0.0,
                y_min: 0.0,
                x_max: 1000.0,
                y_max: 1000.0,
            },
        }),
        seed: Some(11),
        ..Default::default()
    }
}

fn build(builder: &mut GraphBuilder<'_>) -> Graph {
    builder
        .build(&CancellationToken::new(), &mut ProgressReporter::silent())
        .unwrap()
        .graph()
        .unwrap()
}

fn points(coords: &[(f64, f64)]) -> MemoryLayer {
    let mut layer = MemoryLayer::new(GeometryKind::Point, "EPSG:3857");
    for (x, y) in coords {
        layer.push(Point::new(*x, *y), vec![]).unwrap();
    }
    layer
}

fn square(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> MemoryLayer {
    let mut layer = MemoryLayer::new(GeometryKind::Polygon, "EPSG:3857");
    layer
        .push(
            polygon![
                (x: x_min, y: y_min),
                (x: x_max, y: y_min),
                (x: x_max, y: y_max),
                (x: x_min, y: y_max),
            ],
            vec![],
        )
        .unwrap();
    layer
}

#[test]
fn test_complete_random_graph() {
    let mut builder = GraphBuilder::new(random_options(10, ConnectionPolicy::Complete));
    let graph = build(&mut builder);
    assert_eq!(graph.vertex_count(), 10);
    assert_eq!(graph.edge_count(), 90);
    assert_eq!(builder.state(), BuildState::Done);
    for vertex in graph.vertices() {
        assert!((0.0..1000.0).contains(&vertex.coord.x));
        assert!((0.0..1000.0).contains(&vertex.coord.y));
    }
}

#[test]
fn test_nearest_neighbor_random_graph() {
    let mut builder = GraphBuilder::new(random_options(
        10,
        ConnectionPolicy::NearestNeighbor {
            k: 1,
            allow_double_edges: false,
        },
    ));
    assert_eq!(build(&mut builder).edge_count(), 9);
}

#[test]
fn test_same_seed_same_graph() {
    let coords = |graph: &Graph| graph.vertices().map(|v| v.coord).collect::<Vec<_>>();
    let first = build(&mut GraphBuilder::new(random_options(5, ConnectionPolicy::None)));
    let second = build(&mut GraphBuilder::new(random_options(5, ConnectionPolicy::None)));
    assert_eq!(coords(&first), coords(&second));
    assert_eq!(first.edge_count(), 0);
}

#[test]
fn test_line_segments_become_edges() {
    let mut lines = MemoryLayer::new(GeometryKind::Line, "EPSG:3857");
    lines
        .push(line_string![(x: -1.0, y: 0.0), (x: 0.0, y: 1.0)], vec![])
        .unwrap();
    let mut builder = GraphBuilder::new(BuildOptions {
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::None,
        ..Default::default()
    });
    builder.set_lines(&lines).unwrap();
    let graph = build(&mut builder);

    assert_eq!(graph.vertex_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.crs(), "EPSG:3857");
    assert_eq!(graph.edge_feature(0), Some(0));
    let cost = graph.cost_of_edge(0, 0).unwrap();
    assert!((cost - 2f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_shared_line_endpoints_share_a_vertex() {
    let mut lines = MemoryLayer::new(GeometryKind::Line, "EPSG:3857");
    lines
        .push(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)], vec![])
        .unwrap();
    lines
        .push(line_string![(x: 1.0, y: 0.0), (x: 1.0, y: 1.0)], vec![])
        .unwrap();
    let mut builder = GraphBuilder::new(BuildOptions {
        connection: ConnectionPolicy::None,
        ..Default::default()
    });
    builder.set_lines(&lines).unwrap();
    let graph = build(&mut builder);
    assert_eq!(graph.vertex_count(), 3);
    // undirected: each segment in both directions
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.connected_components().len(), 1);
}

#[test]
fn test_raster_sum_cost() {
    let raster = GridRaster::new(
        "dem",
        geo::Coord { x: 0.0, y: 2.0 },
        (1.0, 1.0),
        2,
        2,
        vec![vec![1.0, 2.0, 3.0, 4.0]],
    )
    .unwrap();
    let layer = points(&[(0.5, 0.5), (1.5, 0.5)]);
    let mut builder = GraphBuilder::new(BuildOptions {
        distance_strategy: DistanceStrategy::Advanced,
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::Complete,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    assert_eq!(builder.add_raster(&raster, 0).unwrap(), 0);
    builder.add_cost_function("sum", "raster[0]:sum").unwrap();
    let graph = build(&mut builder);

    assert_eq!(builder.state(), BuildState::Done);
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.edge_cost_slots()[0].name, "sum");
    for edge in graph.edge_ids() {
        assert_eq!(graph.cost_of_edge(edge, 0).unwrap(), 7.0);
    }
}

#[test]
fn test_formula_scales_distance_and_strategy_switch() {
    let layer = points(&[(0.0, 0.0), (3.0, 4.0)]);
    let mut builder = GraphBuilder::new(BuildOptions {
        distance_strategy: DistanceStrategy::Advanced,
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::Complete,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    builder.add_cost_function("double", "2*euclidean").unwrap();
    builder.add_cost_function("one", "rnd?1??1&").unwrap();
    let mut graph = build(&mut builder);

    assert_eq!(graph.cost_of_edge(0, 0).unwrap(), 10.0);
    assert_eq!(graph.cost_of_edge(0, 1).unwrap(), 1.0);
    assert!(graph.cost_of_edge(0, 2).is_err());

    graph.set_distance_strategy(DistanceStrategy::Manhattan);
    assert_eq!(graph.cost_of_edge(0, 0).unwrap(), 7.0);
    graph.set_distance_strategy(DistanceStrategy::Advanced);
    assert_eq!(graph.cost_of_edge(0, 0).unwrap(), 10.0);
}

#[test]
fn test_field_costs_and_vertex_costs() {
    let mut layer = MemoryLayer::new(GeometryKind::Point, "EPSG:3857");
    layer
        .push(Point::new(0.0, 0.0), vec![("weight", AttributeValue::Number(2.0))])
        .unwrap();
    layer
        .push(Point::new(1.0, 0.0), vec![("weight", AttributeValue::Number(5.0))])
        .unwrap();
    let mut builder = GraphBuilder::new(BuildOptions {
        distance_strategy: DistanceStrategy::Advanced,
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::Complete,
        vertex_costs: true,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    builder.add_cost_function("w", "field:weight").unwrap();
    let graph = build(&mut builder);

    // edges read the destination vertex's feature
    let to_second = graph.has_edge(0, 1).unwrap();
    let to_first = graph.has_edge(1, 0).unwrap();
    assert_eq!(graph.cost_of_edge(to_second, 0).unwrap(), 5.0);
    assert_eq!(graph.cost_of_edge(to_first, 0).unwrap(), 2.0);
    assert_eq!(graph.cost_of_vertex(0, 0).unwrap(), 2.0);
    assert_eq!(graph.cost_of_vertex(1, 0).unwrap(), 5.0);
}

#[test]
fn test_line_topology_build() {
    let layer = points(&[
        (2.0, 0.5),
        (8.0, 0.5),
        (12.0, -0.5),
        (18.0, 0.5),
        (22.0, 0.5),
        (28.0, -0.5),
    ]);
    let mut lines = MemoryLayer::new(GeometryKind::Line, "EPSG:3857");
    lines
        .push(
            line_string![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 20.0, y: 0.0),
                (x: 30.0, y: 0.0),
            ],
            vec![],
        )
        .unwrap();
    let mut builder = GraphBuilder::new(BuildOptions {
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::LineTopology {
            tolerance: 0.0,
            unit: DistanceUnit::Meters,
            degree_threshold: 5,
        },
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    builder.set_lines(&lines).unwrap();
    let graph = build(&mut builder);
    assert_eq!(graph.vertex_count(), 6);
    assert_eq!(graph.edge_count(), 5);
}

#[test]
fn test_additional_points_join_the_line_network() {
    let mut lines = MemoryLayer::new(GeometryKind::Line, "EPSG:3857");
    lines
        .push(line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 20.0, y: 0.0)], vec![])
        .unwrap();
    let extra = points(&[(9.0, 3.0), (21.0, -1.0)]);
    let mut builder = GraphBuilder::new(BuildOptions {
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::None,
        ..Default::default()
    });
    builder.set_lines(&lines).unwrap();
    builder.set_additional_points(&extra).unwrap();
    let graph = build(&mut builder);

    assert_eq!(graph.vertex_count(), 5);
    assert_eq!(graph.edge_count(), 4);
    // line vertices come first: (0,0), (10,0), (20,0)
    assert!(graph.has_edge(3, 1).is_some());
    assert!(graph.has_edge(4, 2).is_some());
    assert_eq!(graph.vertex_feature(3), Some(0));
    assert_eq!(graph.vertex_feature(4), Some(1));
    assert_eq!(graph.connected_components().len(), 1);
}

#[test]
fn test_additional_points_need_a_line_graph() {
    let layer = points(&[(0.0, 0.0), (1.0, 0.0)]);
    let extra = points(&[(5.0, 5.0)]);
    let mut builder = GraphBuilder::new(BuildOptions::default());
    builder.set_points(&layer).unwrap();
    builder.set_additional_points(&extra).unwrap();
    assert_eq!(builder.validate().unwrap_err().kind(), ErrorKind::Configuration);

    let mut lines = MemoryLayer::new(GeometryKind::Line, "EPSG:3857");
    lines
        .push(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)], vec![])
        .unwrap();
    let mut elsewhere = MemoryLayer::new(GeometryKind::Point, "EPSG:4326");
    elsewhere.push(Point::new(0.5, 0.5), vec![]).unwrap();
    let mut builder = GraphBuilder::new(BuildOptions::default());
    builder.set_lines(&lines).unwrap();
    builder.set_additional_points(&elsewhere).unwrap();
    assert_eq!(builder.validate().unwrap_err().kind(), ErrorKind::Configuration);

    assert_eq!(
        builder.set_additional_points(&lines).unwrap_err().kind(),
        ErrorKind::Configuration
    );
}

#[test]
fn test_undirected_doubles_edges_once() {
    let layer = points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
    let mut builder = GraphBuilder::new(BuildOptions {
        edge_direction: EdgeDirection::Undirected,
        connection: ConnectionPolicy::Complete,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    let graph = build(&mut builder);

    // 6 pairs, each stored in both directions
    assert_eq!(graph.edge_count(), 12);
    for edge in graph.edges() {
        assert!(graph.has_edge(edge.to, edge.from).is_some());
    }
}

#[test]
fn test_forbidden_area_removes_edges() {
    let layer = points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
    let forbidden = square(4.0, -1.0, 6.0, 1.0);
    let mut builder = GraphBuilder::new(BuildOptions {
        connection: ConnectionPolicy::Complete,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    builder.add_forbidden_area(&forbidden).unwrap();
    let graph = build(&mut builder);

    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(graph.edge_count(), 4);
    assert!(!graph.has_connection(0, 1));
    assert!(graph.has_connection(0, 2));
    assert_eq!(builder.state(), BuildState::Done);
}

#[test]
fn test_cancellation_yields_no_graph() {
    let mut builder = GraphBuilder::new(random_options(50, ConnectionPolicy::Complete));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut progress = ProgressReporter::with_callback(move |p| sink.lock().unwrap().push(p));

    let outcome = builder.build(&cancel, &mut progress).unwrap();
    assert!(outcome.is_canceled());
    assert_eq!(builder.state(), BuildState::Canceled);
    assert!(progress.current() < 100.0);
    assert!(!seen.lock().unwrap().contains(&100.0));
}

#[test]
fn test_cancel_during_cost_assignment() {
    let layer = points(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (4.0, 0.0)]);
    let mut builder = GraphBuilder::new(BuildOptions {
        distance_strategy: DistanceStrategy::Advanced,
        edge_direction: EdgeDirection::Directed,
        connection: ConnectionPolicy::Complete,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    builder.add_cost_function("double", "2*euclidean").unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut progress = ProgressReporter::with_callback(move |p| {
        sink.lock().unwrap().push(p);
        if p >= 50.0 {
            trigger.cancel();
        }
    });

    let outcome = builder.build(&cancel, &mut progress).unwrap();
    assert!(outcome.is_canceled());
    assert!(outcome.graph().is_none());
    assert_eq!(builder.state(), BuildState::Canceled);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|p| *p >= 50.0));
    assert!(!seen.contains(&100.0));
}

#[test]
fn test_progress_reaches_100_on_success() {
    let mut builder = GraphBuilder::new(random_options(6, ConnectionPolicy::Complete));
    let mut progress = ProgressReporter::silent();
    builder
        .build(&CancellationToken::new(), &mut progress)
        .unwrap();
    assert_eq!(progress.current(), 100.0);
}

#[test]
fn test_configuration_errors() {
    // no vertex source
    let err = GraphBuilder::new(BuildOptions::default()).validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    // polygon layer of the wrong kind
    let layer = points(&[(0.0, 0.0)]);
    let mut builder = GraphBuilder::new(BuildOptions::default());
    assert_eq!(
        builder.add_polygon_layer(&layer).unwrap_err().kind(),
        ErrorKind::Configuration
    );
    assert_eq!(
        builder.set_lines(&layer).unwrap_err().kind(),
        ErrorKind::Configuration
    );

    // line topology without a network
    let mut builder = GraphBuilder::new(BuildOptions {
        connection: ConnectionPolicy::LineTopology {
            tolerance: 1.0,
            unit: DistanceUnit::Meters,
            degree_threshold: 3,
        },
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    let err = builder
        .build(&CancellationToken::new(), &mut ProgressReporter::silent())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(builder.state(), BuildState::Idle);

    // advanced without formulas
    let mut builder = GraphBuilder::new(BuildOptions {
        distance_strategy: DistanceStrategy::Advanced,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    assert_eq!(builder.validate().unwrap_err().kind(), ErrorKind::Configuration);

    // unknown option key
    let err = BuildOptions::from_json_str(r#"{"edge_direction": "Directed", "speed": 3}"#)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    // crs mismatch between layer and options
    let mut builder = GraphBuilder::new(BuildOptions {
        crs: Some("EPSG:4326".into()),
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    assert_eq!(builder.validate().unwrap_err().kind(), ErrorKind::Configuration);
}

#[test]
fn test_bad_formula_is_rejected_with_its_index() {
    let layer = points(&[(0.0, 0.0), (1.0, 1.0)]);
    let mut builder = GraphBuilder::new(BuildOptions {
        distance_strategy: DistanceStrategy::Advanced,
        ..Default::default()
    });
    builder.set_points(&layer).unwrap();
    builder.add_cost_function("fine", "euclidean").unwrap();
    let err = builder.add_cost_function("broken", "raster[2]:sum").unwrap_err();
    assert!(matches!(err, GraphError::FormulaValidation { index: 1, .. }));
    assert_eq!(builder.options().cost_functions.len(), 1);

    let report = builder.check_formula("if{euclidean > 1;2;3");
    assert!(!report.is_ok());
    assert!(builder.check_formula("manhattan * 2").is_ok());
}
