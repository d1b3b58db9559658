//cargo run --bin graphgen --release -- --config build.ron --points stops.geojson --edges-out edges.geojson

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use spatial_graph::builder::options::{BuildOptions, RandomOptions};
use spatial_graph::builder::progress::{CancellationToken, ProgressReporter};
use spatial_graph::builder::random_area::RandomArea;
use spatial_graph::builder::{BuildOutcome, GraphBuilder};
use spatial_graph::export::{edges_to_geojson, vertices_to_geojson, write_geojson};
use spatial_graph::graph::shortest_path::shortest_path_tree;
use spatial_graph::sources::{GridRaster, MemoryLayer};
use std::path::{Path, PathBuf};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Build options as .ron or .json
    #[arg(short, long, env = "GRAPHGEN_CONFIG")]
    config: Option<PathBuf>,

    /// GeoJSON point layer used as vertices
    #[arg(long)]
    points: Option<PathBuf>,

    /// GeoJSON line layer
    #[arg(long)]
    lines: Option<PathBuf>,

    /// GeoJSON point layer joined to the nearest vertex of the line layer
    #[arg(long, requires = "lines")]
    additional_points: Option<PathBuf>,

    /// CRS of every input layer
    #[arg(long, default_value = "EPSG:4326")]
    layer_crs: String,

    /// ESRI ASCII grid rasters, referenced as raster[0], raster[1], ...
    #[arg(long, value_delimiter = ',')]
    raster: Vec<PathBuf>,

    /// GeoJSON polygon layers, referenced as polygon[0], polygon[1], ...
    #[arg(long, value_delimiter = ',')]
    polygons: Vec<PathBuf>,

    /// GeoJSON polygon layers whose edges get removed
    #[arg(long, value_delimiter = ',')]
    forbidden: Vec<PathBuf>,

    /// Draw this many random vertices instead of reading a point layer
    #[arg(long)]
    random: Option<usize>,

    /// Area for random vertices. Valid options:
    /// germany, france, osnabrueck, united-states, rome, australia or x_min,y_min,x_max,y_max
    #[arg(long)]
    area: Option<String>,

    #[arg(long, env = "GRAPHGEN_SEED")]
    seed: Option<u64>,

    #[arg(long)]
    vertices_out: Option<PathBuf>,

    #[arg(long)]
    edges_out: Option<PathBuf>,
}

fn read_layer(path: &Path, crs: &str) -> Result<MemoryLayer> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    MemoryLayer::from_geojson(&text, crs).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => BuildOptions::from_path(path)?,
        None => BuildOptions::default(),
    };
    if args.seed.is_some() {
        options.seed = args.seed;
    }
    if let Some(count) = args.random {
        let area = match &args.area {
            Some(area) => area.parse::<RandomArea>().map_err(|e| anyhow::anyhow!(e))?,
            None => options
                .random
                .as_ref()
                .map(|r| r.area)
                .unwrap_or_default(),
        };
        options.random = Some(RandomOptions { count, area });
    }

    let points = args
        .points
        .as_deref()
        .map(|p| read_layer(p, &args.layer_crs))
        .transpose()?;
    let lines = args
        .lines
        .as_deref()
        .map(|p| read_layer(p, &args.layer_crs))
        .transpose()?;
    let additional_points = args
        .additional_points
        .as_deref()
        .map(|p| read_layer(p, &args.layer_crs))
        .transpose()?;
    let rasters = args
        .raster
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let name = path.display().to_string();
            Ok(GridRaster::from_ascii_grid(name, &text)?)
        })
        .collect::<Result<Vec<_>>>()?;
    let polygons = args
        .polygons
        .iter()
        .map(|p| read_layer(p, &args.layer_crs))
        .collect::<Result<Vec<_>>>()?;
    let forbidden = args
        .forbidden
        .iter()
        .map(|p| read_layer(p, &args.layer_crs))
        .collect::<Result<Vec<_>>>()?;

    let mut builder = GraphBuilder::new(options);
    if let Some(points) = &points {
        builder.set_points(points)?;
    }
    if let Some(lines) = &lines {
        builder.set_lines(lines)?;
    }
    if let Some(additional) = &additional_points {
        builder.set_additional_points(additional)?;
    }
    for raster in &rasters {
        builder.add_raster(raster, 0)?;
    }
    for layer in &polygons {
        builder.add_polygon_layer(layer)?;
    }
    for layer in &forbidden {
        builder.add_forbidden_area(layer)?;
    }
    for (index, function) in builder.options().cost_functions.iter().enumerate() {
        let report = builder.check_formula(&function.formula);
        if !report.is_ok() {
            anyhow::bail!(
                "cost function {index} ({}): {}",
                function.name,
                report.message
            );
        }
    }

    let cancel = CancellationToken::new();
    let mut progress = ProgressReporter::with_callback(|p| info!("{p:.0}%"));
    let graph = match builder.build(&cancel, &mut progress)? {
        BuildOutcome::Built(graph) => graph,
        BuildOutcome::Canceled => {
            println!("Build canceled");
            return Ok(());
        }
    };

    let components = graph.connected_components();
    println!(
        "Built {} vertices, {} edges, {} connected components",
        graph.vertex_count(),
        graph.edge_count(),
        components.len()
    );
    if let Some(source) = graph.vertices().next().map(|v| v.id) {
        match shortest_path_tree(&graph, source, 0) {
            Ok(tree) => {
                let reached = graph
                    .vertex_ids()
                    .into_iter()
                    .filter(|id| tree.distance_to(*id).is_some())
                    .count();
                println!("Vertex {source} reaches {reached} vertices");
            }
            Err(e) => warn!("skipping reachability summary: {e}"),
        }
    }

    if let Some(path) = &args.vertices_out {
        write_geojson(path, &vertices_to_geojson(&graph))?;
        println!("Wrote vertices to {:?}", path);
    }
    if let Some(path) = &args.edges_out {
        write_geojson(path, &edges_to_geojson(&graph)?)?;
        println!("Wrote edges to {:?}", path);
    }

    Ok(())
}
