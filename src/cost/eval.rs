use super::ast::{BinaryOp, Condition, Expr, PixelSource, PolygonTest};
use super::check::Formula;
use super::raster_path::RasterPathCache;
use super::raster_stats;
use crate::builder::progress::{CancellationToken, Phase, ProgressReporter};
use crate::error::{GraphError, Result};
use crate::graph::{EdgeId, FeatureId, Graph, VertexId};
use crate::sources::{
    AttributeValue, Feature, PolygonPredicate, RasterSample, RasterSource, SpatialPredicate,
};
use ahash::{AHashMap, AHashSet};
use geo::{Coord, Line};
use rand::Rng;
use rand::rngs::StdRng;
use std::borrow::Cow;

/// One raster band a formula can address as `raster[i]`.
#[derive(Clone, Copy)]
pub struct RasterInput<'a> {
    pub source: &'a dyn RasterSource,
    pub band: usize,
}

/// External data formulas read from. Indices in a formula address `rasters`
/// and `polygons` by position.
#[derive(Default)]
pub struct CostSources<'a> {
    pub rasters: Vec<RasterInput<'a>>,
    pub polygons: Vec<&'a dyn PolygonPredicate>,
    /// Features of the line layer, matched to edges
    pub line_features: AHashMap<FeatureId, Feature>,
    /// Features of the point layer, matched to vertices
    pub point_features: AHashMap<FeatureId, Feature>,
    pub fields: AHashSet<String>,
}

#[derive(Clone, Copy)]
enum Subject {
    Edge {
        id: EdgeId,
        position: usize,
        from: Coord,
        to: Coord,
    },
    Vertex {
        id: VertexId,
        coord: Coord,
    },
}

/// Per-formula state shared by every edge of one evaluation pass.
struct Scope<'s, 'a> {
    graph: &'s Graph,
    sources: &'s CostSources<'a>,
    formula: &'s Formula,
    /// raster index -> samples per edge position
    line_samples: AHashMap<usize, Vec<Vec<RasterSample>>>,
    polygon_hits: AHashMap<(usize, PolygonTest), AHashSet<EdgeId>>,
    paths: &'s mut RasterPathCache,
    rng: &'s mut StdRng,
    /// Random terms already drawn for the current subject
    draws: Vec<(Expr, f64)>,
}

fn raster<'s, 'a>(sources: &'s CostSources<'a>, index: usize) -> Result<&'s RasterInput<'a>> {
    sources.rasters.get(index).ok_or_else(|| {
        GraphError::collaborator("raster", format!("raster {index} is not configured"))
    })
}

fn polygon_layer<'s, 'a>(
    sources: &'s CostSources<'a>,
    index: usize,
) -> Result<&'s dyn PolygonPredicate> {
    sources.polygons.get(index).copied().ok_or_else(|| {
        GraphError::collaborator("polygon", format!("polygon layer {index} is not configured"))
    })
}

impl<'s, 'a> Scope<'s, 'a> {
    fn invalid(&self, reason: String) -> GraphError {
        GraphError::FormulaValidation {
            index: self.formula.index,
            reason,
        }
    }

    fn feature(&self, subject: &Subject) -> Option<&'s Feature> {
        match *subject {
            Subject::Edge { id, .. } => {
                if let Some(feature) = self
                    .graph
                    .edge_feature(id)
                    .and_then(|f| self.sources.line_features.get(&f))
                {
                    return Some(feature);
                }
                let to = self.graph.edge(id)?.to;
                self.graph
                    .vertex_feature(to)
                    .and_then(|f| self.sources.point_features.get(&f))
            }
            Subject::Vertex { id, .. } => self
                .graph
                .vertex_feature(id)
                .and_then(|f| self.sources.point_features.get(&f)),
        }
    }

    fn field(&self, name: &str, subject: &Subject) -> Result<f64> {
        let feature = self.feature(subject).ok_or_else(|| {
            let what = match subject {
                Subject::Edge { id, .. } => format!("edge {id}"),
                Subject::Vertex { id, .. } => format!("vertex {id}"),
            };
            GraphError::collaborator("features", format!("no feature matched to {what}"))
        })?;
        let value = feature.attribute(name).ok_or_else(|| {
            GraphError::collaborator(
                "features",
                format!("feature {} has no field '{name}'", feature.id),
            )
        })?;
        value.as_number().ok_or_else(|| {
            let shown = match value {
                AttributeValue::Text(s) => s.clone(),
                other => format!("{other:?}"),
            };
            GraphError::collaborator(
                "features",
                format!("field '{name}' of feature {} is not numeric: '{shown}'", feature.id),
            )
        })
    }

    fn samples(&mut self, source: PixelSource, subject: &Subject) -> Result<Cow<'_, [RasterSample]>> {
        let input = *raster(self.sources, source.raster())?;
        match (*subject, source) {
            (Subject::Vertex { coord, .. }, _) => Ok(Cow::Owned(vec![
                input.source.sample_point(input.band, coord)?,
            ])),
            (Subject::Edge { position, .. }, PixelSource::Line { raster }) => self
                .line_samples
                .get(&raster)
                .and_then(|per_edge| per_edge.get(position))
                .map(|s| Cow::Borrowed(s.as_slice()))
                .ok_or_else(|| {
                    GraphError::collaborator("raster", format!("raster {raster} was not sampled"))
                }),
            (Subject::Edge { from, to, .. }, PixelSource::Path { raster, heuristic }) => Ok(
                Cow::Borrowed(
                    self.paths
                        .path(raster, input.source, input.band, heuristic, from, to)?,
                ),
            ),
        }
    }

    /// Cost of one edge or vertex. Identical random terms share one draw.
    fn cost(&mut self, subject: &Subject) -> Result<f64> {
        self.draws.clear();
        let formula = self.formula;
        self.eval(&formula.expr, subject)
    }

    fn eval(&mut self, expr: &Expr, subject: &Subject) -> Result<f64> {
        Ok(match expr {
            Expr::Literal(v) => *v,
            Expr::Distance(metric) => match subject {
                Subject::Edge { from, to, .. } => {
                    metric.measure(*from, *to, self.graph.ellipsoid())
                }
                Subject::Vertex { .. } => 0.0,
            },
            Expr::Field(name) => self.field(name, subject)?,
            Expr::RasterStat { source, stat } => {
                raster_stats::compute(*stat, &self.samples(*source, subject)?)
            }
            Expr::RasterPathLength {
                raster,
                heuristic,
                metric,
            } => {
                if let Subject::Vertex { .. } = subject {
                    return Ok(0.0);
                }
                let ellipsoid = *self.graph.ellipsoid();
                let path = self.samples(
                    PixelSource::Path {
                        raster: *raster,
                        heuristic: *heuristic,
                    },
                    subject,
                )?;
                path.windows(2)
                    .map(|pair| metric.measure(pair[0].coord, pair[1].coord, &ellipsoid))
                    .sum()
            }
            Expr::Polygon { index, test } => {
                let hit = match *subject {
                    Subject::Edge { id, .. } => self
                        .polygon_hits
                        .get(&(*index, *test))
                        .is_some_and(|ids| ids.contains(&id)),
                    Subject::Vertex { coord, .. } => match test {
                        PolygonTest::Inside => polygon_layer(self.sources, *index)?.contains_point(coord)?,
                        PolygonTest::Crosses => false,
                    },
                };
                if hit { 1.0 } else { 0.0 }
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.condition(condition, subject)? {
                    self.eval(then, subject)?
                } else {
                    self.eval(otherwise, subject)?
                }
            }
            Expr::MathCall { function, args } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a, subject))
                    .collect::<Result<Vec<f64>>>()?;
                function.apply(&values).ok_or_else(|| {
                    self.invalid(format!(
                        "math.{} is undefined for {values:?}",
                        format!("{function:?}").to_lowercase()
                    ))
                })?
            }
            Expr::RandomRange { low, high } => {
                if let Some((_, drawn)) = self.draws.iter().find(|(term, _)| term == expr) {
                    return Ok(*drawn);
                }
                let low = self.eval(low, subject)?;
                let high = self.eval(high, subject)?;
                if !low.is_finite() || !high.is_finite() {
                    return Err(self.invalid(format!(
                        "random range bounds {low} and {high} are not finite"
                    )));
                }
                let drawn = if low > high {
                    0.0
                } else if low.fract() == 0.0 && high.fract() == 0.0 {
                    self.rng.random_range(low as i64..=high as i64) as f64
                } else {
                    self.rng.random_range(low..=high)
                };
                self.draws.push((expr.clone(), drawn));
                drawn
            }
            Expr::Neg(inner) => -self.eval(inner, subject)?,
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, subject)?;
                let rhs = self.eval(rhs, subject)?;
                match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                }
            }
        })
    }

    fn condition(&mut self, condition: &Condition, subject: &Subject) -> Result<bool> {
        Ok(match condition {
            Condition::Or(a, b) => self.condition(a, subject)? || self.condition(b, subject)?,
            Condition::And(a, b) => self.condition(a, subject)? && self.condition(b, subject)?,
            Condition::Not(inner) => !self.condition(inner, subject)?,
            Condition::Compare { op, lhs, rhs } => {
                let lhs = self.eval(lhs, subject)?;
                let rhs = self.eval(rhs, subject)?;
                op.apply(lhs, rhs)
            }
            Condition::Pixels {
                source,
                aggregate,
                op,
                rhs,
            } => {
                let threshold = self.eval(rhs, subject)?;
                let samples = self.samples(*source, subject)?;
                raster_stats::pixels_satisfy(&samples, *aggregate, *op, threshold)
            }
            Condition::Truthy(expr) => self.eval(expr, subject)? != 0.0,
        })
    }
}

/// Costs of every edge in `graph`, in edge position order.
///
/// Rasters under straight edges and polygon predicates are resolved once for
/// the whole pass. Returns `None` when `cancel` fires.
#[allow(clippy::too_many_arguments)]
pub(super) fn edge_costs(
    graph: &Graph,
    sources: &CostSources<'_>,
    paths: &mut RasterPathCache,
    formula: &Formula,
    rng: &mut StdRng,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
    share: (usize, usize),
) -> Result<Option<Vec<f64>>> {
    let edges: Vec<(EdgeId, Line)> = graph
        .edges()
        .map(|e| graph.edge_line(e.id).map(|line| (e.id, line)))
        .collect::<Result<_>>()?;

    let mut line_samples = AHashMap::new();
    for raster_index in &formula.references.line_rasters {
        let input = *raster(sources, *raster_index)?;
        let mut per_edge = Vec::with_capacity(edges.len());
        for (_, line) in &edges {
            if cancel.is_canceled() {
                return Ok(None);
            }
            per_edge.push(input.source.sample_line(input.band, line)?);
        }
        line_samples.insert(*raster_index, per_edge);
    }

    let mut polygon_hits = AHashMap::new();
    for (index, test) in &formula.references.polygons {
        if cancel.is_canceled() {
            return Ok(None);
        }
        let predicate = match test {
            PolygonTest::Crosses => SpatialPredicate::Crosses,
            PolygonTest::Inside => SpatialPredicate::Within,
        };
        let hits = polygon_layer(sources, *index)?.select(predicate, &edges)?;
        polygon_hits.insert((*index, *test), hits);
    }

    let mut scope = Scope {
        graph,
        sources,
        formula,
        line_samples,
        polygon_hits,
        paths,
        rng,
        draws: Vec::new(),
    };

    let (done_before, total_formulas) = share;
    let total_units = total_formulas.max(1) * edges.len();
    let mut costs = Vec::with_capacity(edges.len());
    for (position, (id, line)) in edges.iter().enumerate() {
        if cancel.is_canceled() {
            return Ok(None);
        }
        progress.step(Phase::Costs, done_before * edges.len() + position, total_units);
        let subject = Subject::Edge {
            id: *id,
            position,
            from: line.start,
            to: line.end,
        };
        costs.push(scope.cost(&subject)?);
    }
    Ok(Some(costs))
}

/// Costs of every vertex, in vertex position order. Distances are 0 and
/// `crossesPolygon` never holds for a single point.
pub(super) fn vertex_costs(
    graph: &Graph,
    sources: &CostSources<'_>,
    paths: &mut RasterPathCache,
    formula: &Formula,
    rng: &mut StdRng,
    cancel: &CancellationToken,
) -> Result<Option<Vec<f64>>> {
    let mut scope = Scope {
        graph,
        sources,
        formula,
        line_samples: AHashMap::new(),
        polygon_hits: AHashMap::new(),
        paths,
        rng,
        draws: Vec::new(),
    };
    let mut costs = Vec::with_capacity(graph.vertex_count());
    for vertex in graph.vertices() {
        if cancel.is_canceled() {
            return Ok(None);
        }
        let subject = Subject::Vertex {
            id: vertex.id,
            coord: vertex.coord,
        };
        costs.push(scope.cost(&subject)?);
    }
    Ok(Some(costs))
}
