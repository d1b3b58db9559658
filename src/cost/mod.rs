//! Formula language for edge and vertex costs.
//!
//! A formula is tokenized, parsed into an [`ast::Expr`] tree, checked against
//! the fields, rasters and polygon layers of a build and then evaluated once
//! per edge by walking the tree.

pub mod ast;
pub mod check;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod raster_path;
pub mod raster_stats;

pub use check::{CheckContext, Formula, NO_ERROR, SyntaxReport};
pub use eval::{CostSources, RasterInput};

use crate::builder::progress::{CancellationToken, ProgressReporter};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use log::debug;
use rand::rngs::StdRng;
use raster_path::RasterPathCache;

/// Compiles and evaluates cost formulas against one set of sources.
///
/// Shortest-path pixel searches are memoised for the lifetime of the engine,
/// so every formula of a build shares them.
pub struct CostEngine<'a> {
    sources: CostSources<'a>,
    paths: RasterPathCache,
}

impl<'a> CostEngine<'a> {
    pub fn new(sources: CostSources<'a>) -> Self {
        Self {
            sources,
            paths: RasterPathCache::new(),
        }
    }

    pub fn sources(&self) -> &CostSources<'a> {
        &self.sources
    }

    pub fn check_context(&self) -> CheckContext {
        CheckContext {
            fields: self.sources.fields.clone(),
            raster_count: self.sources.rasters.len(),
            polygon_count: self.sources.polygons.len(),
        }
    }

    /// Syntax check for editors. Never fails; problems are in the report.
    pub fn check(&self, formula: &str) -> SyntaxReport {
        check::check_syntax(formula, &self.check_context())
    }

    pub fn compile(&self, index: usize, name: &str, formula: &str) -> Result<Formula> {
        check::compile(index, name, formula, &self.check_context()).map_err(|report| {
            let reason = match report.span {
                Some((start, end)) => format!("{} at {start}..{end}", report.message),
                None => report.message,
            };
            GraphError::FormulaValidation { index, reason }
        })
    }

    /// Evaluates `formula` for every edge. `share` is (formulas already
    /// evaluated, formulas in the build) and only drives progress.
    pub fn evaluate_edges(
        &mut self,
        graph: &Graph,
        formula: &Formula,
        rng: &mut StdRng,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
        share: (usize, usize),
    ) -> Result<Option<Vec<f64>>> {
        debug!(
            "evaluating cost function '{}' over {} edges",
            formula.name,
            graph.edge_count()
        );
        eval::edge_costs(
            graph,
            &self.sources,
            &mut self.paths,
            formula,
            rng,
            cancel,
            progress,
            share,
        )
    }

    pub fn evaluate_vertices(
        &mut self,
        graph: &Graph,
        formula: &Formula,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<f64>>> {
        eval::vertex_costs(graph, &self.sources, &mut self.paths, formula, rng, cancel)
    }

    /// Pixel path searches run so far.
    pub fn path_searches(&self) -> usize {
        self.paths.searches()
    }
}
