use super::ConnectionContext;
use crate::builder::progress::Phase;
use crate::error::Result;
use crate::graph::{EdgeDirection, Graph, VertexId};
use rand::seq::index::sample;

/// Adds `count` distinct vertex pairs drawn uniformly without replacement.
///
/// Directed builds treat `(a, b)` and `(b, a)` as different pairs. Asking for
/// more pairs than exist connects all of them.
pub fn connect_random(graph: &mut Graph, ctx: &mut ConnectionContext<'_>, count: usize) -> Result<()> {
    let ids = graph.vertex_ids();
    let mut pairs: Vec<(VertexId, VertexId)> = Vec::new();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            pairs.push((ids[i], ids[j]));
            if ctx.direction == EdgeDirection::Directed {
                pairs.push((ids[j], ids[i]));
            }
        }
    }

    let amount = count.min(pairs.len());
    let chosen = sample(&mut *ctx.rng, pairs.len(), amount);
    for (done, idx) in chosen.into_iter().enumerate() {
        if ctx.cancel.is_canceled() {
            return Ok(());
        }
        ctx.progress.step(Phase::Edges, done, amount);
        let (from, to) = pairs[idx];
        graph.add_edge(from, to, None)?;
    }
    Ok(())
}
