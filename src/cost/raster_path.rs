// ===========================================================================
// Cheapest 8-connected pixel paths across a raster, memoised per endpoint pair
// ===========================================================================
use crate::error::{GraphError, Result};
use crate::geometry::euclidean_distance;
use crate::sources::{RasterSample, RasterSource};
use ahash::AHashMap;
use geo::Coord;
use log::debug;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

type Pixel = (usize, usize);

#[derive(Copy, Clone, Eq, PartialEq)]
struct Node {
    priority: OrderedFloat<f64>,
    cell: usize,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.cell.cmp(&other.cell))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Remaining-cost estimate between two pixel centres, in map units.
fn estimate(heuristic: u8, from: Coord, to: Coord) -> f64 {
    let dx = (to.x - from.x).abs();
    let dy = (to.y - from.y).abs();
    match heuristic {
        1 => (dx * dx + dy * dy).sqrt(),
        2 => dx + dy,
        3 => dx.max(dy) + (std::f64::consts::SQRT_2 - 1.0) * dx.min(dy),
        _ => 0.0,
    }
}

fn pixel_of(raster: &dyn RasterSource, band: usize, coord: Coord) -> Result<Pixel> {
    let (col, row) = raster.pixel_at(coord).ok_or_else(|| {
        GraphError::collaborator(
            "raster",
            format!("path endpoint ({}, {}) outside '{}'", coord.x, coord.y, raster.name()),
        )
    })?;
    if raster.value(band, col, row).is_none() {
        return Err(GraphError::collaborator(
            "raster",
            format!("path endpoint ({}, {}) is nodata in '{}'", coord.x, coord.y, raster.name()),
        ));
    }
    Ok((col, row))
}

/// A* from `start` to `goal`. Stepping between neighbours costs the distance
/// between their centres times the mean of their clamped values. Nodata pixels
/// are impassable. `scale` multiplies the heuristic estimate.
pub fn find_pixel_path(
    raster: &dyn RasterSource,
    band: usize,
    start: Pixel,
    goal: Pixel,
    heuristic: u8,
    scale: f64,
) -> Result<Vec<RasterSample>> {
    let (cols, rows) = raster.dimensions();
    let index = |(c, r): Pixel| r * cols + c;
    let pixel = |cell: usize| (cell % cols, cell / cols);
    let weight = |(c, r): Pixel| raster.value(band, c, r).map(|v| v.max(0.0));
    let goal_center = raster.pixel_center(goal.0, goal.1);

    let mut best = vec![f64::INFINITY; cols * rows];
    let mut came_from: Vec<Option<usize>> = vec![None; cols * rows];
    let mut heap = BinaryHeap::new();

    best[index(start)] = 0.0;
    heap.push(Node {
        priority: OrderedFloat(0.0),
        cell: index(start),
    });

    while let Some(Node { cell, .. }) = heap.pop() {
        if cell == index(goal) {
            break;
        }
        let current = pixel(cell);
        let Some(current_weight) = weight(current) else {
            continue;
        };
        let center = raster.pixel_center(current.0, current.1);

        for (dc, dr) in NEIGHBOURS {
            let (Some(c), Some(r)) = (
                current.0.checked_add_signed(dc),
                current.1.checked_add_signed(dr),
            ) else {
                continue;
            };
            if c >= cols || r >= rows {
                continue;
            }
            let Some(next_weight) = weight((c, r)) else {
                continue;
            };
            let next_center = raster.pixel_center(c, r);
            let step = euclidean_distance(center, next_center) * (current_weight + next_weight) / 2.0;
            let cost = best[cell] + step;
            let next = index((c, r));
            if cost < best[next] {
                best[next] = cost;
                came_from[next] = Some(cell);
                let priority = cost + scale * estimate(heuristic, next_center, goal_center);
                heap.push(Node {
                    priority: OrderedFloat(priority),
                    cell: next,
                });
            }
        }
    }

    if best[index(goal)].is_infinite() {
        return Err(GraphError::collaborator(
            "raster",
            format!(
                "no path between pixels {start:?} and {goal:?} in '{}'",
                raster.name()
            ),
        ));
    }

    let mut cells = vec![index(goal)];
    let mut cursor = index(goal);
    while let Some(previous) = came_from[cursor] {
        cells.push(previous);
        cursor = previous;
    }
    cells.reverse();

    Ok(cells
        .into_iter()
        .filter_map(|cell| {
            let (col, row) = pixel(cell);
            raster.value(band, col, row).map(|value| RasterSample {
                coord: raster.pixel_center(col, row),
                col,
                row,
                value,
            })
        })
        .collect())
}

/// Pixel paths shared by every edge of a cost assignment phase.
///
/// Paths are keyed by raster, heuristic and the two endpoint pixels. Asking for
/// the reverse of a known path returns the cached one reversed.
#[derive(Default)]
pub struct RasterPathCache {
    paths: AHashMap<(usize, u8), AHashMap<(Pixel, Pixel), Vec<RasterSample>>>,
    scales: AHashMap<usize, f64>,
    searches: usize,
}

impl RasterPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of A* searches actually run.
    pub fn searches(&self) -> usize {
        self.searches
    }

    pub fn path(
        &mut self,
        raster_index: usize,
        raster: &dyn RasterSource,
        band: usize,
        heuristic: u8,
        from: Coord,
        to: Coord,
    ) -> Result<&[RasterSample]> {
        raster.check_band(band)?;
        let start = pixel_of(raster, band, from)?;
        let goal = pixel_of(raster, band, to)?;

        let scale = *self
            .scales
            .entry(raster_index)
            .or_insert_with(|| raster.min_non_negative(band).unwrap_or(0.0));
        let known = self.paths.entry((raster_index, heuristic)).or_default();

        if !known.contains_key(&(start, goal)) {
            let path = match known.get(&(goal, start)) {
                Some(reverse) => reverse.iter().rev().copied().collect(),
                None => {
                    self.searches += 1;
                    debug!(
                        "raster path search {} in '{}' from {start:?} to {goal:?}",
                        self.searches,
                        raster.name()
                    );
                    find_pixel_path(raster, band, start, goal, heuristic, scale)?
                }
            };
            known.insert((start, goal), path);
        }
        Ok(known
            .get(&(start, goal))
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}
