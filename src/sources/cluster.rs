use crate::error::{GraphError, Result};
use geo::Coord;

/// Assigns every point a cluster id in `0..cluster_count`.
pub trait Clusterer {
    fn cluster(&self, points: &[Coord], cluster_count: usize) -> Result<Vec<usize>>;
}

/// Lloyd's k-means seeded by farthest-point initialisation, so a build is
/// reproducible without an RNG.
#[derive(Debug, Clone, Copy)]
pub struct KMeansClusterer {
    pub max_iterations: usize,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        Self { max_iterations: 100 }
    }
}

fn squared_distance(a: Coord, b: Coord) -> f64 {
    (a.x - b.x).powi(2) + (a.y - b.y).powi(2)
}

impl Clusterer for KMeansClusterer {
    fn cluster(&self, points: &[Coord], cluster_count: usize) -> Result<Vec<usize>> {
        if cluster_count == 0 {
            return Err(GraphError::collaborator(
                "clusterer",
                "cluster count must be at least 1",
            ));
        }
        if points.is_empty() {
            return Ok(vec![]);
        }
        if cluster_count >= points.len() {
            return Ok((0..points.len()).collect());
        }

        let mut centers: Vec<Coord> = Vec::with_capacity(cluster_count);
        centers.push(points[0]);
        for _ in 1..cluster_count {
            let mut best_idx = 0;
            let mut best_dist = -1.0;
            for (i, p) in points.iter().enumerate() {
                let min_dist = centers
                    .iter()
                    .map(|ctr| squared_distance(*p, *ctr))
                    .fold(f64::INFINITY, f64::min);
                if min_dist > best_dist {
                    best_dist = min_dist;
                    best_idx = i;
                }
            }
            centers.push(points[best_idx]);
        }

        let mut assignments = vec![usize::MAX; points.len()];

        for _ in 0..self.max_iterations.max(1) {
            let mut changed = false;
            for (i, p) in points.iter().enumerate() {
                let mut best_cluster = 0;
                let mut best_dist = f64::INFINITY;
                for (j, ctr) in centers.iter().enumerate() {
                    let dist = squared_distance(*p, *ctr);
                    if dist < best_dist {
                        best_dist = dist;
                        best_cluster = j;
                    }
                }
                if assignments[i] != best_cluster {
                    assignments[i] = best_cluster;
                    changed = true;
                }
            }

            if !changed {
                break;
            }

            let mut sums = vec![(0.0, 0.0); cluster_count];
            let mut counts = vec![0usize; cluster_count];
            for (p, cluster) in points.iter().zip(assignments.iter()) {
                sums[*cluster].0 += p.x;
                sums[*cluster].1 += p.y;
                counts[*cluster] += 1;
            }
            for j in 0..cluster_count {
                if counts[j] > 0 {
                    centers[j] = Coord {
                        x: sums[j].0 / counts[j] as f64,
                        y: sums[j].1 / counts[j] as f64,
                    };
                }
            }
        }

        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_blobs() {
        let mut points = Vec::new();
        for i in 0..5 {
            points.push(Coord { x: i as f64 * 0.1, y: 0.0 });
            points.push(Coord { x: 100.0 + i as f64 * 0.1, y: 50.0 });
        }
        let ids = KMeansClusterer::default().cluster(&points, 2).unwrap();
        assert_eq!(ids.len(), 10);
        for pair in ids.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(ids.iter().step_by(2).all(|c| *c == ids[0]));
    }

    #[test]
    fn test_degenerate_counts() {
        let points = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }];
        let clusterer = KMeansClusterer::default();
        assert_eq!(clusterer.cluster(&points, 5).unwrap(), vec![0, 1]);
        assert!(clusterer.cluster(&points, 0).is_err());
        assert!(clusterer.cluster(&[], 3).unwrap().is_empty());
    }
}
