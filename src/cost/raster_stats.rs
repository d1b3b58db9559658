use super::ast::{CompareOp, PixelAggregate, RasterStat};
use crate::geometry::euclidean_distance;
use crate::sources::RasterSample;
use itertools::{Itertools, MinMaxResult};

fn gradients(samples: &[RasterSample]) -> Vec<f64> {
    samples
        .iter()
        .tuple_windows()
        .filter_map(|(a, b)| {
            let run = euclidean_distance(a.coord, b.coord);
            (run > 0.0).then(|| (b.value - a.value) / run)
        })
        .collect()
}

fn rises(samples: &[RasterSample]) -> impl Iterator<Item = f64> + '_ {
    samples.iter().tuple_windows().map(|(a, b)| b.value - a.value)
}

fn gradient_bounds(samples: &[RasterSample]) -> (f64, f64) {
    match gradients(samples).into_iter().minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => (0.0, 0.0),
        MinMaxResult::OneElement(g) => (g, g),
        MinMaxResult::MinMax(min, max) => (min, max),
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Summarises pixel values in travel order. An empty sequence yields 0.
pub fn compute(stat: RasterStat, samples: &[RasterSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    match stat {
        RasterStat::Sum => values.iter().sum(),
        RasterStat::Mean => mean,
        RasterStat::Median => median(&mut values),
        RasterStat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        RasterStat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        RasterStat::Variance => variance,
        RasterStat::StandDev => variance.sqrt(),
        RasterStat::GradientSum => gradients(samples).iter().sum(),
        RasterStat::GradientMin => gradient_bounds(samples).0,
        RasterStat::GradientMax => gradient_bounds(samples).1,
        RasterStat::Ascent => rises(samples).filter(|d| *d > 0.0).sum(),
        RasterStat::Descent => rises(samples).filter(|d| *d < 0.0).map(f64::abs).sum(),
        RasterStat::TotalClimb => rises(samples).map(f64::abs).sum(),
    }
}

/// Whether enough pixels satisfy `value <op> threshold`.
pub fn pixels_satisfy(
    samples: &[RasterSample],
    aggregate: PixelAggregate,
    op: CompareOp,
    threshold: f64,
) -> bool {
    let hits = samples
        .iter()
        .filter(|s| op.apply(s.value, threshold))
        .count();
    match aggregate {
        PixelAggregate::Any => hits > 0,
        PixelAggregate::Percent(percent) => {
            !samples.is_empty() && hits as f64 * 100.0 / samples.len() as f64 >= percent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn profile(values: &[f64]) -> Vec<RasterSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| RasterSample {
                coord: Coord {
                    x: i as f64 * 2.0,
                    y: 0.0,
                },
                col: i,
                row: 0,
                value: *value,
            })
            .collect()
    }

    #[test]
    fn test_basic_statistics() {
        let samples = profile(&[3.0, 1.0, 4.0, 1.0, 5.0]);
        assert_eq!(compute(RasterStat::Sum, &samples), 14.0);
        assert_eq!(compute(RasterStat::Mean, &samples), 2.8);
        assert_eq!(compute(RasterStat::Median, &samples), 3.0);
        assert_eq!(compute(RasterStat::Min, &samples), 1.0);
        assert_eq!(compute(RasterStat::Max, &samples), 5.0);
        assert!((compute(RasterStat::Variance, &samples) - 2.56).abs() < 1e-9);
        assert!((compute(RasterStat::StandDev, &samples) - 1.6).abs() < 1e-9);
        assert_eq!(compute(RasterStat::Median, &profile(&[1.0, 4.0, 2.0, 3.0])), 2.5);
    }

    #[test]
    fn test_climbing() {
        let samples = profile(&[10.0, 14.0, 12.0, 20.0]);
        assert_eq!(compute(RasterStat::Ascent, &samples), 12.0);
        assert_eq!(compute(RasterStat::Descent, &samples), 2.0);
        assert_eq!(compute(RasterStat::TotalClimb, &samples), 14.0);
        // pixel centres are two units apart
        assert_eq!(compute(RasterStat::GradientMax, &samples), 4.0);
        assert_eq!(compute(RasterStat::GradientMin, &samples), -1.0);
        assert_eq!(compute(RasterStat::GradientSum, &samples), 5.0);
    }

    #[test]
    fn test_single_sample() {
        let samples = profile(&[7.0]);
        assert_eq!(compute(RasterStat::GradientMax, &samples), 0.0);
        assert_eq!(compute(RasterStat::Variance, &samples), 0.0);
        assert_eq!(compute(RasterStat::TotalClimb, &samples), 0.0);
    }

    #[test]
    fn test_pixel_aggregates() {
        let samples = profile(&[1.0, 5.0, 9.0, 2.0]);
        assert!(pixels_satisfy(&samples, PixelAggregate::Any, CompareOp::Gt, 8.0));
        assert!(!pixels_satisfy(&samples, PixelAggregate::Any, CompareOp::Gt, 9.0));
        assert!(pixels_satisfy(&samples, PixelAggregate::Percent(50.0), CompareOp::Ge, 5.0));
        assert!(!pixels_satisfy(&samples, PixelAggregate::Percent(75.0), CompareOp::Ge, 5.0));
    }
}
