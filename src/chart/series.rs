//! Series clean-up: dedup, sampling and flat-run removal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Unix seconds
    pub time: i64,
    pub value: f64,
}

impl ChartPoint {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Turn raw `(timestamp, value)` rows, in write order, into a chart series.
pub(crate) fn build_series(
    rows: impl IntoIterator<Item = (i64, Option<f64>)>,
    timeframe: Timeframe,
    max_points: usize,
    epsilon: f64,
) -> Vec<ChartPoint> {
    // Later writes win; BTreeMap leaves the result sorted by time
    let latest: BTreeMap<i64, Option<f64>> = rows.into_iter().collect();

    let points: Vec<ChartPoint> = latest
        .into_iter()
        .filter_map(|(time, value)| {
            value
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| ChartPoint::new(time, v))
        })
        .collect();

    let sampled = if timeframe.is_short() {
        sample_recent_biased(points, max_points)
    } else {
        sample_even(points, max_points)
    };

    if timeframe.drops_flat_runs() {
        drop_flat_runs(sampled, epsilon)
    } else {
        sampled
    }
}

/// Evenly spaced subset of at most `max_points`, always ending with the
/// last point.
pub(crate) fn sample_even(points: Vec<ChartPoint>, max_points: usize) -> Vec<ChartPoint> {
    let len = points.len();
    if len <= max_points {
        return points;
    }

    match max_points {
        0 => Vec::new(),
        1 => points.last().copied().into_iter().collect(),
        n => (0..n)
            .map(|i| points[i * (len - 1) / (n - 1)])
            .collect(),
    }
}

/// Every point of the most recent quarter of the time range, plus an even
/// sample of the older ones in the remaining budget.
pub(crate) fn sample_recent_biased(points: Vec<ChartPoint>, max_points: usize) -> Vec<ChartPoint> {
    if points.len() <= max_points {
        return points;
    }

    // Non-empty past the check above
    let (first, last) = (points[0].time, points[points.len() - 1].time);
    let cutoff = last - (last - first) / 4;
    let split = points.partition_point(|p| p.time < cutoff);
    let recent = points[split..].to_vec();

    // The recent quarter alone is over budget
    if recent.len() >= max_points {
        return sample_even(recent, max_points);
    }

    let older_budget = max_points - recent.len();
    let mut older = points;
    older.truncate(split);

    let mut result = sample_even(older, older_budget);
    result.extend(recent);
    result
}

/// Drop middle points whose kept predecessor and next point are both
/// within `epsilon` of them. First and last are always kept.
pub(crate) fn drop_flat_runs(points: Vec<ChartPoint>, epsilon: f64) -> Vec<ChartPoint> {
    if points.len() <= 2 {
        return points;
    }

    let mut result: Vec<ChartPoint> = Vec::with_capacity(points.len());
    result.push(points[0]);

    for window in points.windows(2).skip(1) {
        let (current, next) = (window[0], window[1]);
        let flat = result
            .last()
            .map(|prev| {
                (prev.value - current.value).abs() < epsilon
                    && (next.value - current.value).abs() < epsilon
            })
            .unwrap_or(false);
        if !flat {
            result.push(current);
        }
    }

    if let Some(last) = points.last() {
        result.push(*last);
    }
    result
}
