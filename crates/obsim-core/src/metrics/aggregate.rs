use super::{MetricPoint, TimeSeries};
use crate::random::{mean, outlier_threshold, percentile, standard_deviation};
use serde::{Deserialize, Serialize};

/// Downsample `points` to at most `max_points` buckets.
///
/// Series that already fit (or `max_points == 0`) come back unchanged.
/// Otherwise the points are split into exactly `max_points` contiguous
/// buckets of `len / max_points` samples, the last bucket absorbing the
/// remainder. Each bucket becomes one point stamped with its first timestamp,
/// carrying the mean as `value` and the bucket extremes as `min`/`max` so a
/// renderer can still draw the spike envelope.
pub fn aggregate_time_series(points: &[MetricPoint], max_points: usize) -> Vec<MetricPoint> {
    if max_points == 0 || points.len() <= max_points {
        return points.to_vec();
    }

    let bucket_size = points.len() / max_points;
    (0..max_points)
        .map(|bucket| {
            let start = bucket * bucket_size;
            let end = if bucket + 1 == max_points {
                points.len()
            } else {
                start + bucket_size
            };
            summarize_bucket(&points[start..end])
        })
        .collect()
}

fn summarize_bucket(bucket: &[MetricPoint]) -> MetricPoint {
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for point in bucket {
        // Re-aggregating keeps the envelope of earlier buckets
        low = low.min(point.min.unwrap_or(point.value));
        high = high.max(point.max.unwrap_or(point.value));
        sum += point.value;
    }

    MetricPoint {
        timestamp: bucket[0].timestamp,
        value: sum / bucket.len() as f64,
        min: Some(low),
        max: Some(high),
    }
}

/// Descriptive statistics of one series.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
    pub latest: Option<f64>,
}

/// Summarize a series; an empty series yields a zeroed summary.
pub fn summarize(series: &TimeSeries) -> SeriesSummary {
    let values = series.values();
    if values.is_empty() {
        return SeriesSummary::default();
    }

    SeriesSummary {
        count: values.len(),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: mean(&values),
        p50: percentile(&values, 50.0),
        p95: percentile(&values, 95.0),
        p99: percentile(&values, 99.0),
        std_dev: standard_deviation(&values),
        latest: series.latest().map(|p| p.value),
    }
}

/// Points whose value reaches `threshold`, defaulting to the shared outlier
/// cut-off (`mean + 2σ`). Returned in chronological order.
pub fn detect_anomalies(points: &[MetricPoint], threshold: Option<f64>) -> Vec<MetricPoint> {
    let threshold = match threshold {
        Some(t) => t,
        None => {
            let values: Vec<f64> = points.iter().map(|p| p.value).collect();
            match outlier_threshold(&values) {
                Some(t) => t,
                None => return Vec::new(),
            }
        }
    };

    points
        .iter()
        .filter(|p| p.value >= threshold)
        .cloned()
        .collect()
}
