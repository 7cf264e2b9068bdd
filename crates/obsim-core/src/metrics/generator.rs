use super::{MetricConfig, MetricKind, MetricPoint, TimeSeries};
use crate::random::RandomSource;
use crate::types::{EngineError, Result};
use chrono::{DateTime, Duration, Utc};
use std::f64::consts::PI;

/// Generate one metric over `[start, end)` with one sample every
/// `interval_secs`.
pub fn generate_time_series(
    config: &MetricConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_secs: u64,
    rng: &mut RandomSource,
) -> Result<TimeSeries> {
    config.validate()?;
    if interval_secs == 0 {
        return Err(EngineError::config("interval_secs must be positive"));
    }
    if end < start {
        return Err(EngineError::config(format!(
            "time range end {} precedes start {}",
            end, start
        )));
    }

    let total_secs = (end - start).num_seconds().max(0) as u64;
    let sample_count = total_secs.div_ceil(interval_secs) as usize;
    if sample_count == 0 {
        tracing::debug!("Empty time range for metric {}", config.metric_id);
    }

    let mut data_points = Vec::with_capacity(sample_count);
    for k in 0..sample_count as u64 {
        let elapsed = k * interval_secs;
        let timestamp = start + Duration::seconds(elapsed as i64);
        data_points.push(MetricPoint::new(
            timestamp,
            sample_value(config, elapsed as f64, rng),
        ));
    }

    let last_update = data_points.last().map(|p| p.timestamp).unwrap_or(start);

    Ok(TimeSeries {
        metric_id: config.metric_id.clone(),
        metric_name: config.metric_name.clone(),
        unit: config.unit.clone(),
        service_id: config.service_id.clone(),
        data_points,
        last_update,
    })
}

fn sample_value(config: &MetricConfig, t: f64, rng: &mut RandomSource) -> f64 {
    let seasonal = config.amplitude * (2.0 * PI * t / config.period_secs).sin();
    let noise = rng.gaussian(0.0, config.noise_std_dev);
    let trend = config.trend_per_second * t;

    // Spikes only ever push the value up
    let anomaly = if rng.chance(config.anomaly_prob) {
        rng.exponential_random(0.0, 1.0) * config.anomaly_magnitude
    } else {
        0.0
    };

    (config.base_value + seasonal + noise + trend + anomaly)
        .clamp(config.min_value, config.max_value)
}

/// Generate the full metric catalog for one service.
pub fn generate_service_metrics(
    service_id: &str,
    service_name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_secs: u64,
    rng: &mut RandomSource,
) -> Result<Vec<TimeSeries>> {
    let load = rng.uniform(0.8, 1.2);
    let series = MetricKind::ALL
        .iter()
        .map(|kind| {
            let config = kind.config_for(service_id, service_name, load);
            generate_time_series(&config, start, end, interval_secs, rng)
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        "Generated {} metric series for service {} ({} points each)",
        series.len(),
        service_id,
        series.first().map(|s| s.data_points.len()).unwrap_or(0)
    );
    Ok(series)
}
