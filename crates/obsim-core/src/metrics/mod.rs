//! Metric time series: data model, the per-service metric catalog,
//! generation and downsampling.

mod aggregate;
mod generator;

pub use aggregate::{aggregate_time_series, detect_anomalies, summarize, SeriesSummary};
pub use generator::{generate_service_metrics, generate_time_series};

use crate::types::{ensure_finite, ensure_probability, EngineError, Result, ServiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metric sample, or one aggregated bucket when `min`/`max` are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl MetricPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            min: None,
            max: None,
        }
    }

    /// Whether this point summarizes a bucket of samples.
    pub fn is_aggregated(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// A chronologically ordered series for one metric of one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub metric_id: String,
    pub metric_name: String,
    pub unit: String,
    pub service_id: ServiceId,

    /// Samples with strictly increasing timestamps
    pub data_points: Vec<MetricPoint>,
    pub last_update: DateTime<Utc>,
}

impl TimeSeries {
    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<&MetricPoint> {
        self.data_points.last()
    }

    pub fn values(&self) -> Vec<f64> {
        self.data_points.iter().map(|p| p.value).collect()
    }
}

/// Shape parameters of one generated metric.
///
/// The value at `t` seconds after the start of the window is
/// `base_value + amplitude * sin(2πt / period_secs) + N(0, noise_std_dev)
/// + trend_per_second * t + anomaly`, clamped to `[min_value, max_value]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricConfig {
    pub metric_id: String,
    pub metric_name: String,
    pub unit: String,
    pub service_id: ServiceId,
    pub base_value: f64,
    pub amplitude: f64,
    pub period_secs: f64,
    pub noise_std_dev: f64,
    pub trend_per_second: f64,

    /// Per-sample probability of a one-sided spike
    pub anomaly_prob: f64,
    pub anomaly_magnitude: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl MetricConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base_value", self.base_value),
            ("amplitude", self.amplitude),
            ("period_secs", self.period_secs),
            ("noise_std_dev", self.noise_std_dev),
            ("trend_per_second", self.trend_per_second),
            ("anomaly_magnitude", self.anomaly_magnitude),
            ("min_value", self.min_value),
            ("max_value", self.max_value),
        ] {
            ensure_finite(&format!("metric {}: {}", self.metric_id, name), value)?;
        }
        if !(self.period_secs > 0.0) {
            return Err(EngineError::config(format!(
                "metric {}: period_secs must be positive, got {}",
                self.metric_id, self.period_secs
            )));
        }
        if self.min_value > self.max_value {
            return Err(EngineError::config(format!(
                "metric {}: min_value {} exceeds max_value {}",
                self.metric_id, self.min_value, self.max_value
            )));
        }
        if self.noise_std_dev < 0.0 {
            return Err(EngineError::config(format!(
                "metric {}: noise_std_dev must not be negative",
                self.metric_id
            )));
        }
        if self.anomaly_magnitude < 0.0 {
            return Err(EngineError::config(format!(
                "metric {}: anomaly_magnitude must not be negative",
                self.metric_id
            )));
        }
        ensure_probability("anomaly_prob", self.anomaly_prob)
    }
}

/// The fixed catalog of metrics generated for every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuUsage,
    MemoryUsage,
    RequestRate,
    ErrorRate,
    LatencyP50,
    LatencyP95,
    LatencyP99,
    ActiveConnections,
    DiskIo,
    NetworkIn,
    NetworkOut,
}

/// Seconds in one seasonal cycle (daily traffic pattern).
const DAY_SECS: f64 = 86_400.0;

impl MetricKind {
    pub const ALL: [MetricKind; 11] = [
        MetricKind::CpuUsage,
        MetricKind::MemoryUsage,
        MetricKind::RequestRate,
        MetricKind::ErrorRate,
        MetricKind::LatencyP50,
        MetricKind::LatencyP95,
        MetricKind::LatencyP99,
        MetricKind::ActiveConnections,
        MetricKind::DiskIo,
        MetricKind::NetworkIn,
        MetricKind::NetworkOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::CpuUsage => "cpu_usage",
            MetricKind::MemoryUsage => "memory_usage",
            MetricKind::RequestRate => "request_rate",
            MetricKind::ErrorRate => "error_rate",
            MetricKind::LatencyP50 => "latency_p50",
            MetricKind::LatencyP95 => "latency_p95",
            MetricKind::LatencyP99 => "latency_p99",
            MetricKind::ActiveConnections => "active_connections",
            MetricKind::DiskIo => "disk_io",
            MetricKind::NetworkIn => "network_in",
            MetricKind::NetworkOut => "network_out",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKind::CpuUsage => "CPU Usage",
            MetricKind::MemoryUsage => "Memory Usage",
            MetricKind::RequestRate => "Request Rate",
            MetricKind::ErrorRate => "Error Rate",
            MetricKind::LatencyP50 => "Latency P50",
            MetricKind::LatencyP95 => "Latency P95",
            MetricKind::LatencyP99 => "Latency P99",
            MetricKind::ActiveConnections => "Active Connections",
            MetricKind::DiskIo => "Disk I/O",
            MetricKind::NetworkIn => "Network In",
            MetricKind::NetworkOut => "Network Out",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::CpuUsage | MetricKind::MemoryUsage | MetricKind::ErrorRate => "%",
            MetricKind::RequestRate => "req/s",
            MetricKind::LatencyP50 | MetricKind::LatencyP95 | MetricKind::LatencyP99 => "ms",
            MetricKind::ActiveConnections => "count",
            MetricKind::DiskIo | MetricKind::NetworkIn | MetricKind::NetworkOut => "MB/s",
        }
    }

    /// Metric shape for this kind, scaled by a per-service `load` factor.
    pub fn config_for(&self, service_id: &str, service_name: &str, load: f64) -> MetricConfig {
        // (base, amplitude, noise, trend/s, anomaly prob, anomaly magnitude, min, max)
        let (base, amplitude, noise, trend, prob, magnitude, min, max) = match self {
            MetricKind::CpuUsage => (45.0, 15.0, 3.0, 0.0, 0.01, 40.0, 0.0, 100.0),
            MetricKind::MemoryUsage => (60.0, 5.0, 1.5, 0.00005, 0.005, 20.0, 0.0, 100.0),
            MetricKind::RequestRate => (250.0, 120.0, 15.0, 0.0, 0.01, 300.0, 0.0, 5000.0),
            MetricKind::ErrorRate => (0.8, 0.3, 0.2, 0.0, 0.02, 8.0, 0.0, 100.0),
            MetricKind::LatencyP50 => (45.0, 10.0, 4.0, 0.0, 0.01, 100.0, 1.0, 10_000.0),
            MetricKind::LatencyP95 => (120.0, 30.0, 10.0, 0.0, 0.015, 400.0, 1.0, 10_000.0),
            MetricKind::LatencyP99 => (250.0, 60.0, 25.0, 0.0, 0.02, 900.0, 1.0, 20_000.0),
            MetricKind::ActiveConnections => (80.0, 40.0, 6.0, 0.0, 0.01, 150.0, 0.0, 10_000.0),
            MetricKind::DiskIo => (25.0, 8.0, 3.0, 0.0, 0.01, 60.0, 0.0, 1000.0),
            MetricKind::NetworkIn => (40.0, 20.0, 4.0, 0.0, 0.01, 80.0, 0.0, 10_000.0),
            MetricKind::NetworkOut => (35.0, 18.0, 4.0, 0.0, 0.01, 70.0, 0.0, 10_000.0),
        };

        // Percentages stay in their natural range regardless of load
        let scale = match self {
            MetricKind::CpuUsage | MetricKind::MemoryUsage | MetricKind::ErrorRate => 1.0,
            _ => load,
        };

        MetricConfig {
            metric_id: format!("{}-{}", service_id, self.as_str()),
            metric_name: format!("{} {}", service_name, self.display_name()),
            unit: self.unit().to_string(),
            service_id: service_id.to_string(),
            base_value: base * scale,
            amplitude: amplitude * scale,
            period_secs: DAY_SECS,
            noise_std_dev: noise * scale,
            trend_per_second: trend,
            anomaly_prob: prob,
            anomaly_magnitude: magnitude * scale,
            min_value: min,
            max_value: max,
        }
    }
}
