//! Synthetic observability data for a fleet of mock microservices.
//!
//! Each engine is a synchronous function over its config and an explicit
//! [`RandomSource`], so a seeded run is fully reproducible:
//!
//! - **Metrics**: trend + seasonality + noise + one-sided anomaly series,
//!   with bucket downsampling that keeps the min/max envelope
//! - **Traces**: randomized span trees with strict parent/child timing
//!   containment, error cascades and timeouts
//! - **Logs**: per-service Poisson streams modulated by time of day, weekday
//!   and error bursts
//! - **Alerts**: rule templates and a monotonic trigger / acknowledge /
//!   resolve history
//!
//! Each domain also carries its derived analyses (percentiles, slow spans,
//! dependency graph, critical path, log trends, MTTA/MTTR, alert storms).
//! [`MockApi`] wraps one generated snapshot behind an async read/write store.
//!
//! # Usage
//!
//! ```ignore
//! use obsim_core::{generate_traces, calculate_trace_stats, RandomSource, TraceConfig};
//!
//! let mut rng = RandomSource::seeded(42);
//! let traces = generate_traces(&TraceConfig::default(), 100, &mut rng)?;
//! let stats = calculate_trace_stats(&traces);
//! ```

pub mod alerts;
pub mod api;
pub mod logs;
pub mod metrics;
pub mod random;
pub mod traces;
pub mod types;

// Re-export main types for convenience
pub use alerts::{
    acknowledge_alert, calculate_alert_statistics, detect_alert_storm, generate_alert_events,
    generate_alert_rules, resolve_alert, AlertCondition, AlertEvent, AlertEventConfig, AlertRule,
    AlertRuleConfig, AlertRuleUpdate, AlertSeverity, AlertState, AlertStatistics, AlertStorm,
};
pub use api::{MockApi, ServiceSummary, Snapshot};
pub use logs::{
    calculate_log_statistics, generate_logs, normalize_message, ErrorGroup, LogConfig, LogEntry,
    LogLevel, LogQuery, LogStatistics, LogTrendBucket,
};
pub use metrics::{
    aggregate_time_series, detect_anomalies, generate_service_metrics, generate_time_series,
    summarize, MetricConfig, MetricKind, MetricPoint, SeriesSummary, TimeSeries,
};
pub use random::{percentile, RandomSource};
pub use traces::{
    analyze_concurrency, build_service_dependency_graph, calculate_critical_path,
    calculate_trace_stats, detect_slow_spans, generate_trace, generate_traces,
    generate_traces_between, ConcurrencyAnalysis, DependencyEdge, DependencyGraph, ServiceNode,
    ServiceProfile, Span, SpanLog, SpanStatus, Trace, TraceConfig, TraceFilter, TraceStatistics,
    TraceStatus,
};
pub use types::{AttributeValue, Attributes, EngineError, Result};
