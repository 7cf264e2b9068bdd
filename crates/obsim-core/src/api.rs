//! In-memory mock API over one generated snapshot.
//!
//! [`MockApi::generate`] runs every engine once and stores the result. Reads
//! share the snapshot; the alert mutations (enable / disable a rule,
//! acknowledge / resolve an event) go through the store's write lock.

use crate::alerts::{
    self, calculate_alert_statistics, detect_alert_storm, generate_alert_events,
    generate_alert_rules, AlertEvent, AlertEventConfig, AlertRule, AlertRuleConfig,
    AlertRuleUpdate, AlertStatistics, AlertStorm,
};
use crate::logs::{
    calculate_log_statistics, generate_logs, LogConfig, LogEntry, LogQuery, LogStatistics,
};
use crate::metrics::{aggregate_time_series, generate_service_metrics, TimeSeries};
use crate::random::RandomSource;
use crate::traces::{
    build_service_dependency_graph, calculate_critical_path, calculate_trace_stats,
    generate_traces_between, DependencyGraph, Span, Trace, TraceConfig, TraceFilter,
    TraceStatistics,
};
use crate::types::{EngineError, Result, ServiceId};
use chrono::{DateTime, Duration, Utc};
use obsim_config::{ServiceSettings, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Everything generated for one simulation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub services: Vec<ServiceSettings>,

    /// Metric series keyed by service id
    pub metrics: BTreeMap<ServiceId, Vec<TimeSeries>>,
    pub traces: Vec<Trace>,
    pub logs: Vec<LogEntry>,
    pub alert_rules: Vec<AlertRule>,
    pub alert_events: Vec<AlertEvent>,
}

/// Service catalog entry with its current alert load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSummary {
    pub id: ServiceId,
    pub name: String,
    pub operations: Vec<String>,
    pub metric_count: usize,
    pub active_alerts: usize,
}

/// Shared handle to a generated snapshot.
#[derive(Debug, Clone)]
pub struct MockApi {
    snapshot: Arc<RwLock<Snapshot>>,
    storm_threshold: usize,
    storm_window: Duration,
}

impl MockApi {
    /// Wrap an existing snapshot.
    pub fn new(snapshot: Snapshot, config: &SimulationConfig) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            storm_threshold: config.alerts.storm_threshold,
            storm_window: Duration::seconds(config.alerts.storm_window_secs as i64),
        }
    }

    /// Generate a fresh snapshot. `seed` overrides `[simulation] seed`.
    ///
    /// The engines run concurrently on the blocking pool, each with its own
    /// source forked from the root seed. When `[logs] link_generated_traces`
    /// is set, log generation waits for the traces so it can reuse their IDs.
    pub async fn generate(config: &SimulationConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;

        let settings = &config.simulation;
        let window_end = settings.end_time.unwrap_or_else(Utc::now);
        let window_start = window_end - Duration::hours(settings.window_hours as i64);

        let mut root = RandomSource::from_optional_seed(seed.or(settings.seed));
        let mut metrics_rng = root.fork();
        let mut traces_rng = root.fork();
        let mut logs_rng = root.fork();
        let mut alerts_rng = root.fork();

        let services = config.services.clone();
        let interval_secs = settings.metric_interval_secs;
        let metrics_task = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut metrics = BTreeMap::new();
            for service in &services {
                let series = generate_service_metrics(
                    &service.id,
                    &service.name,
                    window_start,
                    window_end,
                    interval_secs,
                    &mut metrics_rng,
                )?;
                metrics.insert(service.id.clone(), series);
            }
            Ok(metrics)
        });

        let trace_config = TraceConfig::from_settings(config);
        let trace_count = config.traces.count;
        let traces_task = tokio::task::spawn_blocking(move || {
            generate_traces_between(
                &trace_config,
                trace_count,
                window_start,
                window_end,
                &mut traces_rng,
            )
        });

        let rule_config = AlertRuleConfig::from_settings(config, window_start);
        let event_config = AlertEventConfig::from_settings(config, window_start, window_end);
        let alerts_task = tokio::task::spawn_blocking(move || -> Result<_> {
            let rules = generate_alert_rules(&rule_config, &mut alerts_rng)?;
            let events = generate_alert_events(&rules, &event_config, &mut alerts_rng)?;
            Ok((rules, events))
        });

        let mut log_config = LogConfig::from_settings(config, window_start, window_end);
        let (traces, logs) = if config.logs.link_generated_traces {
            let traces = join(traces_task).await?;
            log_config.trace_id_pool = traces.iter().map(|t| t.trace_id.clone()).collect();
            let logs = join(tokio::task::spawn_blocking(move || {
                generate_logs(&log_config, &mut logs_rng)
            }))
            .await?;
            (traces, logs)
        } else {
            let logs_task =
                tokio::task::spawn_blocking(move || generate_logs(&log_config, &mut logs_rng));
            (join(traces_task).await?, join(logs_task).await?)
        };
        let metrics = join(metrics_task).await?;
        let (alert_rules, alert_events) = join(alerts_task).await?;

        tracing::info!(
            "Generated snapshot for {} services: {} traces, {} logs, {} alert events",
            config.services.len(),
            traces.len(),
            logs.len(),
            alert_events.len()
        );

        let snapshot = Snapshot {
            generated_at: Utc::now(),
            window_start,
            window_end,
            services: config.services.clone(),
            metrics,
            traces,
            logs,
            alert_rules,
            alert_events,
        };
        Ok(Self::new(snapshot, config))
    }

    /// Copy of the whole snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn list_services(&self) -> Vec<ServiceSummary> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .services
            .iter()
            .map(|service| ServiceSummary {
                id: service.id.clone(),
                name: service.name.clone(),
                operations: service.operations.clone(),
                metric_count: snapshot.metrics.get(&service.id).map_or(0, Vec::len),
                active_alerts: snapshot
                    .alert_events
                    .iter()
                    .filter(|e| e.is_active() && e.service == service.name)
                    .count(),
            })
            .collect()
    }

    /// All metric series of a service, looked up by id or name.
    pub async fn metrics(&self, service: &str) -> Result<Vec<TimeSeries>> {
        let snapshot = self.snapshot.read().await;
        let id = snapshot
            .services
            .iter()
            .find(|s| s.id == service || s.name == service)
            .map(|s| s.id.clone())
            .ok_or_else(|| EngineError::not_found("service", service))?;
        Ok(snapshot.metrics.get(&id).cloned().unwrap_or_default())
    }

    /// One metric series downsampled to at most `max_points` points.
    pub async fn aggregated_metric(
        &self,
        metric_id: &str,
        max_points: usize,
    ) -> Result<TimeSeries> {
        let snapshot = self.snapshot.read().await;
        let series = snapshot
            .metrics
            .values()
            .flatten()
            .find(|s| s.metric_id == metric_id)
            .ok_or_else(|| EngineError::not_found("metric", metric_id))?;

        if max_points == 0 {
            tracing::warn!("max_points of 0 requested for {}, returning raw series", metric_id);
            return Ok(series.clone());
        }
        Ok(TimeSeries {
            data_points: aggregate_time_series(&series.data_points, max_points),
            ..series.clone()
        })
    }

    pub async fn traces(&self, filter: &TraceFilter) -> Vec<Trace> {
        let snapshot = self.snapshot.read().await;
        filter.apply(&snapshot.traces).into_iter().cloned().collect()
    }

    pub async fn trace(&self, trace_id: &str) -> Result<Trace> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .traces
            .iter()
            .find(|t| t.trace_id == trace_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("trace", trace_id))
    }

    pub async fn critical_path(&self, trace_id: &str) -> Result<Vec<Span>> {
        let trace = self.trace(trace_id).await?;
        Ok(calculate_critical_path(&trace))
    }

    pub async fn trace_statistics(&self) -> TraceStatistics {
        calculate_trace_stats(&self.snapshot.read().await.traces)
    }

    pub async fn dependency_graph(&self) -> DependencyGraph {
        build_service_dependency_graph(&self.snapshot.read().await.traces)
    }

    pub async fn logs(&self, query: &LogQuery) -> Vec<LogEntry> {
        let snapshot = self.snapshot.read().await;
        query.apply(&snapshot.logs).into_iter().cloned().collect()
    }

    pub async fn log_statistics(&self) -> LogStatistics {
        calculate_log_statistics(&self.snapshot.read().await.logs)
    }

    pub async fn alert_rules(&self) -> Vec<AlertRule> {
        self.snapshot.read().await.alert_rules.clone()
    }

    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<AlertRule> {
        let mut snapshot = self.snapshot.write().await;
        let rule = find_rule(&mut snapshot, rule_id)?;
        rule.set_enabled(enabled);
        Ok(rule.clone())
    }

    pub async fn update_rule(&self, rule_id: &str, update: AlertRuleUpdate) -> Result<AlertRule> {
        let mut snapshot = self.snapshot.write().await;
        let rule = find_rule(&mut snapshot, rule_id)?;
        rule.update(update);
        Ok(rule.clone())
    }

    /// Alert events, newest first.
    pub async fn alert_events(&self) -> Vec<AlertEvent> {
        let snapshot = self.snapshot.read().await;
        snapshot.alert_events.iter().rev().cloned().collect()
    }

    pub async fn acknowledge_alert(&self, event_id: &str, user: &str) -> Result<AlertEvent> {
        let mut snapshot = self.snapshot.write().await;
        let event = find_event(&mut snapshot, event_id)?;
        alerts::acknowledge_alert(event, user, Utc::now());
        Ok(event.clone())
    }

    pub async fn resolve_alert(&self, event_id: &str) -> Result<AlertEvent> {
        let mut snapshot = self.snapshot.write().await;
        let event = find_event(&mut snapshot, event_id)?;
        alerts::resolve_alert(event, Utc::now());
        Ok(event.clone())
    }

    pub async fn alert_statistics(&self) -> AlertStatistics {
        calculate_alert_statistics(&self.snapshot.read().await.alert_events)
    }

    pub async fn alert_storms(&self) -> Vec<AlertStorm> {
        let snapshot = self.snapshot.read().await;
        detect_alert_storm(&snapshot.alert_events, self.storm_threshold, self.storm_window)
    }
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| EngineError::Internal(anyhow::anyhow!("generation task failed: {}", e)))?
}

fn find_rule<'a>(snapshot: &'a mut Snapshot, rule_id: &str) -> Result<&'a mut AlertRule> {
    snapshot
        .alert_rules
        .iter_mut()
        .find(|r| r.id == rule_id)
        .ok_or_else(|| EngineError::not_found("alert rule", rule_id))
}

fn find_event<'a>(snapshot: &'a mut Snapshot, event_id: &str) -> Result<&'a mut AlertEvent> {
    snapshot
        .alert_events
        .iter_mut()
        .find(|e| e.id == event_id)
        .ok_or_else(|| EngineError::not_found("alert event", event_id))
}
