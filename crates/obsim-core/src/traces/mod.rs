//! Distributed traces: span/trace model, randomized span-tree generation and
//! the derived analyses (slow spans, dependency graph, critical path,
//! concurrency).

mod analysis;
mod generator;

pub use analysis::{
    analyze_concurrency, build_service_dependency_graph, calculate_critical_path,
    calculate_trace_stats, detect_slow_spans, ConcurrencyAnalysis, DependencyEdge,
    DependencyGraph, ServiceNode, TraceStatistics,
};
pub use generator::{generate_trace, generate_traces, generate_traces_between};

use crate::logs::LogLevel;
use crate::types::{
    ensure_finite, ensure_probability, Attributes, EngineError, Result, SpanId, TraceId,
};
use chrono::{DateTime, Utc};
use obsim_config::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a single span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

/// Outcome of a whole trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    Success,
    Error,
    Timeout,
}

/// Timestamped event recorded inside a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// One timed operation of one service within a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: SpanId,
    pub trace_id: TraceId,
    pub parent_span_id: Option<SpanId>,
    pub service: String,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: f64,
    pub status: SpanStatus,
    #[serde(default)]
    pub tags: Attributes,
    #[serde(default)]
    pub logs: Vec<SpanLog>,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

/// A complete end-to-end request: a tree of spans with exactly one root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub root_span_id: SpanId,
    pub root_service: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_ms: f64,
    pub span_count: usize,
    pub status: TraceStatus,

    /// Spans ordered by start time; the root comes first
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.span_id == self.root_span_id)
    }

    pub fn span(&self, span_id: &str) -> Option<&Span> {
        self.spans.iter().find(|s| s.span_id == span_id)
    }

    /// Distinct services touched by this trace, in first-seen order.
    pub fn services(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for span in &self.spans {
            if !seen.contains(&span.service.as_str()) {
                seen.push(&span.service);
            }
        }
        seen
    }

    /// Length of the longest root-to-leaf parent chain (the root alone is 1).
    pub fn max_depth(&self) -> usize {
        let parents: HashMap<&str, Option<&str>> = self
            .spans
            .iter()
            .map(|s| (s.span_id.as_str(), s.parent_span_id.as_deref()))
            .collect();

        self.spans
            .iter()
            .map(|span| {
                let mut depth = 1;
                let mut current = span.parent_span_id.as_deref();
                while let Some(parent) = current {
                    depth += 1;
                    // Guard against malformed input with cycles
                    if depth > self.spans.len() {
                        break;
                    }
                    current = parents.get(parent).copied().flatten();
                }
                depth
            })
            .max()
            .unwrap_or(0)
    }

    pub fn has_error(&self) -> bool {
        self.spans.iter().any(|s| s.status == SpanStatus::Error)
    }
}

/// A service that can appear in traces, with the operations it serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceProfile {
    pub name: String,
    pub operations: Vec<String>,
}

impl ServiceProfile {
    pub fn new(name: impl Into<String>, operations: &[&str]) -> Self {
        Self {
            name: name.into(),
            operations: operations.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Parameters of the span-tree generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceConfig {
    pub services: Vec<ServiceProfile>,

    /// Minimum parent-chain depth (root alone counts as 1)
    pub min_depth: usize,
    pub max_depth: usize,

    /// Branching probability at the root, decaying linearly with depth
    pub branch_probability: f64,
    pub max_children: usize,
    pub duration_min_ms: f64,
    pub duration_max_ms: f64,
    pub error_rate: f64,
    pub timeout_probability: f64,

    /// Root start; `None` means now
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::from_settings(&SimulationConfig::default())
    }
}

impl TraceConfig {
    /// Build the generator parameters from a loaded simulation config.
    pub fn from_settings(config: &SimulationConfig) -> Self {
        let settings = &config.traces;
        Self {
            services: config
                .services
                .iter()
                .map(|s| ServiceProfile {
                    name: s.name.clone(),
                    operations: s.operations.clone(),
                })
                .collect(),
            min_depth: settings.min_depth,
            max_depth: settings.max_depth,
            branch_probability: settings.branch_probability,
            max_children: settings.max_children,
            duration_min_ms: settings.duration_min_ms,
            duration_max_ms: settings.duration_max_ms,
            error_rate: settings.error_rate,
            timeout_probability: settings.timeout_probability,
            start_time: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.services.len() < 2 {
            return Err(EngineError::config(
                "trace generation needs at least two services",
            ));
        }
        if self.min_depth == 0 {
            return Err(EngineError::config("min_depth must be at least 1"));
        }
        if self.min_depth > self.max_depth {
            return Err(EngineError::config(format!(
                "min_depth ({}) exceeds max_depth ({})",
                self.min_depth, self.max_depth
            )));
        }
        if self.max_children == 0 {
            return Err(EngineError::config("max_children must be at least 1"));
        }
        ensure_finite("duration_min_ms", self.duration_min_ms)?;
        ensure_finite("duration_max_ms", self.duration_max_ms)?;
        if self.duration_min_ms < 0.0 || self.duration_max_ms <= 0.0 {
            return Err(EngineError::config("span durations must be positive"));
        }
        if self.duration_min_ms > self.duration_max_ms {
            return Err(EngineError::config(format!(
                "duration_min_ms ({}) exceeds duration_max_ms ({})",
                self.duration_min_ms, self.duration_max_ms
            )));
        }
        ensure_probability("branch_probability", self.branch_probability)?;
        ensure_probability("error_rate", self.error_rate)?;
        ensure_probability("timeout_probability", self.timeout_probability)
    }
}

/// Criteria for selecting traces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceFilter {
    /// Trace touches this service
    pub service: Option<String>,
    pub status: Option<TraceStatus>,
    pub min_duration_ms: Option<f64>,
    pub limit: Option<usize>,
}

impl TraceFilter {
    pub fn matches(&self, trace: &Trace) -> bool {
        if let Some(service) = &self.service {
            if !trace.spans.iter().any(|s| &s.service == service) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if trace.status != status {
                return false;
            }
        }
        if let Some(min) = self.min_duration_ms {
            if trace.total_duration_ms < min {
                return false;
            }
        }
        true
    }

    /// Matching traces, newest first, truncated to `limit`.
    pub fn apply<'a>(&self, traces: &'a [Trace]) -> Vec<&'a Trace> {
        let mut matched: Vec<&Trace> = traces.iter().filter(|t| self.matches(t)).collect();
        matched.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}
