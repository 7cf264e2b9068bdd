//! Derived analyses over generated traces.

use super::{Span, SpanStatus, Trace, TraceStatus};
use crate::random::{mean, outlier_threshold, percentile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Spans whose duration reaches `threshold` (default: `mean + 2σ` of the
/// given spans), slowest first.
pub fn detect_slow_spans(spans: &[Span], threshold: Option<f64>) -> Vec<Span> {
    let threshold = match threshold {
        Some(t) => t,
        None => {
            let durations: Vec<f64> = spans.iter().map(|s| s.duration_ms).collect();
            match outlier_threshold(&durations) {
                Some(t) => t,
                None => return Vec::new(),
            }
        }
    };

    let mut slow: Vec<Span> = spans
        .iter()
        .filter(|s| s.duration_ms >= threshold)
        .cloned()
        .collect();
    slow.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
    slow
}

/// Aggregate statistics over a set of traces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceStatistics {
    pub total_traces: usize,
    pub error_traces: usize,
    pub timeout_traces: usize,

    /// Fraction of traces with status ERROR
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub avg_span_count: f64,

    /// Distinct services seen across all traces
    pub service_count: usize,
    pub slowest_trace_id: Option<String>,
}

pub fn calculate_trace_stats(traces: &[Trace]) -> TraceStatistics {
    if traces.is_empty() {
        return TraceStatistics::default();
    }

    let durations: Vec<f64> = traces.iter().map(|t| t.total_duration_ms).collect();
    let span_counts: Vec<f64> = traces.iter().map(|t| t.span_count as f64).collect();
    let error_traces = traces
        .iter()
        .filter(|t| t.status == TraceStatus::Error)
        .count();
    let timeout_traces = traces
        .iter()
        .filter(|t| t.status == TraceStatus::Timeout)
        .count();
    let services: BTreeSet<&str> = traces
        .iter()
        .flat_map(|t| t.spans.iter().map(|s| s.service.as_str()))
        .collect();
    let slowest = traces
        .iter()
        .max_by(|a, b| a.total_duration_ms.total_cmp(&b.total_duration_ms))
        .map(|t| t.trace_id.clone());

    TraceStatistics {
        total_traces: traces.len(),
        error_traces,
        timeout_traces,
        error_rate: error_traces as f64 / traces.len() as f64,
        avg_duration_ms: mean(&durations),
        p50_duration_ms: percentile(&durations, 50.0),
        p95_duration_ms: percentile(&durations, 95.0),
        p99_duration_ms: percentile(&durations, 99.0),
        avg_span_count: mean(&span_counts),
        service_count: services.len(),
        slowest_trace_id: slowest,
    }
}

/// A service in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceNode {
    pub service: String,
    pub span_count: usize,
    pub error_count: usize,
    pub avg_duration_ms: f64,
}

/// Aggregated calls from one service to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub call_count: usize,

    /// Calls whose callee span errored
    pub error_count: usize,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DependencyGraph {
    pub nodes: Vec<ServiceNode>,
    pub edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn edge(&self, source: &str, target: &str) -> Option<&DependencyEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }
}

/// Directed `caller -> callee` service graph built from every parent/child
/// span pair. Nodes and edges are sorted by name.
pub fn build_service_dependency_graph(traces: &[Trace]) -> DependencyGraph {
    let mut node_stats: BTreeMap<&str, (usize, usize, Vec<f64>)> = BTreeMap::new();
    let mut edge_stats: BTreeMap<(&str, &str), (usize, Vec<f64>)> = BTreeMap::new();

    for trace in traces {
        let by_id: HashMap<&str, &Span> =
            trace.spans.iter().map(|s| (s.span_id.as_str(), s)).collect();

        for span in &trace.spans {
            let node = node_stats.entry(span.service.as_str()).or_default();
            node.0 += 1;
            if span.status == SpanStatus::Error {
                node.1 += 1;
            }
            node.2.push(span.duration_ms);

            let parent = span
                .parent_span_id
                .as_deref()
                .and_then(|id| by_id.get(id));
            if let Some(parent) = parent {
                let edge = edge_stats
                    .entry((parent.service.as_str(), span.service.as_str()))
                    .or_default();
                if span.status == SpanStatus::Error {
                    edge.0 += 1;
                }
                edge.1.push(span.duration_ms);
            }
        }
    }

    let nodes = node_stats
        .into_iter()
        .map(|(service, (span_count, error_count, durations))| ServiceNode {
            service: service.to_string(),
            span_count,
            error_count,
            avg_duration_ms: mean(&durations),
        })
        .collect();

    let edges = edge_stats
        .into_iter()
        .map(|((source, target), (error_count, latencies))| DependencyEdge {
            source: source.to_string(),
            target: target.to_string(),
            call_count: latencies.len(),
            error_count,
            avg_latency_ms: mean(&latencies),
            p50_latency_ms: percentile(&latencies, 50.0),
            p95_latency_ms: percentile(&latencies, 95.0),
            p99_latency_ms: percentile(&latencies, 99.0),
        })
        .collect();

    DependencyGraph { nodes, edges }
}

/// Longest-duration root-to-leaf chain: from the root, repeatedly descend
/// into the child whose subtree chain is heaviest.
pub fn calculate_critical_path(trace: &Trace) -> Vec<Span> {
    let Some(root) = trace.root() else {
        return Vec::new();
    };

    let mut children: HashMap<&str, Vec<&Span>> = HashMap::new();
    for span in &trace.spans {
        if let Some(parent) = &span.parent_span_id {
            children.entry(parent.as_str()).or_default().push(span);
        }
    }

    let mut weights: HashMap<&str, f64> = HashMap::new();
    chain_weight(root, &children, &mut weights);

    let mut path = vec![root.clone()];
    let mut current = root;
    while let Some(next) = children.get(current.span_id.as_str()).and_then(|kids| {
        kids.iter()
            .max_by(|a, b| weights[a.span_id.as_str()].total_cmp(&weights[b.span_id.as_str()]))
    }) {
        path.push((*next).clone());
        current = *next;
    }
    path
}

/// Duration of the heaviest chain starting at `span`, memoized per span.
fn chain_weight<'a>(
    span: &'a Span,
    children: &HashMap<&'a str, Vec<&'a Span>>,
    weights: &mut HashMap<&'a str, f64>,
) -> f64 {
    if let Some(weight) = weights.get(span.span_id.as_str()) {
        return *weight;
    }
    let mut heaviest_child: f64 = 0.0;
    if let Some(kids) = children.get(span.span_id.as_str()) {
        for &child in kids {
            heaviest_child = heaviest_child.max(chain_weight(child, children, weights));
        }
    }
    let weight = span.duration_ms + heaviest_child;
    weights.insert(span.span_id.as_str(), weight);
    weight
}

/// Concurrency profile of one trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyAnalysis {
    /// Peak number of simultaneously active spans
    pub max_concurrent: usize,

    /// Mean number of active spans observed at each span start
    pub avg_concurrent: f64,

    /// Sum of span durations divided by the trace duration
    pub parallelization_ratio: f64,
}

/// Sweep-line over span start/end events. Spans that merely touch count as
/// overlapping.
pub fn analyze_concurrency(trace: &Trace) -> ConcurrencyAnalysis {
    if trace.spans.is_empty() {
        return ConcurrencyAnalysis::default();
    }

    // (time, delta): starts sort before ends at the same instant
    let mut events: Vec<(i64, i32)> = Vec::with_capacity(trace.spans.len() * 2);
    for span in &trace.spans {
        let start = micros_since(trace, span.start_time);
        let end = micros_since(trace, span.end_time);
        events.push((start, -1));
        events.push((end, 1));
    }
    events.sort();

    let mut active: i64 = 0;
    let mut max_active: i64 = 0;
    let mut samples = Vec::with_capacity(trace.spans.len());
    for (_, kind) in events {
        if kind < 0 {
            active += 1;
            max_active = max_active.max(active);
            samples.push(active as f64);
        } else {
            active -= 1;
        }
    }

    let busy: f64 = trace.spans.iter().map(|s| s.duration_ms).sum();
    let parallelization_ratio = if trace.total_duration_ms > 0.0 {
        busy / trace.total_duration_ms
    } else {
        0.0
    };

    ConcurrencyAnalysis {
        max_concurrent: max_active as usize,
        avg_concurrent: mean(&samples),
        parallelization_ratio,
    }
}

fn micros_since(trace: &Trace, at: chrono::DateTime<chrono::Utc>) -> i64 {
    (at - trace.start_time).num_microseconds().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::RandomSource;
    use crate::traces::{generate_traces, TraceConfig};
    use crate::types::Attributes;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn span(id: &str, parent: Option<&str>, service: &str, start_ms: i64, end_ms: i64) -> Span {
        Span {
            span_id: id.to_string(),
            trace_id: "t1".to_string(),
            parent_span_id: parent.map(str::to_string),
            service: service.to_string(),
            operation: "op".to_string(),
            start_time: t0() + Duration::milliseconds(start_ms),
            end_time: t0() + Duration::milliseconds(end_ms),
            duration_ms: (end_ms - start_ms) as f64,
            status: SpanStatus::Success,
            tags: Attributes::new(),
            logs: Vec::new(),
        }
    }

    fn trace(spans: Vec<Span>) -> Trace {
        let root = spans[0].clone();
        Trace {
            trace_id: "t1".to_string(),
            root_span_id: root.span_id.clone(),
            root_service: root.service.clone(),
            start_time: root.start_time,
            end_time: root.end_time,
            total_duration_ms: root.duration_ms,
            span_count: spans.len(),
            status: TraceStatus::Success,
            spans,
        }
    }

    /// root(0-100) -> a(0-30) -> c(5-25)
    ///             -> b(20-90)
    fn sample_trace() -> Trace {
        trace(vec![
            span("root", None, "gateway", 0, 100),
            span("a", Some("root"), "users", 0, 30),
            span("c", Some("a"), "db", 5, 25),
            span("b", Some("root"), "orders", 20, 90),
        ])
    }

    #[test]
    fn test_slow_span_default_threshold() {
        let spans: Vec<Span> = [10, 10, 10, 10, 200]
            .iter()
            .enumerate()
            .map(|(i, d)| span(&format!("s{}", i), None, "svc", 0, *d))
            .collect();

        let slow = detect_slow_spans(&spans, None);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].duration_ms, 200.0);
    }

    #[test]
    fn test_slow_span_explicit_threshold_sorted() {
        let spans = sample_trace().spans;
        let slow = detect_slow_spans(&spans, Some(25.0));
        let durations: Vec<f64> = slow.iter().map(|s| s.duration_ms).collect();
        assert_eq!(durations, vec![100.0, 70.0, 30.0]);
        assert!(detect_slow_spans(&[], None).is_empty());
    }

    #[test]
    fn test_critical_path_follows_heaviest_chain() {
        let path = calculate_critical_path(&sample_trace());
        let ids: Vec<&str> = path.iter().map(|s| s.span_id.as_str()).collect();
        // a + c = 50 loses to b = 70
        assert_eq!(ids, vec!["root", "b"]);
    }

    #[test]
    fn test_concurrency_sweep() {
        let analysis = analyze_concurrency(&sample_trace());
        // At t=20: root, a, c, b are all active
        assert_eq!(analysis.max_concurrent, 4);
        assert!((analysis.parallelization_ratio - 2.2).abs() < 1e-9);
        // Starts observe 1, 2, 3, 4 active spans
        assert!((analysis.avg_concurrent - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_dependency_graph_edges() {
        let mut errored = sample_trace();
        errored.spans[3].status = SpanStatus::Error;
        let graph = build_service_dependency_graph(&[sample_trace(), errored]);

        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 3);

        let edge = graph.edge("gateway", "orders").unwrap();
        assert_eq!(edge.call_count, 2);
        assert_eq!(edge.error_count, 1);
        assert_eq!(edge.p50_latency_ms, 70.0);
        assert!(graph.edge("orders", "gateway").is_none());

        let orders = graph.nodes.iter().find(|n| n.service == "orders").unwrap();
        assert_eq!(orders.error_count, 1);
    }

    #[test]
    fn test_trace_stats() {
        let mut rng = RandomSource::seeded(41);
        let traces = generate_traces(&TraceConfig::default(), 200, &mut rng).unwrap();
        let stats = calculate_trace_stats(&traces);

        assert_eq!(stats.total_traces, 200);
        assert!(stats.p50_duration_ms <= stats.p95_duration_ms);
        assert!(stats.p95_duration_ms <= stats.p99_duration_ms);
        assert!(stats.avg_span_count >= 2.0);
        assert!(stats.service_count >= 2);
        assert!(stats.slowest_trace_id.is_some());

        assert_eq!(calculate_trace_stats(&[]), TraceStatistics::default());
    }

    #[test]
    fn test_generated_graph_has_no_self_edges() {
        let mut rng = RandomSource::seeded(42);
        let traces = generate_traces(&TraceConfig::default(), 100, &mut rng).unwrap();
        let graph = build_service_dependency_graph(&traces);
        assert!(!graph.edges.is_empty());
        assert!(graph.edges.iter().all(|e| e.source != e.target));

        for trace in &traces {
            let path = calculate_critical_path(trace);
            assert_eq!(path[0].span_id, trace.root_span_id);
            let concurrency = analyze_concurrency(trace);
            assert!(concurrency.max_concurrent >= 1);
        }
    }
}
