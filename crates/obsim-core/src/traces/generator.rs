use super::{Span, SpanLog, SpanStatus, Trace, TraceConfig, TraceStatus};
use crate::logs::LogLevel;
use crate::random::RandomSource;
use crate::types::{Attributes, Result};
use chrono::{DateTime, Duration, Utc};

/// Fraction of the parent window within which a child may start.
const CHILD_START_WINDOW: f64 = 0.5;

/// Operation used for services configured without any.
const DEFAULT_OPERATION: &str = "handle";

/// Span under construction. Times are microsecond offsets from the trace
/// start so containment checks stay exact.
#[derive(Debug)]
struct SpanNode {
    span_id: String,
    parent: Option<usize>,
    service: usize,
    operation: String,
    start_us: i64,
    end_us: i64,
    status: SpanStatus,
    tags: Attributes,
    logs: Vec<(i64, LogLevel, String)>,
}

/// Generate one trace.
pub fn generate_trace(config: &TraceConfig, rng: &mut RandomSource) -> Result<Trace> {
    config.validate()?;
    let start = config.start_time.unwrap_or_else(Utc::now);
    Ok(build_trace(config, start, rng))
}

/// Generate `count` traces. Without a configured start they are all rooted
/// at the current time.
pub fn generate_traces(
    config: &TraceConfig,
    count: usize,
    rng: &mut RandomSource,
) -> Result<Vec<Trace>> {
    config.validate()?;
    let start = config.start_time.unwrap_or_else(Utc::now);
    let traces: Vec<Trace> = (0..count).map(|_| build_trace(config, start, rng)).collect();
    tracing::debug!("Generated {} traces", traces.len());
    Ok(traces)
}

/// Generate `count` traces with start times spread uniformly over
/// `[start, end)`, returned in chronological order.
pub fn generate_traces_between(
    config: &TraceConfig,
    count: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rng: &mut RandomSource,
) -> Result<Vec<Trace>> {
    config.validate()?;
    if end < start {
        return Err(crate::types::EngineError::config(format!(
            "time range end {} precedes start {}",
            end, start
        )));
    }

    let span_ms = (end - start).num_milliseconds();
    let mut traces: Vec<Trace> = (0..count)
        .map(|_| {
            let offset = rng.int_between(0, (span_ms - 1).max(0));
            build_trace(config, start + Duration::milliseconds(offset), rng)
        })
        .collect();
    traces.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    tracing::debug!(
        "Generated {} traces between {} and {}",
        traces.len(),
        start,
        end
    );
    Ok(traces)
}

fn build_trace(config: &TraceConfig, start: DateTime<Utc>, rng: &mut RandomSource) -> Trace {
    let trace_id = rng.hex_id(32);

    let root_service = rng.index(config.services.len());
    let root_duration_us = draw_duration_us(config, rng);

    let mut nodes = Vec::new();
    let root_operation = pick_operation(config, root_service, rng);
    build_subtree(
        config,
        rng,
        &mut nodes,
        None,
        root_service,
        root_operation,
        (0, root_duration_us),
        1,
    );

    let status = inject_failures(config, &mut nodes, root_duration_us, rng);

    let mut spans: Vec<Span> = nodes
        .iter()
        .map(|node| to_span(config, &trace_id, start, node, &nodes))
        .collect();
    // Stable: the root (pushed first, offset 0) stays ahead of zero-offset children
    spans.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let root = &nodes[0];
    Trace {
        trace_id,
        root_span_id: root.span_id.clone(),
        root_service: config.services[root.service].name.clone(),
        start_time: start,
        end_time: start + Duration::microseconds(root.end_us),
        total_duration_ms: root.end_us as f64 / 1000.0,
        span_count: spans.len(),
        status,
        spans,
    }
}

/// Append the span for `window` and, recursively, its descendants.
#[allow(clippy::too_many_arguments)]
fn build_subtree(
    config: &TraceConfig,
    rng: &mut RandomSource,
    nodes: &mut Vec<SpanNode>,
    parent: Option<usize>,
    service: usize,
    operation: String,
    window: (i64, i64),
    depth: usize,
) {
    let (start_us, end_us) = window;
    let index = nodes.len();
    nodes.push(SpanNode {
        span_id: rng.hex_id(16),
        parent,
        service,
        operation,
        start_us,
        end_us,
        status: SpanStatus::Success,
        tags: Attributes::new(),
        logs: Vec::new(),
    });

    if depth >= config.max_depth {
        return;
    }

    // Decays linearly so deep levels rarely fan out
    let decay = 1.0 - (depth - 1) as f64 / config.max_depth as f64;
    let forced = depth < config.min_depth;
    if !forced && !rng.chance(config.branch_probability * decay) {
        return;
    }

    let child_count = rng.int_between(1, config.max_children as i64) as usize;
    let parent_len = end_us - start_us;
    for _ in 0..child_count {
        let child_service = pick_other_service(config, service, rng);
        let child_operation = pick_operation(config, child_service, rng);

        let max_offset = (parent_len as f64 * CHILD_START_WINDOW) as i64;
        let child_start = start_us + rng.int_between(0, max_offset);
        let child_len = draw_duration_us(config, rng).min(end_us - child_start);

        build_subtree(
            config,
            rng,
            nodes,
            Some(index),
            child_service,
            child_operation,
            (child_start, child_start + child_len),
            depth + 1,
        );
    }
}

fn draw_duration_us(config: &TraceConfig, rng: &mut RandomSource) -> i64 {
    let ms = rng.exponential_random(config.duration_min_ms, config.duration_max_ms);
    (ms * 1000.0).round() as i64
}

/// Any service except `current`, so spans never call their own service.
fn pick_other_service(config: &TraceConfig, current: usize, rng: &mut RandomSource) -> usize {
    let idx = rng.index(config.services.len() - 1);
    if idx >= current {
        idx + 1
    } else {
        idx
    }
}

fn pick_operation(config: &TraceConfig, service: usize, rng: &mut RandomSource) -> String {
    rng.choose(&config.services[service].operations)
        .cloned()
        .unwrap_or_else(|| DEFAULT_OPERATION.to_string())
}

/// Apply error or timeout injection and return the resulting trace status.
fn inject_failures(
    config: &TraceConfig,
    nodes: &mut [SpanNode],
    root_duration_us: i64,
    rng: &mut RandomSource,
) -> TraceStatus {
    if rng.chance(config.error_rate) {
        let origin = rng.index(nodes.len());
        let message = error_message(config, &nodes[origin], rng);
        let at = nodes[origin].end_us;

        let origin_node = &mut nodes[origin];
        origin_node.logs.push((at, LogLevel::Error, message.clone()));
        origin_node
            .tags
            .insert("error.message".to_string(), message.into());

        // The failure surfaces in every caller up to the root
        let mut current = Some(origin);
        while let Some(idx) = current {
            let node = &mut nodes[idx];
            node.status = SpanStatus::Error;
            node.tags.insert("error".to_string(), true.into());
            current = node.parent;
        }
        return TraceStatus::Error;
    }

    if rng.chance(config.timeout_probability) {
        let root = &mut nodes[0];
        root.status = SpanStatus::Timeout;
        root.tags.insert("error".to_string(), true.into());
        root.logs.push((
            root_duration_us,
            LogLevel::Warn,
            format!("request timed out after {}ms", root_duration_us / 1000),
        ));

        // In-flight downstream work is abandoned
        if nodes.len() > 1 {
            let victim = 1 + rng.index(nodes.len() - 1);
            nodes[victim].status = SpanStatus::Cancelled;
        }
        return TraceStatus::Timeout;
    }

    TraceStatus::Success
}

fn error_message(config: &TraceConfig, node: &SpanNode, rng: &mut RandomSource) -> String {
    const TEMPLATES: [&str; 5] = [
        "connection refused by upstream",
        "deadline exceeded waiting for response",
        "database query failed: lock wait timeout",
        "unexpected status 503 from dependency",
        "null reference while processing request",
    ];
    let template = rng.choose(&TEMPLATES).copied().unwrap_or(TEMPLATES[0]);
    format!(
        "{}: {} ({})",
        config.services[node.service].name, template, node.operation
    )
}

fn to_span(
    config: &TraceConfig,
    trace_id: &str,
    start: DateTime<Utc>,
    node: &SpanNode,
    nodes: &[SpanNode],
) -> Span {
    let service = &config.services[node.service].name;
    let mut tags = node.tags.clone();
    tags.insert("service.name".to_string(), service.as_str().into());
    tags.insert(
        "span.kind".to_string(),
        if node.parent.is_none() { "server" } else { "client" }.into(),
    );
    if let Some((method, route)) = node.operation.split_once(' ') {
        tags.insert("http.method".to_string(), method.into());
        tags.insert("http.route".to_string(), route.into());
        let code: i64 = if node.status == SpanStatus::Success { 200 } else { 500 };
        tags.insert("http.status_code".to_string(), code.into());
    }

    Span {
        span_id: node.span_id.clone(),
        trace_id: trace_id.to_string(),
        parent_span_id: node.parent.map(|p| nodes[p].span_id.clone()),
        service: service.clone(),
        operation: node.operation.clone(),
        start_time: start + Duration::microseconds(node.start_us),
        end_time: start + Duration::microseconds(node.end_us),
        duration_ms: (node.end_us - node.start_us) as f64 / 1000.0,
        status: node.status,
        tags,
        logs: node
            .logs
            .iter()
            .map(|(at, level, message)| SpanLog {
                timestamp: start + Duration::microseconds(*at),
                level: *level,
                message: message.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traces::ServiceProfile;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn config() -> TraceConfig {
        TraceConfig {
            services: vec![
                ServiceProfile::new("gateway", &["GET /orders"]),
                ServiceProfile::new("orders", &["listOrders"]),
                ServiceProfile::new("db", &["query"]),
            ],
            min_depth: 3,
            max_depth: 10,
            branch_probability: 0.6,
            max_children: 3,
            duration_min_ms: 5.0,
            duration_max_ms: 1500.0,
            error_rate: 0.05,
            timeout_probability: 0.0,
            start_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        }
    }

    fn assert_structure(trace: &Trace, config: &TraceConfig) {
        let roots: Vec<&Span> = trace.spans.iter().filter(|s| s.is_root()).collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].span_id, trace.root_span_id);
        assert_eq!(trace.spans[0].span_id, trace.root_span_id);
        assert_eq!(trace.span_count, trace.spans.len());

        let by_id: HashMap<&str, &Span> =
            trace.spans.iter().map(|s| (s.span_id.as_str(), s)).collect();
        assert_eq!(by_id.len(), trace.spans.len(), "span ids are unique");

        for span in &trace.spans {
            assert_eq!(span.trace_id, trace.trace_id);
            assert!(span.end_time >= span.start_time);
            if let Some(parent_id) = &span.parent_span_id {
                let parent = by_id.get(parent_id.as_str()).expect("parent exists");
                assert!(parent.start_time <= span.start_time);
                assert!(span.end_time <= parent.end_time);
                assert_ne!(parent.service, span.service, "no self-calls");
            }
        }

        let depth = trace.max_depth();
        assert!(depth >= config.min_depth && depth <= config.max_depth, "depth {}", depth);
        assert_eq!(trace.has_error(), trace.status == TraceStatus::Error);
    }

    #[test]
    fn test_structural_invariants_hold() {
        let config = config();
        let mut rng = RandomSource::seeded(31);
        for trace in generate_traces(&config, 300, &mut rng).unwrap() {
            assert_structure(&trace, &config);
        }
    }

    #[test]
    fn test_depth_bounds_when_min_equals_max() {
        let config = TraceConfig {
            min_depth: 4,
            max_depth: 4,
            branch_probability: 0.0,
            ..config()
        };
        let mut rng = RandomSource::seeded(32);
        for trace in generate_traces(&config, 50, &mut rng).unwrap() {
            assert_eq!(trace.max_depth(), 4);
        }
    }

    #[test]
    fn test_empirical_error_rate() {
        let config = config();
        let mut rng = RandomSource::seeded(33);
        let traces = generate_traces(&config, 1000, &mut rng).unwrap();
        let errors = traces
            .iter()
            .filter(|t| t.status == TraceStatus::Error)
            .count();
        let rate = errors as f64 / 1000.0;
        assert!((rate - 0.05).abs() <= 0.03, "error rate {}", rate);
    }

    #[test]
    fn test_errors_cascade_to_root() {
        let config = TraceConfig {
            error_rate: 1.0,
            ..config()
        };
        let mut rng = RandomSource::seeded(34);
        let trace = generate_trace(&config, &mut rng).unwrap();
        assert_eq!(trace.status, TraceStatus::Error);
        assert_eq!(trace.root().unwrap().status, SpanStatus::Error);
        assert!(trace.spans.iter().any(|s| !s.logs.is_empty()));
    }

    #[test]
    fn test_timeout_condition() {
        let config = TraceConfig {
            error_rate: 0.0,
            timeout_probability: 1.0,
            ..config()
        };
        let mut rng = RandomSource::seeded(35);
        let trace = generate_trace(&config, &mut rng).unwrap();
        assert_eq!(trace.status, TraceStatus::Timeout);
        assert_eq!(trace.root().unwrap().status, SpanStatus::Timeout);
        assert!(!trace.has_error());
        assert!(trace.spans.iter().any(|s| s.status == SpanStatus::Cancelled));
    }

    #[test]
    fn test_aggregate_fields() {
        let config = config();
        let mut rng = RandomSource::seeded(36);
        let trace = generate_trace(&config, &mut rng).unwrap();
        let root = trace.root().unwrap();
        assert_eq!(trace.start_time, config.start_time.unwrap());
        assert_eq!(trace.end_time, root.end_time);
        assert_eq!(trace.total_duration_ms, root.duration_ms);
        for pair in trace.spans.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut rng = RandomSource::seeded(37);
        let config = TraceConfig {
            min_depth: 5,
            max_depth: 2,
            ..config()
        };
        assert!(generate_trace(&config, &mut rng).is_err());
    }

    #[test]
    fn test_traces_between_are_in_window() {
        let config = config();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = start + Duration::hours(1);
        let mut rng = RandomSource::seeded(38);
        let traces = generate_traces_between(&config, 40, start, end, &mut rng).unwrap();
        assert_eq!(traces.len(), 40);
        for pair in traces.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
        }
        assert!(traces
            .iter()
            .all(|t| t.start_time >= start && t.start_time < end));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let config = config();
        let a = generate_trace(&config, &mut RandomSource::seeded(39)).unwrap();
        let b = generate_trace(&config, &mut RandomSource::seeded(39)).unwrap();
        assert_eq!(a.trace_id, b.trace_id);
        assert_eq!(a.span_count, b.span_count);
        assert_eq!(a.total_duration_ms, b.total_duration_ms);
    }
}
