use super::{LogEntry, LogLevel};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

const TOP_ERROR_GROUPS: usize = 10;

/// Summary of a set of log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogStatistics {
    pub total: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    pub by_service: BTreeMap<String, usize>,

    /// Fixed-width time buckets covering the entries' time range
    pub trend: Vec<LogTrendBucket>,
    pub bucket_width_secs: i64,

    /// Most frequent ERROR/FATAL message shapes
    pub top_errors: Vec<ErrorGroup>,

    /// ERROR+FATAL share of all entries
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogTrendBucket {
    pub start: DateTime<Utc>,
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Error messages that differ only in IDs and numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorGroup {
    pub message: String,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
}

const ID_PATTERN: &str = r"(?i)\b(?:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|ORD-[0-9a-f]+|[0-9a-f]*\d[0-9a-f]*[a-f][0-9a-f]*|[0-9a-f]*[a-f][0-9a-f]*\d[0-9a-f]*)\b";
const NUMBER_PATTERN: &str = r"\d+(?:\.\d+)*";

fn patterns() -> Option<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| Some((Regex::new(ID_PATTERN).ok()?, Regex::new(NUMBER_PATTERN).ok()?)))
        .as_ref()
}

/// Collapse variable parts of a message: UUIDs and hex-like tokens become
/// `<id>`, remaining digit runs become `<n>`.
pub fn normalize_message(message: &str) -> String {
    let Some((ids, numbers)) = patterns() else {
        return message.to_string();
    };
    let without_ids = ids.replace_all(message, "<id>");
    numbers.replace_all(&without_ids, "<n>").into_owned()
}

/// Bucket width that keeps the trend readable for the covered range.
fn bucket_width(range: Duration) -> Duration {
    if range <= Duration::hours(6) {
        Duration::minutes(5)
    } else if range <= Duration::hours(48) {
        Duration::minutes(30)
    } else {
        Duration::hours(1)
    }
}

pub fn calculate_log_statistics(logs: &[LogEntry]) -> LogStatistics {
    let (Some(first), Some(last)) = (
        logs.iter().map(|l| l.timestamp).min(),
        logs.iter().map(|l| l.timestamp).max(),
    ) else {
        return LogStatistics::default();
    };

    let width = bucket_width(last - first);
    let width_secs = width.num_seconds();
    let bucket_count = ((last - first).num_seconds() / width_secs + 1) as usize;
    let mut trend: Vec<LogTrendBucket> = (0..bucket_count)
        .map(|i| LogTrendBucket {
            start: first + width * i as i32,
            total: 0,
            errors: 0,
            warnings: 0,
        })
        .collect();

    let mut by_level = BTreeMap::new();
    let mut by_service = BTreeMap::new();
    let mut groups: HashMap<String, ErrorGroup> = HashMap::new();
    let mut error_count = 0usize;

    for entry in logs {
        *by_level.entry(entry.level).or_insert(0) += 1;
        *by_service.entry(entry.service.clone()).or_insert(0) += 1;

        let idx = ((entry.timestamp - first).num_seconds() / width_secs) as usize;
        let bucket = &mut trend[idx.min(bucket_count - 1)];
        bucket.total += 1;
        match entry.level {
            LogLevel::Warn => bucket.warnings += 1,
            level if level.is_error() => bucket.errors += 1,
            _ => {}
        }

        if entry.level.is_error() {
            error_count += 1;
            let key = normalize_message(&entry.message);
            groups
                .entry(key.clone())
                .and_modify(|group| {
                    group.count += 1;
                    group.last_seen = group.last_seen.max(entry.timestamp);
                })
                .or_insert(ErrorGroup {
                    message: key,
                    count: 1,
                    last_seen: entry.timestamp,
                });
        }
    }

    let mut top_errors: Vec<ErrorGroup> = groups.into_values().collect();
    top_errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    top_errors.truncate(TOP_ERROR_GROUPS);

    LogStatistics {
        total: logs.len(),
        by_level,
        by_service,
        trend,
        bucket_width_secs: width_secs,
        top_errors,
        error_rate: error_count as f64 / logs.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attributes;
    use chrono::TimeZone;

    fn entry(level: LogLevel, service: &str, message: &str, minute: i64) -> LogEntry {
        LogEntry {
            id: format!("log-{}", minute),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            service: service.to_string(),
            level,
            message: message.to_string(),
            trace_id: None,
            span_id: None,
            context: Attributes::new(),
            stacktrace: None,
        }
    }

    #[test]
    fn test_normalize_message() {
        assert_eq!(
            normalize_message("Failed to process order ORD-1A2B3C4D: payment declined"),
            "Failed to process order <id>: payment declined"
        );
        assert_eq!(
            normalize_message("Database connection timeout after 5321ms"),
            "Database connection timeout after <n>ms"
        );
        assert_eq!(
            normalize_message("request 550e8400-e29b-41d4-a716-446655440000 failed"),
            "request <id> failed"
        );
        assert_eq!(normalize_message("Health check passed"), "Health check passed");
    }

    #[test]
    fn test_empty_statistics() {
        let stats = calculate_log_statistics(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.trend.is_empty());
        assert_eq!(stats.error_rate, 0.0);
    }

    #[test]
    fn test_counts_trend_and_groups() {
        let logs = vec![
            entry(LogLevel::Info, "api", "ok", 0),
            entry(LogLevel::Error, "api", "Upstream /api/orders returned status 502", 1),
            entry(LogLevel::Error, "db", "Upstream /api/orders returned status 503", 7),
            entry(LogLevel::Warn, "api", "Slow query on table orders took 1200ms", 8),
            entry(LogLevel::Fatal, "db", "Out of memory: heap usage exceeded limit", 12),
        ];
        let stats = calculate_log_statistics(&logs);

        assert_eq!(stats.total, 5);
        assert_eq!(stats.by_level[&LogLevel::Error], 2);
        assert_eq!(stats.by_service["db"], 2);
        assert!((stats.error_rate - 0.6).abs() < 1e-12);

        // 12 minute range uses 5 minute buckets
        assert_eq!(stats.bucket_width_secs, 300);
        assert_eq!(stats.trend.len(), 3);
        assert_eq!(stats.trend[0].total, 2);
        assert_eq!(stats.trend[0].errors, 1);
        assert_eq!(stats.trend[1].warnings, 1);
        assert_eq!(stats.trend[2].errors, 1);
        let bucketed: usize = stats.trend.iter().map(|b| b.total).sum();
        assert_eq!(bucketed, stats.total);

        assert_eq!(stats.top_errors[0].message, "Upstream /api/orders returned status <n>");
        assert_eq!(stats.top_errors[0].count, 2);
        assert_eq!(stats.top_errors[0].last_seen, logs[2].timestamp);
    }

    #[test]
    fn test_bucket_width_scales_with_range() {
        assert_eq!(bucket_width(Duration::hours(6)), Duration::minutes(5));
        assert_eq!(bucket_width(Duration::hours(24)), Duration::minutes(30));
        assert_eq!(bucket_width(Duration::days(7)), Duration::hours(1));
    }
}
