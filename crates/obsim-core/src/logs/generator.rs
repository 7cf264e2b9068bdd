use super::{LogConfig, LogEntry, LogLevel};
use crate::random::RandomSource;
use crate::types::{AttributeValue, Attributes, Result};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const BUSINESS_HOURS_MULTIPLIER: f64 = 1.5;
const OFF_HOURS_MULTIPLIER: f64 = 0.3;
const WEEKEND_MULTIPLIER: f64 = 0.6;

const DEBUG_SHARE: f64 = 0.05;
const WARN_SHARE: f64 = 0.30;

/// ERROR:FATAL split of the configured error share.
const FATAL_FRACTION: f64 = 1.0 / 15.0;

/// Generate the merged log stream of all configured services over
/// `[config.start, config.end)`, sorted by timestamp.
pub fn generate_logs(config: &LogConfig, rng: &mut RandomSource) -> Result<Vec<LogEntry>> {
    config.validate()?;

    let mut logs = Vec::new();
    for service in &config.services {
        generate_service_stream(config, service, rng, &mut logs);
    }

    // Stable, so same-instant entries keep their per-service order
    logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    tracing::debug!(
        "Generated {} log entries for {} services",
        logs.len(),
        config.services.len()
    );
    Ok(logs)
}

/// Per-minute Poisson buckets for one service.
fn generate_service_stream(
    config: &LogConfig,
    service: &str,
    rng: &mut RandomSource,
    out: &mut Vec<LogEntry>,
) {
    let mut burst_until: Option<DateTime<Utc>> = None;
    let mut minute = config.start;

    while minute < config.end {
        let bucket_end = (minute + Duration::minutes(1)).min(config.end);
        let bucket_ms = (bucket_end - minute).num_milliseconds();

        if burst_until.is_some_and(|until| minute >= until) {
            burst_until = None;
        }
        if burst_until.is_none() && rng.chance(config.burst_probability_per_minute) {
            let length = rng.int_between(
                config.burst_min_minutes as i64,
                config.burst_max_minutes as i64,
            );
            burst_until = Some(minute + Duration::minutes(length));
        }
        let error_rate = if burst_until.is_some() {
            config.error_rate_peak
        } else {
            config.error_rate_normal
        };

        let rate = config.base_frequency_per_minute
            * rate_multiplier(config, minute)
            * (bucket_ms as f64 / 60_000.0);
        let count = rng.poisson_random(rate);

        for _ in 0..count {
            let offset = rng.int_between(0, bucket_ms - 1);
            let timestamp = minute + Duration::milliseconds(offset);
            out.push(build_entry(config, service, timestamp, error_rate, rng));
        }

        minute = bucket_end;
    }
}

/// Time-of-day and weekday modulation; the factors multiply.
pub(crate) fn rate_multiplier(config: &LogConfig, at: DateTime<Utc>) -> f64 {
    let hour = at.hour();
    let in_business_hours = config
        .business_hours
        .iter()
        .any(|&(start, end)| hour >= start && hour < end);

    let mut multiplier = if in_business_hours {
        BUSINESS_HOURS_MULTIPLIER
    } else {
        OFF_HOURS_MULTIPLIER
    };
    if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
        multiplier *= WEEKEND_MULTIPLIER;
    }
    multiplier
}

/// Categorical level draw with `error_rate` as the ERROR+FATAL share.
///
/// DEBUG and WARN keep their fixed shares while INFO can absorb the
/// difference; past that they shrink proportionally so the weights still
/// sum to one.
fn draw_level(error_rate: f64, rng: &mut RandomSource) -> LogLevel {
    let remainder = 1.0 - error_rate;
    let scale = (remainder / (DEBUG_SHARE + WARN_SHARE)).min(1.0);
    let debug_share = DEBUG_SHARE * scale;
    let warn_share = WARN_SHARE * scale;
    let info_share = (remainder - debug_share - warn_share).max(0.0);
    let weights = [
        debug_share,
        info_share,
        warn_share,
        error_rate * (1.0 - FATAL_FRACTION),
        error_rate * FATAL_FRACTION,
    ];
    rng.weighted_choice(&weights)
        .map(|idx| LogLevel::ALL[idx])
        .unwrap_or(LogLevel::Info)
}

fn build_entry(
    config: &LogConfig,
    service: &str,
    timestamp: DateTime<Utc>,
    error_rate: f64,
    rng: &mut RandomSource,
) -> LogEntry {
    let level = draw_level(error_rate, rng);
    let (message, mut context) = render_message(level, rng);

    context.insert(
        "host".to_string(),
        format!("{}-{}", service, rng.int_between(1, 4)).into(),
    );
    context.insert("request_id".to_string(), rng.uuid().to_string().into());

    let (trace_id, span_id) = if rng.chance(config.trace_id_probability) {
        let trace_id = rng
            .choose(&config.trace_id_pool)
            .cloned()
            .unwrap_or_else(|| rng.hex_id(32));
        (Some(trace_id), Some(rng.hex_id(16)))
    } else {
        (None, None)
    };

    let stacktrace = level
        .is_error()
        .then(|| synthetic_stacktrace(service, &message, rng));

    LogEntry {
        id: rng.uuid().to_string(),
        timestamp,
        service: service.to_string(),
        level,
        message,
        trace_id,
        span_id,
        context,
        stacktrace,
    }
}

const DEBUG_TEMPLATES: &[&str] = &[
    "Cache lookup for key user:{user_id} took {duration}ms",
    "Loaded {count} feature flags from config store",
    "Connection pool stats: active={count} idle={small}",
];

const INFO_TEMPLATES: &[&str] = &[
    "Request completed: {endpoint} status={ok_status} duration={duration}ms",
    "User {user_id} logged in from {ip}",
    "Order {order_id} created with {small} items",
    "Processed batch of {count} messages in {duration}ms",
    "Health check passed",
];

const WARN_TEMPLATES: &[&str] = &[
    "Slow query on table {table} took {slow_duration}ms",
    "Retrying request to {endpoint} (attempt {small}/3)",
    "Connection pool nearly exhausted: {count}/100 in use",
    "Rate limit approaching for client {ip}",
];

const ERROR_TEMPLATES: &[&str] = &[
    "Failed to process order {order_id}: payment declined",
    "Database connection timeout after {slow_duration}ms",
    "Upstream {endpoint} returned status {err_status}",
    "Unhandled exception while serving user {user_id}",
];

const FATAL_TEMPLATES: &[&str] = &[
    "Out of memory: heap usage exceeded limit",
    "Lost connection to primary database, shutting down",
    "Configuration invalid, refusing to start worker {small}",
];

const ENDPOINTS: &[&str] = &[
    "/api/orders",
    "/api/users",
    "/api/payments",
    "/api/inventory",
    "/api/auth/token",
];

const TABLES: &[&str] = &["orders", "users", "payments", "inventory_items"];

const PLACEHOLDER_PATTERN: &str = r"\{(\w+)\}";

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).ok())
        .as_ref()
}

/// Pick a level-appropriate template and fill its placeholders. Numeric
/// substitutions are mirrored into the returned context.
fn render_message(level: LogLevel, rng: &mut RandomSource) -> (String, Attributes) {
    let templates = match level {
        LogLevel::Debug => DEBUG_TEMPLATES,
        LogLevel::Info => INFO_TEMPLATES,
        LogLevel::Warn => WARN_TEMPLATES,
        LogLevel::Error => ERROR_TEMPLATES,
        LogLevel::Fatal => FATAL_TEMPLATES,
    };
    let template = rng.choose(templates).copied().unwrap_or("Event");

    let mut context = Attributes::new();
    let Some(pattern) = placeholder_pattern() else {
        return (template.to_string(), context);
    };
    let message = pattern
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            let value = placeholder_value(name, rng);
            let rendered = value.to_string();
            context.insert(name.to_string(), value);
            rendered
        })
        .into_owned();

    (message, context)
}

fn placeholder_value(name: &str, rng: &mut RandomSource) -> AttributeValue {
    match name {
        "user_id" => AttributeValue::Int(rng.int_between(1000, 99_999)),
        "order_id" => format!("ORD-{}", rng.hex_id(8).to_uppercase()).into(),
        "duration" => AttributeValue::Int(rng.exponential_random(2.0, 800.0).round() as i64),
        "slow_duration" => {
            AttributeValue::Int(rng.exponential_random(1000.0, 30_000.0).round() as i64)
        }
        "count" => AttributeValue::Int(rng.int_between(10, 500)),
        "small" => AttributeValue::Int(rng.int_between(1, 9)),
        "ip" => format!(
            "10.{}.{}.{}",
            rng.int_between(0, 255),
            rng.int_between(0, 255),
            rng.int_between(1, 254)
        )
        .into(),
        "endpoint" => rng.choose(ENDPOINTS).copied().unwrap_or("/").into(),
        "table" => rng.choose(TABLES).copied().unwrap_or("events").into(),
        "ok_status" => AttributeValue::Int(if rng.chance(0.9) { 200 } else { 201 }),
        "err_status" => AttributeValue::Int(*rng.choose(&[500, 502, 503, 504]).unwrap_or(&500)),
        other => AttributeValue::String(other.to_string()),
    }
}

fn synthetic_stacktrace(service: &str, message: &str, rng: &mut RandomSource) -> String {
    let module = service.replace('-', "_");
    format!(
        "Error: {}\n    at {}::handler::process (src/handler.rs:{})\n    at {}::router::dispatch (src/router.rs:{})\n    at runtime::worker::run (src/worker.rs:{})",
        message,
        module,
        rng.int_between(20, 400),
        module,
        rng.int_between(20, 200),
        rng.int_between(50, 150)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::calculate_log_statistics;
    use chrono::TimeZone;
    use obsim_config::SimulationConfig;

    fn config(start: DateTime<Utc>, hours: i64) -> LogConfig {
        LogConfig::from_settings(
            &SimulationConfig::default(),
            start,
            start + Duration::hours(hours),
        )
    }

    // 2024-03-04 is a Monday
    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_stream_is_sorted_and_in_range() {
        let config = config(monday(), 6);
        let mut rng = RandomSource::seeded(51);
        let logs = generate_logs(&config, &mut rng).unwrap();

        assert!(!logs.is_empty());
        for pair in logs.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(logs
            .iter()
            .all(|l| l.timestamp >= config.start && l.timestamp < config.end));
        assert!(logs.iter().all(|l| config.services.contains(&l.service)));
    }

    #[test]
    fn test_multiplier_composition() {
        let config = config(monday(), 1);
        let weekday_business = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let weekday_night = Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap();
        let weekend_business = Utc.with_ymd_and_hms(2024, 3, 9, 15, 30, 0).unwrap();
        let weekend_night = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();

        assert_eq!(rate_multiplier(&config, weekday_business), 1.5);
        assert_eq!(rate_multiplier(&config, weekday_night), 0.3);
        assert!((rate_multiplier(&config, weekend_business) - 0.9).abs() < 1e-12);
        assert!((rate_multiplier(&config, weekend_night) - 0.18).abs() < 1e-12);
    }

    #[test]
    fn test_business_hours_are_busier() {
        let mut config = config(monday(), 24);
        config.burst_probability_per_minute = 0.0;
        let mut rng = RandomSource::seeded(52);
        let logs = generate_logs(&config, &mut rng).unwrap();

        let at_hour = |h: u32| logs.iter().filter(|l| l.timestamp.hour() == h).count();
        assert!(at_hour(10) > at_hour(3) * 2);
    }

    #[test]
    fn test_level_distribution_without_bursts() {
        let mut config = config(monday(), 48);
        config.burst_probability_per_minute = 0.0;
        config.base_frequency_per_minute = 20.0;
        let mut rng = RandomSource::seeded(53);
        let logs = generate_logs(&config, &mut rng).unwrap();

        let stats = calculate_log_statistics(&logs);
        // ERROR+FATAL share matches error_rate_normal (0.15)
        assert!((stats.error_rate - 0.15).abs() < 0.02, "{}", stats.error_rate);
        let info = stats.by_level.get(&LogLevel::Info).copied().unwrap_or(0) as f64;
        assert!((info / stats.total as f64 - 0.50).abs() < 0.03);
    }

    #[test]
    fn test_high_error_rate_is_honored() {
        let mut rng = RandomSource::seeded(58);
        let draws = 20_000;
        let errors = (0..draws)
            .filter(|_| draw_level(0.9, &mut rng).is_error())
            .count() as f64;
        assert!((errors / draws as f64 - 0.9).abs() < 0.015, "{}", errors);

        assert!((0..1000).all(|_| draw_level(1.0, &mut rng).is_error()));
    }

    #[test]
    fn test_bursts_raise_error_share() {
        let mut quiet = config(monday(), 12);
        quiet.burst_probability_per_minute = 0.0;
        let mut noisy = quiet.clone();
        noisy.burst_probability_per_minute = 1.0;

        let quiet_logs = generate_logs(&quiet, &mut RandomSource::seeded(54)).unwrap();
        let noisy_logs = generate_logs(&noisy, &mut RandomSource::seeded(54)).unwrap();
        assert!(
            calculate_log_statistics(&noisy_logs).error_rate
                > calculate_log_statistics(&quiet_logs).error_rate + 0.2
        );
    }

    #[test]
    fn test_trace_linking_uses_pool() {
        let mut config = config(monday(), 2);
        config.trace_id_probability = 1.0;
        config.trace_id_pool = vec!["abc".to_string(), "def".to_string()];
        let mut rng = RandomSource::seeded(55);
        let logs = generate_logs(&config, &mut rng).unwrap();

        assert!(logs.iter().all(|l| {
            matches!(l.trace_id.as_deref(), Some("abc") | Some("def")) && l.span_id.is_some()
        }));

        config.trace_id_probability = 0.0;
        let logs = generate_logs(&config, &mut rng).unwrap();
        assert!(logs.iter().all(|l| l.trace_id.is_none()));
    }

    #[test]
    fn test_error_entries_carry_stacktrace() {
        let config = config(monday(), 4);
        let mut rng = RandomSource::seeded(56);
        let logs = generate_logs(&config, &mut rng).unwrap();
        for entry in &logs {
            assert_eq!(entry.stacktrace.is_some(), entry.level.is_error());
            assert!(!entry.message.contains('{'));
        }
    }

    #[test]
    fn test_placeholders_fill_message_and_context() {
        let mut rng = RandomSource::seeded(59);
        for _ in 0..200 {
            let (message, context) = render_message(LogLevel::Error, &mut rng);
            assert!(!message.contains('{') && !message.contains('}'), "{}", message);
            for (name, value) in &context {
                assert!(!name.is_empty());
                assert!(message.contains(&value.to_string()), "{} missing {}", message, name);
            }
        }
    }

    #[test]
    fn test_malformed_range_fails() {
        let start = monday();
        let config = LogConfig::from_settings(&SimulationConfig::default(), start, start);
        let mut rng = RandomSource::seeded(57);
        assert!(generate_logs(&config, &mut rng).is_err());
    }
}
