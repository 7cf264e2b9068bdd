//! Log streams: entry model, per-service Poisson generation with diurnal
//! modulation and error bursts, querying and statistics.

mod generator;
mod stats;

pub use generator::generate_logs;
pub use stats::{
    calculate_log_statistics, normalize_message, ErrorGroup, LogStatistics, LogTrendBucket,
};

use crate::types::{
    ensure_finite, ensure_probability, Attributes, EngineError, Result, SpanId, TraceId,
};
use chrono::{DateTime, Utc};
use obsim_config::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log entry, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// ERROR or FATAL.
    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Fatal)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            other => Err(EngineError::config(format!("unknown log level: {}", other))),
        }
    }
}

/// One log line emitted by a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: LogLevel,
    pub message: String,

    /// Correlation only; not guaranteed to match a generated trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SpanId>,
    #[serde(default)]
    pub context: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
}

/// Parameters of the log stream generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    pub services: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Mean entries per minute per service before time-of-day modulation
    pub base_frequency_per_minute: f64,

    /// `[start, end)` UTC hour ranges counted as business hours
    pub business_hours: Vec<(u32, u32)>,

    /// ERROR+FATAL share outside bursts
    pub error_rate_normal: f64,

    /// ERROR+FATAL share during bursts
    pub error_rate_peak: f64,
    pub burst_probability_per_minute: f64,
    pub burst_min_minutes: u32,
    pub burst_max_minutes: u32,
    pub trace_id_probability: f64,

    /// Trace IDs to attach; synthetic IDs are drawn when empty
    #[serde(default)]
    pub trace_id_pool: Vec<TraceId>,
}

impl LogConfig {
    /// Build the generator parameters for `[start, end)` from a loaded
    /// simulation config.
    pub fn from_settings(
        config: &SimulationConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let logs = &config.logs;
        Self {
            services: config.services.iter().map(|s| s.name.clone()).collect(),
            start,
            end,
            base_frequency_per_minute: logs.base_frequency_per_minute,
            business_hours: logs.business_hours.clone(),
            error_rate_normal: logs.error_rate_normal,
            error_rate_peak: logs.error_rate_peak,
            burst_probability_per_minute: logs.burst_probability_per_minute,
            burst_min_minutes: logs.burst_min_minutes,
            burst_max_minutes: logs.burst_max_minutes,
            trace_id_probability: logs.trace_id_probability,
            trace_id_pool: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(EngineError::config(format!(
                "log time range start {} must precede end {}",
                self.start, self.end
            )));
        }
        ensure_finite("base_frequency_per_minute", self.base_frequency_per_minute)?;
        if self.base_frequency_per_minute < 0.0 {
            return Err(EngineError::config(
                "base_frequency_per_minute must not be negative",
            ));
        }
        for &(start, end) in &self.business_hours {
            if start >= end || end > 24 {
                return Err(EngineError::config(format!(
                    "business hour range {}-{} is invalid",
                    start, end
                )));
            }
        }
        if self.burst_min_minutes > self.burst_max_minutes {
            return Err(EngineError::config(
                "burst_min_minutes exceeds burst_max_minutes",
            ));
        }
        ensure_probability("error_rate_normal", self.error_rate_normal)?;
        ensure_probability("error_rate_peak", self.error_rate_peak)?;
        ensure_probability(
            "burst_probability_per_minute",
            self.burst_probability_per_minute,
        )?;
        ensure_probability("trace_id_probability", self.trace_id_probability)
    }
}

/// Criteria for selecting log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Accepted levels; empty accepts all
    pub levels: Vec<LogLevel>,

    /// Accepted services; empty accepts all
    pub services: Vec<String>,

    /// Case-insensitive substring of the message
    pub search: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub trace_id: Option<TraceId>,
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }
        if !self.services.is_empty() && !self.services.contains(&entry.service) {
            return false;
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp >= end {
                return false;
            }
        }
        if let Some(trace_id) = &self.trace_id {
            if entry.trace_id.as_ref() != Some(trace_id) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !entry
                .message
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }

    /// Matching entries, newest first, truncated to `limit`.
    pub fn apply<'a>(&self, logs: &'a [LogEntry]) -> Vec<&'a LogEntry> {
        let limit = self.limit.unwrap_or(usize::MAX);
        logs.iter()
            .rev()
            .filter(|entry| self.matches(entry))
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

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
    fn test_level_parsing_and_order() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("FATAL".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Fatal.is_error());
        assert!(!LogLevel::Warn.is_error());
    }

    #[test]
    fn test_query_filters_newest_first() {
        let logs = vec![
            entry(LogLevel::Info, "api", "request served", 0),
            entry(LogLevel::Error, "api", "Database timeout", 1),
            entry(LogLevel::Error, "db", "database timeout", 2),
            entry(LogLevel::Warn, "api", "slow request", 3),
        ];

        let query = LogQuery {
            levels: vec![LogLevel::Error],
            search: Some("DATABASE".to_string()),
            ..LogQuery::default()
        };
        let found = query.apply(&logs);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].service, "db");

        let query = LogQuery {
            services: vec!["api".to_string()],
            limit: Some(2),
            ..LogQuery::default()
        };
        let found = query.apply(&logs);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].message, "slow request");
    }

    #[test]
    fn test_config_rejects_inverted_range() {
        let now = Utc::now();
        let config = LogConfig::from_settings(&SimulationConfig::default(), now, now);
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_config_rejects_nan_frequency() {
        let now = Utc::now();
        let mut config =
            LogConfig::from_settings(&SimulationConfig::default(), now, now + Duration::hours(1));
        assert!(config.validate().is_ok());
        config.base_frequency_per_minute = f64::NAN;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }
}
