//! Simulation configuration.
//!
//! A [`SimulationConfig`] describes the mock service catalog and the knobs of
//! each generation engine. Every field has a default, so an empty TOML
//! document (or no file at all) yields a usable configuration.

use crate::types::{ConfigError, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File name looked up by [`SimulationConfig::load_or_default`].
pub const CONFIG_FILE_NAME: &str = "obsim.toml";

/// Top-level configuration for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub simulation: SimulationSettings,
    pub services: Vec<ServiceSettings>,
    pub traces: TraceSettings,
    pub logs: LogSettings,
    pub alerts: AlertSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            services: default_services(),
            traces: TraceSettings::default(),
            logs: LogSettings::default(),
            alerts: AlertSettings::default(),
        }
    }
}

/// Global window and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Seed for the random source; `None` draws from OS entropy
    pub seed: Option<u64>,

    /// Length of the generated history window in hours
    pub window_hours: u32,

    /// Sample interval for metric series in seconds
    pub metric_interval_secs: u64,

    /// End of the generated window; `None` means "now"
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: None,
            window_hours: 24,
            metric_interval_secs: 60,
            end_time: None,
        }
    }
}

/// One mock microservice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSettings {
    /// Stable identifier (e.g. "svc-api")
    pub id: String,

    /// Display name, also used as the span/log service name
    pub name: String,

    /// Operation names the service exposes in traces
    #[serde(default)]
    pub operations: Vec<String>,
}

impl ServiceSettings {
    pub fn new(id: &str, name: &str, operations: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            operations: operations.iter().map(|op| op.to_string()).collect(),
        }
    }
}

fn default_services() -> Vec<ServiceSettings> {
    vec![
        ServiceSettings::new(
            "svc-gateway",
            "api-gateway",
            &["GET /api/orders", "POST /api/orders", "GET /api/users/:id", "GET /health"],
        ),
        ServiceSettings::new(
            "svc-user",
            "user-service",
            &["getUser", "authenticate", "updateProfile"],
        ),
        ServiceSettings::new(
            "svc-order",
            "order-service",
            &["createOrder", "getOrder", "listOrders", "cancelOrder"],
        ),
        ServiceSettings::new(
            "svc-payment",
            "payment-service",
            &["chargeCard", "refund", "validatePayment"],
        ),
        ServiceSettings::new(
            "svc-inventory",
            "inventory-service",
            &["checkStock", "reserveItems", "releaseItems"],
        ),
    ]
}

/// Trace generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraceSettings {
    /// Number of traces generated per snapshot
    pub count: usize,
    pub min_depth: usize,
    pub max_depth: usize,

    /// Branching probability at the root; decays linearly with depth
    pub branch_probability: f64,
    pub max_children: usize,
    pub duration_min_ms: f64,
    pub duration_max_ms: f64,

    /// Probability that a trace contains an errored span
    pub error_rate: f64,

    /// Probability that a non-errored trace is marked as timed out
    pub timeout_probability: f64,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            count: 200,
            min_depth: 2,
            max_depth: 6,
            branch_probability: 0.7,
            max_children: 3,
            duration_min_ms: 5.0,
            duration_max_ms: 2000.0,
            error_rate: 0.05,
            timeout_probability: 0.01,
        }
    }
}

/// Log stream settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub base_frequency_per_minute: f64,

    /// Business hours as `[start, end)` UTC hour ranges
    pub business_hours: Vec<(u32, u32)>,

    /// Combined ERROR+FATAL share outside error bursts
    pub error_rate_normal: f64,

    /// Combined ERROR+FATAL share inside error bursts
    pub error_rate_peak: f64,
    pub burst_probability_per_minute: f64,
    pub burst_min_minutes: u32,
    pub burst_max_minutes: u32,

    /// Probability that a log entry carries a trace ID
    pub trace_id_probability: f64,

    /// Draw log trace IDs from the generated traces instead of synthetic IDs
    pub link_generated_traces: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            base_frequency_per_minute: 6.0,
            business_hours: vec![(9, 12), (14, 17)],
            error_rate_normal: 0.15,
            error_rate_peak: 0.5,
            burst_probability_per_minute: 0.01,
            burst_min_minutes: 5,
            burst_max_minutes: 15,
            trace_id_probability: 0.3,
            link_generated_traces: false,
        }
    }
}

/// Alert rule and event history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    pub rule_count: usize,

    /// Expected trigger count per rule per day
    pub event_density_per_day: f64,
    pub ack_probability: f64,
    pub duration_min_mins: f64,
    pub duration_max_mins: f64,

    /// Users that acknowledge alerts
    pub users: Vec<String>,

    /// Event count that constitutes an alert storm
    pub storm_threshold: usize,
    pub storm_window_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            rule_count: 12,
            event_density_per_day: 3.0,
            ack_probability: 0.7,
            duration_min_mins: 15.0,
            duration_max_mins: 90.0,
            users: vec![
                "sre-oncall".to_string(),
                "platform-admin".to_string(),
                "ops-lead".to_string(),
            ],
            storm_threshold: 10,
            storm_window_secs: 60,
        }
    }
}

impl SimulationConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded simulation config from {}", path.display());
        Ok(config)
    }

    /// Load `obsim.toml` from the working directory, then from the platform
    /// config directory, falling back to defaults when neither exists.
    pub fn load_or_default() -> Result<Self> {
        for candidate in Self::search_paths() {
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }
        tracing::debug!("No {} found, using default configuration", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("dev", "obsim", "obsim") {
            paths.push(dirs.config_dir().join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Internal(anyhow::anyhow!("Failed to serialize config: {}", e))
        })
    }

    /// Check every bound the engines rely on.
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if sim.window_hours == 0 {
            return invalid("simulation.window_hours must be positive");
        }
        if sim.metric_interval_secs == 0 {
            return invalid("simulation.metric_interval_secs must be positive");
        }

        if self.services.len() < 2 {
            return invalid("at least two services are required");
        }
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.id.trim().is_empty() || service.name.trim().is_empty() {
                return invalid("service id and name must not be empty");
            }
            if !seen.insert(service.id.as_str()) {
                return invalid(format!("duplicate service id: {}", service.id));
            }
        }

        let traces = &self.traces;
        if traces.min_depth == 0 {
            return invalid("traces.min_depth must be at least 1");
        }
        if traces.min_depth > traces.max_depth {
            return invalid(format!(
                "traces.min_depth ({}) exceeds traces.max_depth ({})",
                traces.min_depth, traces.max_depth
            ));
        }
        if traces.max_children == 0 {
            return invalid("traces.max_children must be at least 1");
        }
        check_finite("traces.duration_min_ms", traces.duration_min_ms)?;
        check_finite("traces.duration_max_ms", traces.duration_max_ms)?;
        if traces.duration_min_ms < 0.0 || traces.duration_min_ms > traces.duration_max_ms {
            return invalid("traces.duration_min_ms must be within [0, duration_max_ms]");
        }
        check_probability("traces.branch_probability", traces.branch_probability)?;
        check_probability("traces.error_rate", traces.error_rate)?;
        check_probability("traces.timeout_probability", traces.timeout_probability)?;

        let logs = &self.logs;
        check_finite("logs.base_frequency_per_minute", logs.base_frequency_per_minute)?;
        if logs.base_frequency_per_minute < 0.0 {
            return invalid("logs.base_frequency_per_minute must not be negative");
        }
        for &(start, end) in &logs.business_hours {
            if start >= end || end > 24 {
                return invalid(format!("logs.business_hours range {}-{} is invalid", start, end));
            }
        }
        if logs.burst_min_minutes > logs.burst_max_minutes {
            return invalid("logs.burst_min_minutes exceeds logs.burst_max_minutes");
        }
        check_probability("logs.error_rate_normal", logs.error_rate_normal)?;
        check_probability("logs.error_rate_peak", logs.error_rate_peak)?;
        check_probability(
            "logs.burst_probability_per_minute",
            logs.burst_probability_per_minute,
        )?;
        check_probability("logs.trace_id_probability", logs.trace_id_probability)?;

        let alerts = &self.alerts;
        check_finite("alerts.event_density_per_day", alerts.event_density_per_day)?;
        check_finite("alerts.duration_min_mins", alerts.duration_min_mins)?;
        check_finite("alerts.duration_max_mins", alerts.duration_max_mins)?;
        if alerts.event_density_per_day < 0.0 {
            return invalid("alerts.event_density_per_day must not be negative");
        }
        if alerts.duration_min_mins < 0.0 || alerts.duration_min_mins > alerts.duration_max_mins {
            return invalid("alerts.duration_min_mins must be within [0, duration_max_mins]");
        }
        check_probability("alerts.ack_probability", alerts.ack_probability)?;
        if alerts.storm_window_secs == 0 {
            return invalid("alerts.storm_window_secs must be positive");
        }

        Ok(())
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(ConfigError::Invalid(message.into()))
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return invalid(format!("{} must be a finite number, got {}", name, value));
    }
    Ok(())
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return invalid(format!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}
