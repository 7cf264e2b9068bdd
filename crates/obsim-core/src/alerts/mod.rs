//! Alert rules and their trigger / acknowledge / resolve event history.
//!
//! Events move monotonically through `triggered -> acknowledged -> resolved`;
//! [`acknowledge_alert`] and [`resolve_alert`] never move an event backwards.

mod generator;
mod stats;

pub use generator::{generate_alert_events, generate_alert_rules};
pub use stats::{calculate_alert_statistics, detect_alert_storm, AlertStatistics, AlertStorm};

use crate::types::{ensure_finite, ensure_probability, EngineError, Result, RuleId};
use chrono::{DateTime, Duration, Utc};
use obsim_config::SimulationConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
        }
    }
}

/// Comparison applied between the observed metric and the rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    GreaterThan,
    LessThan,
    Equals,
    NotEquals,
    Contains,
    NotContains,
}

impl AlertCondition {
    /// Whether `observed` breaches `threshold`. The substring conditions
    /// compare the decimal renderings.
    pub fn evaluate(&self, observed: f64, threshold: f64) -> bool {
        match self {
            AlertCondition::GreaterThan => observed > threshold,
            AlertCondition::LessThan => observed < threshold,
            AlertCondition::Equals => (observed - threshold).abs() < f64::EPSILON,
            AlertCondition::NotEquals => (observed - threshold).abs() >= f64::EPSILON,
            AlertCondition::Contains => observed.to_string().contains(&threshold.to_string()),
            AlertCondition::NotContains => {
                !observed.to_string().contains(&threshold.to_string())
            }
        }
    }
}

/// A static alerting rule on one service metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub id: RuleId,
    pub name: String,
    pub description: String,

    /// Service whose metric the rule watches
    pub service: String,

    /// Metric identifier, e.g. `cpu_usage`
    pub metric: String,
    pub condition: AlertCondition,
    pub threshold: f64,

    /// How long the condition must hold before the rule fires
    pub duration_secs: u64,
    pub severity: AlertSeverity,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Editable fields of an [`AlertRule`]; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertRuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub condition: Option<AlertCondition>,
    pub threshold: Option<f64>,
    pub duration_secs: Option<u64>,
    pub severity: Option<AlertSeverity>,
}

impl AlertRule {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn update(&mut self, update: AlertRuleUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(threshold) = update.threshold {
            self.threshold = threshold;
        }
        if let Some(duration_secs) = update.duration_secs {
            self.duration_secs = duration_secs;
        }
        if let Some(severity) = update.severity {
            self.severity = severity;
        }
    }
}

/// One firing of an alert rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub severity: AlertSeverity,
    pub service: String,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Lifecycle position of an event, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Triggered,
    Acknowledged,
    Resolved,
}

impl AlertEvent {
    pub fn state(&self) -> AlertState {
        if self.resolved_at.is_some() {
            AlertState::Resolved
        } else if self.acknowledged {
            AlertState::Acknowledged
        } else {
            AlertState::Triggered
        }
    }

    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Mark `event` acknowledged by `user`. No-op when it is already
/// acknowledged or resolved.
pub fn acknowledge_alert(event: &mut AlertEvent, user: &str, at: DateTime<Utc>) {
    if event.state() != AlertState::Triggered {
        return;
    }
    event.acknowledged = true;
    event.acknowledged_by = Some(user.to_string());
    event.acknowledged_at = Some(at.max(event.triggered_at));
}

/// Mark `event` resolved. No-op when it is already resolved.
pub fn resolve_alert(event: &mut AlertEvent, at: DateTime<Utc>) {
    if event.resolved_at.is_some() {
        return;
    }
    let floor = event.acknowledged_at.unwrap_or(event.triggered_at);
    event.resolved_at = Some(at.max(floor));
}

/// Parameters of rule generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRuleConfig {
    pub services: Vec<String>,
    pub rule_count: usize,
    pub created_at: DateTime<Utc>,
}

impl AlertRuleConfig {
    pub fn from_settings(config: &SimulationConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            services: config.services.iter().map(|s| s.name.clone()).collect(),
            rule_count: config.alerts.rule_count,
            created_at,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rule_count > 0 && self.services.is_empty() {
            return Err(EngineError::config(
                "alert rule generation needs at least one service",
            ));
        }
        Ok(())
    }
}

/// Parameters of event history generation over `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEventConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Expected triggers per enabled rule per day
    pub event_density_per_day: f64,
    pub ack_probability: f64,
    pub duration_min_mins: f64,
    pub duration_max_mins: f64,

    /// Users drawn as `acknowledged_by`
    pub users: Vec<String>,
}

impl AlertEventConfig {
    pub fn from_settings(
        config: &SimulationConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let alerts = &config.alerts;
        Self {
            start,
            end,
            event_density_per_day: alerts.event_density_per_day,
            ack_probability: alerts.ack_probability,
            duration_min_mins: alerts.duration_min_mins,
            duration_max_mins: alerts.duration_max_mins,
            users: alerts.users.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(EngineError::config(format!(
                "alert time range start {} is after end {}",
                self.start, self.end
            )));
        }
        ensure_finite("event_density_per_day", self.event_density_per_day)?;
        ensure_finite("duration_min_mins", self.duration_min_mins)?;
        ensure_finite("duration_max_mins", self.duration_max_mins)?;
        if self.event_density_per_day < 0.0 {
            return Err(EngineError::config(
                "event_density_per_day must not be negative",
            ));
        }
        if self.duration_min_mins < 0.0 || self.duration_min_mins > self.duration_max_mins {
            return Err(EngineError::config(format!(
                "alert duration range {}-{} minutes is invalid",
                self.duration_min_mins, self.duration_max_mins
            )));
        }
        ensure_probability("ack_probability", self.ack_probability)
    }

    /// Window length in fractional days.
    pub fn days(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / Duration::days(1).num_seconds() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> AlertEvent {
        AlertEvent {
            id: "evt-1".to_string(),
            rule_id: "rule-1".to_string(),
            rule_name: "High CPU".to_string(),
            severity: AlertSeverity::Warning,
            service: "api-gateway".to_string(),
            message: "cpu above 80".to_string(),
            triggered_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            resolved_at: None,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let mut evt = event();
        assert_eq!(evt.state(), AlertState::Triggered);

        let ack_at = evt.triggered_at + Duration::minutes(3);
        acknowledge_alert(&mut evt, "sre-oncall", ack_at);
        assert_eq!(evt.state(), AlertState::Acknowledged);
        assert_eq!(evt.acknowledged_by.as_deref(), Some("sre-oncall"));

        // Second acknowledgement keeps the first one
        acknowledge_alert(&mut evt, "ops-lead", ack_at + Duration::minutes(1));
        assert_eq!(evt.acknowledged_by.as_deref(), Some("sre-oncall"));
        assert_eq!(evt.acknowledged_at, Some(ack_at));

        let resolved_at = ack_at + Duration::minutes(10);
        resolve_alert(&mut evt, resolved_at);
        assert_eq!(evt.state(), AlertState::Resolved);
        resolve_alert(&mut evt, resolved_at + Duration::hours(1));
        assert_eq!(evt.resolved_at, Some(resolved_at));
    }

    #[test]
    fn test_resolved_event_ignores_acknowledge() {
        let mut evt = event();
        let at = evt.triggered_at + Duration::minutes(20);
        resolve_alert(&mut evt, at);
        acknowledge_alert(&mut evt, "sre-oncall", at + Duration::minutes(1));

        assert!(!evt.acknowledged);
        assert!(evt.acknowledged_by.is_none());
        assert_eq!(evt.resolved_at, Some(at));
    }

    #[test]
    fn test_transitions_never_precede_trigger() {
        let mut evt = event();
        let before = evt.triggered_at - Duration::minutes(5);
        acknowledge_alert(&mut evt, "ops-lead", before);
        resolve_alert(&mut evt, before);
        assert_eq!(evt.acknowledged_at, Some(evt.triggered_at));
        assert_eq!(evt.resolved_at, Some(evt.triggered_at));
    }

    #[test]
    fn test_rule_update_and_toggle() {
        let mut rule = AlertRule {
            id: "rule-1".to_string(),
            name: "High CPU".to_string(),
            description: "CPU above threshold".to_string(),
            service: "api-gateway".to_string(),
            metric: "cpu_usage".to_string(),
            condition: AlertCondition::GreaterThan,
            threshold: 80.0,
            duration_secs: 300,
            severity: AlertSeverity::Warning,
            enabled: true,
            created_at: Utc::now(),
        };
        rule.set_enabled(false);
        rule.update(AlertRuleUpdate {
            threshold: Some(90.0),
            severity: Some(AlertSeverity::Critical),
            ..AlertRuleUpdate::default()
        });
        assert!(!rule.enabled);
        assert_eq!(rule.threshold, 90.0);
        assert_eq!(rule.severity, AlertSeverity::Critical);
        assert_eq!(rule.name, "High CPU");
    }

    #[test]
    fn test_condition_evaluation_and_casing() {
        assert!(AlertCondition::GreaterThan.evaluate(91.0, 90.0));
        assert!(!AlertCondition::LessThan.evaluate(91.0, 90.0));
        assert!(AlertCondition::Equals.evaluate(5.0, 5.0));
        assert!(AlertCondition::Contains.evaluate(1500.0, 5.0));
        assert_eq!(
            serde_json::to_string(&AlertCondition::NotContains).unwrap(),
            "\"not_contains\""
        );
        assert_eq!(
            serde_json::to_string(&AlertSeverity::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn test_event_config_validation() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = AlertEventConfig::from_settings(&SimulationConfig::default(), start, start);
        assert!(config.validate().is_ok());
        assert_eq!(config.days(), 0.0);

        let config = AlertEventConfig::from_settings(
            &SimulationConfig::default(),
            start + Duration::hours(1),
            start,
        );
        assert!(config.validate().is_err());

        let config = AlertEventConfig::from_settings(
            &SimulationConfig::default(),
            start,
            start + Duration::hours(36),
        );
        assert!(config.validate().is_ok());
        assert!((config.days() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_event_config_rejects_nan_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let base = AlertEventConfig::from_settings(
            &SimulationConfig::default(),
            start,
            start + Duration::days(1),
        );

        let mut config = base.clone();
        config.duration_max_mins = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.duration_min_mins = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = base;
        config.event_density_per_day = f64::INFINITY;
        assert!(config.validate().is_err());
    }
}
