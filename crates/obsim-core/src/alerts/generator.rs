use super::{
    AlertCondition, AlertEvent, AlertEventConfig, AlertRule, AlertRuleConfig, AlertSeverity,
};
use crate::random::RandomSource;
use crate::types::Result;
use chrono::Duration;

struct RuleTemplate {
    name: &'static str,
    description: &'static str,
    metric: &'static str,
    condition: AlertCondition,
    threshold: f64,
    duration_secs: u64,
    severity: AlertSeverity,
}

const RULE_TEMPLATES: &[RuleTemplate] = &[
    RuleTemplate {
        name: "High Error Rate",
        description: "Error rate above 5% for 5 minutes",
        metric: "error_rate",
        condition: AlertCondition::GreaterThan,
        threshold: 5.0,
        duration_secs: 300,
        severity: AlertSeverity::Critical,
    },
    RuleTemplate {
        name: "High Latency",
        description: "P95 latency above 500ms for 5 minutes",
        metric: "latency_p95",
        condition: AlertCondition::GreaterThan,
        threshold: 500.0,
        duration_secs: 300,
        severity: AlertSeverity::Warning,
    },
    RuleTemplate {
        name: "High CPU Usage",
        description: "CPU usage above 80% for 10 minutes",
        metric: "cpu_usage",
        condition: AlertCondition::GreaterThan,
        threshold: 80.0,
        duration_secs: 600,
        severity: AlertSeverity::Warning,
    },
    RuleTemplate {
        name: "High Memory Usage",
        description: "Memory usage above 90% for 5 minutes",
        metric: "memory_usage",
        condition: AlertCondition::GreaterThan,
        threshold: 90.0,
        duration_secs: 300,
        severity: AlertSeverity::Critical,
    },
    RuleTemplate {
        name: "Low Request Rate",
        description: "Request rate below 10 req/s for 15 minutes",
        metric: "request_rate",
        condition: AlertCondition::LessThan,
        threshold: 10.0,
        duration_secs: 900,
        severity: AlertSeverity::Info,
    },
    RuleTemplate {
        name: "Connection Saturation",
        description: "Active connections above 900 for 5 minutes",
        metric: "active_connections",
        condition: AlertCondition::GreaterThan,
        threshold: 900.0,
        duration_secs: 300,
        severity: AlertSeverity::Warning,
    },
    RuleTemplate {
        name: "Tail Latency Spike",
        description: "P99 latency above 2000ms for 2 minutes",
        metric: "latency_p99",
        condition: AlertCondition::GreaterThan,
        threshold: 2000.0,
        duration_secs: 120,
        severity: AlertSeverity::Critical,
    },
    RuleTemplate {
        name: "Disk I/O Pressure",
        description: "Disk I/O above 80 MB/s for 10 minutes",
        metric: "disk_io",
        condition: AlertCondition::GreaterThan,
        threshold: 80.0,
        duration_secs: 600,
        severity: AlertSeverity::Info,
    },
];

/// Cycle through the rule template library, assigning services round-robin,
/// until `config.rule_count` rules exist. All rules start enabled.
pub fn generate_alert_rules(
    config: &AlertRuleConfig,
    rng: &mut RandomSource,
) -> Result<Vec<AlertRule>> {
    config.validate()?;

    let rules: Vec<AlertRule> = (0..config.rule_count)
        .map(|i| {
            let template = &RULE_TEMPLATES[i % RULE_TEMPLATES.len()];
            let service = &config.services[i % config.services.len()];
            AlertRule {
                id: format!("rule-{}", rng.hex_id(8)),
                name: format!("{} ({})", template.name, service),
                description: template.description.to_string(),
                service: service.clone(),
                metric: template.metric.to_string(),
                condition: template.condition,
                threshold: template.threshold,
                duration_secs: template.duration_secs,
                severity: template.severity,
                enabled: true,
                created_at: config.created_at,
            }
        })
        .collect();

    tracing::debug!("Generated {} alert rules", rules.len());
    Ok(rules)
}

/// Generate the trigger history of every enabled rule over the configured
/// window, sorted by trigger time. Events whose drawn resolution lies past
/// the window end stay open.
pub fn generate_alert_events(
    rules: &[AlertRule],
    config: &AlertEventConfig,
    rng: &mut RandomSource,
) -> Result<Vec<AlertEvent>> {
    config.validate()?;

    let window_ms = (config.end - config.start).num_milliseconds();
    if window_ms <= 0 {
        tracing::debug!("Empty alert window at {}, no events generated", config.start);
        return Ok(Vec::new());
    }
    let expected = config.days() * config.event_density_per_day;
    let mut events = Vec::new();

    for rule in rules.iter().filter(|r| r.enabled) {
        let count = rng.poisson_random(expected);
        for _ in 0..count {
            let offset_ms = rng.int_between(0, window_ms - 1);
            let triggered_at = config.start + Duration::milliseconds(offset_ms);
            let minutes =
                rng.exponential_random(config.duration_min_mins, config.duration_max_mins);
            let candidate =
                triggered_at + Duration::milliseconds((minutes * 60_000.0).round() as i64);
            let resolved_at = (candidate <= config.end).then_some(candidate);

            let mut event = AlertEvent {
                id: rng.uuid().to_string(),
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                severity: rule.severity,
                service: rule.service.clone(),
                message: format!(
                    "{} on {}: {} {} {}",
                    rule.name,
                    rule.service,
                    rule.metric,
                    condition_symbol(rule.condition),
                    rule.threshold
                ),
                triggered_at,
                resolved_at,
                acknowledged: false,
                acknowledged_by: None,
                acknowledged_at: None,
            };

            if rng.chance(config.ack_probability) {
                let latest = resolved_at.unwrap_or(config.end);
                let span_ms = (latest - triggered_at).num_milliseconds();
                event.acknowledged = true;
                event.acknowledged_by = rng
                    .choose(&config.users)
                    .cloned()
                    .or_else(|| Some("system".to_string()));
                event.acknowledged_at =
                    Some(triggered_at + Duration::milliseconds(rng.int_between(0, span_ms)));
            }

            events.push(event);
        }
    }

    events.sort_by(|a, b| a.triggered_at.cmp(&b.triggered_at));
    tracing::debug!(
        "Generated {} alert events from {} rules",
        events.len(),
        rules.len()
    );
    Ok(events)
}

fn condition_symbol(condition: AlertCondition) -> &'static str {
    match condition {
        AlertCondition::GreaterThan => ">",
        AlertCondition::LessThan => "<",
        AlertCondition::Equals => "==",
        AlertCondition::NotEquals => "!=",
        AlertCondition::Contains => "contains",
        AlertCondition::NotContains => "does not contain",
    }
}
