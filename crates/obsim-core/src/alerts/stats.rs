use super::{AlertEvent, AlertSeverity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of an alert event history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertStatistics {
    pub total: usize,

    /// Not yet resolved
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub by_severity: BTreeMap<AlertSeverity, usize>,

    /// Mean of `acknowledged_at - triggered_at` over acknowledged events
    pub mean_time_to_acknowledge_secs: f64,

    /// Mean of `resolved_at - triggered_at` over resolved events
    pub mean_time_to_resolve_secs: f64,
    pub acknowledgment_rate: f64,
}

pub fn calculate_alert_statistics(events: &[AlertEvent]) -> AlertStatistics {
    let mut stats = AlertStatistics {
        total: events.len(),
        ..AlertStatistics::default()
    };
    let mut ack_secs = Vec::new();
    let mut resolve_secs = Vec::new();

    for event in events {
        *stats.by_severity.entry(event.severity).or_insert(0) += 1;

        if event.acknowledged {
            stats.acknowledged += 1;
            if let Some(at) = event.acknowledged_at {
                ack_secs.push((at - event.triggered_at).num_milliseconds() as f64 / 1000.0);
            }
        }
        match event.resolved_at {
            Some(at) => {
                stats.resolved += 1;
                resolve_secs.push((at - event.triggered_at).num_milliseconds() as f64 / 1000.0);
            }
            None => stats.active += 1,
        }
    }

    stats.mean_time_to_acknowledge_secs = crate::random::mean(&ack_secs);
    stats.mean_time_to_resolve_secs = crate::random::mean(&resolve_secs);
    if stats.total > 0 {
        stats.acknowledgment_rate = stats.acknowledged as f64 / stats.total as f64;
    }
    stats
}

/// A cluster of alert triggers dense enough to be treated as one incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertStorm {
    /// First trigger in the storm
    pub start: DateTime<Utc>,

    /// Last trigger in the storm
    pub end: DateTime<Utc>,
    pub event_count: usize,
    pub event_ids: Vec<String>,
}

/// Find every stretch where at least `threshold` events trigger within a
/// sliding `window`. Overlapping qualifying windows merge into one storm.
pub fn detect_alert_storm(
    events: &[AlertEvent],
    threshold: usize,
    window: Duration,
) -> Vec<AlertStorm> {
    if threshold == 0 || events.len() < threshold {
        return Vec::new();
    }

    let mut sorted: Vec<&AlertEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.triggered_at.cmp(&b.triggered_at));

    // Inclusive index ranges into `sorted`
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut left = 0;
    for right in 0..sorted.len() {
        while sorted[right].triggered_at - sorted[left].triggered_at > window {
            left += 1;
        }
        if right - left + 1 < threshold {
            continue;
        }
        let overlaps = ranges.last().is_some_and(|&(_, end)| left <= end);
        match ranges.last_mut() {
            Some(last) if overlaps => last.1 = right,
            _ => ranges.push((left, right)),
        }
    }

    let storms: Vec<AlertStorm> = ranges
        .into_iter()
        .map(|(first, last)| {
            let members = &sorted[first..=last];
            AlertStorm {
                start: members[0].triggered_at,
                end: members[members.len() - 1].triggered_at,
                event_count: members.len(),
                event_ids: members.iter().map(|e| e.id.clone()).collect(),
            }
        })
        .collect();

    if !storms.is_empty() {
        tracing::debug!("Detected {} alert storms", storms.len());
    }
    storms
}
