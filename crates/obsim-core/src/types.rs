//! Common types used across the generation engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a mock service (e.g. "svc-order").
pub type ServiceId = String;

/// Identifier of a trace.
pub type TraceId = String;

/// Identifier of a span.
pub type SpanId = String;

/// Identifier of an alert rule.
pub type RuleId = String;

/// Scalar metadata value carried by span tags and log context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered key-value metadata map.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<obsim_config::ConfigError> for EngineError {
    fn from(err: obsim_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Fail with a configuration error unless `value` is a probability.
pub(crate) fn ensure_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Fail with a configuration error on NaN or infinite input.
pub(crate) fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::config(format!(
            "{} must be a finite number, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_value_untagged_json() {
        let mut attrs = Attributes::new();
        attrs.insert("http.status_code".into(), 500i64.into());
        attrs.insert("error".into(), true.into());
        attrs.insert("db.system".into(), "postgres".into());

        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(
            json,
            r#"{"db.system":"postgres","error":true,"http.status_code":500}"#
        );

        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("http.status_code"), Some(&AttributeValue::Int(500)));
        assert_eq!(back.get("error"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("trace", "abc");
        assert_eq!(err.to_string(), "trace not found: abc");
        assert!(ensure_probability("p", 1.2).is_err());
        assert!(ensure_probability("p", 0.0).is_ok());
        assert!(ensure_probability("p", f64::NAN).is_err());
        assert!(ensure_finite("max", f64::NAN).is_err());
        assert!(ensure_finite("max", f64::NEG_INFINITY).is_err());
        assert!(ensure_finite("max", 250.0).is_ok());
    }
}
