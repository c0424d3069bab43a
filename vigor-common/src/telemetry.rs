use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single telemetry data point published by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Unix epoch milliseconds when the measurement was taken.
    pub timestamp: i64,

    /// Device identifier (the configured device name).
    pub source: String,

    /// Field name (e.g., "outside_temperature").
    pub metric: String,

    /// The measured value.
    pub value: TelemetryValue,

    /// Additional context labels (unit, serial number).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl TelemetryPoint {
    /// Create a new telemetry point with the current timestamp.
    pub fn new(source: impl Into<String>, metric: impl Into<String>, value: TelemetryValue) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            source: source.into(),
            metric: metric.into(),
            value,
            labels: HashMap::new(),
        }
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a label to this telemetry point.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Typed telemetry value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    /// Counter (monotonically increasing).
    Counter(u64),

    /// Gauge (can go up or down).
    Gauge(f64),

    /// Text value (enumerated labels, serial numbers).
    Text(String),

    /// Boolean value.
    Boolean(bool),

    /// The device reported the value as not installed or invalid.
    Unavailable,
}

impl From<u64> for TelemetryValue {
    fn from(v: u64) -> Self {
        TelemetryValue::Counter(v)
    }
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        TelemetryValue::Gauge(v as f64)
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Gauge(v)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        TelemetryValue::Text(v)
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        TelemetryValue::Text(v.to_string())
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        TelemetryValue::Boolean(v)
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_point_creation() {
        let point = TelemetryPoint::new(
            "vigor",
            "outside_temperature",
            TelemetryValue::Gauge(-3.5),
        )
        .with_label("unit", "°C");

        assert_eq!(point.source, "vigor");
        assert_eq!(point.metric, "outside_temperature");
        assert_eq!(point.value, TelemetryValue::Gauge(-3.5));
        assert_eq!(point.labels.get("unit"), Some(&"°C".to_string()));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(TelemetryValue::from(42u64), TelemetryValue::Counter(42));
        assert_eq!(TelemetryValue::from(21.5), TelemetryValue::Gauge(21.5));
        assert_eq!(
            TelemetryValue::from("Closed"),
            TelemetryValue::Text("Closed".to_string())
        );
        assert_eq!(TelemetryValue::from(true), TelemetryValue::Boolean(true));
    }

    #[test]
    fn test_unavailable_serializes_as_null() {
        let json = serde_json::to_string(&TelemetryValue::Unavailable).unwrap();
        assert_eq!(json, "null");
    }
}
