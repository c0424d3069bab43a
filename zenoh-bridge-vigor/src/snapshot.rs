//! Decoded device state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::registers::{AIRFLOW_OPTIONS, CONTROL_FLOW_RATE};

/// A single decoded field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    /// Register was read but holds a sentinel or the hardware is not fitted.
    Absent,
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:.1}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Absent => f.write_str("unavailable"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Absent)
    }
}

/// Everything read from the appliance in one poll cycle.
///
/// A field is present only when the batch that carries it was read in
/// that cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    fields: BTreeMap<&'static str, FieldValue>,
    captured_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            fields: BTreeMap::new(),
            captured_at,
        }
    }

    pub fn insert(&mut self, field: &'static str, value: impl Into<FieldValue>) {
        self.fields.insert(field, value.into());
    }

    pub fn extend(&mut self, fields: impl IntoIterator<Item = (&'static str, FieldValue)>) {
        self.fields.extend(fields);
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_int)
    }

    pub fn float(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_float)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Current airflow selection, falling back to the wall unit.
    pub fn airflow_option(&self) -> &str {
        self.text("airflow_mode")
            .filter(|mode| AIRFLOW_OPTIONS.iter().any(|option| option == mode))
            .unwrap_or("wall_unit")
    }

    /// The flow the unit is asked to deliver.
    ///
    /// Under flow-rate control this is the requested rate; otherwise the
    /// measured supply airflow.
    pub fn effective_flow_rate(&self) -> Option<i64> {
        if self.int("modbus_control") == Some(i64::from(CONTROL_FLOW_RATE)) {
            self.int("desired_flow_rate")
        } else {
            self.int("supply_airflow_actual")
        }
    }

    pub fn bypass_option(&self) -> &str {
        self.text("bypass_mode").unwrap_or("Automatic")
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.text("serial_number")
    }
}

/// Read access to the most recent snapshot.
pub trait SnapshotProvider {
    /// `None` until the first cycle succeeds.
    fn snapshot(&self) -> Option<Arc<DeviceSnapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(fields: &[(&'static str, FieldValue)]) -> DeviceSnapshot {
        let mut snap = DeviceSnapshot::new(Utc::now());
        snap.extend(fields.iter().cloned());
        snap
    }

    #[test]
    fn test_accessors() {
        let snap = snapshot(&[
            ("supply_fan_speed", FieldValue::Int(1200)),
            ("outside_temperature", FieldValue::Float(-3.5)),
            ("filter_status", "Dirty".into()),
            ("active_incident", FieldValue::Absent),
        ]);

        assert_eq!(snap.len(), 4);
        assert_eq!(snap.int("supply_fan_speed"), Some(1200));
        assert_eq!(snap.float("supply_fan_speed"), Some(1200.0));
        assert_eq!(snap.float("outside_temperature"), Some(-3.5));
        assert_eq!(snap.text("filter_status"), Some("Dirty"));
        assert!(snap.contains("active_incident"));
        assert!(snap.get("active_incident").unwrap().is_absent());
        assert!(!snap.contains("co2_sensor1"));
    }

    #[test]
    fn test_airflow_option() {
        assert_eq!(snapshot(&[]).airflow_option(), "wall_unit");
        assert_eq!(
            snapshot(&[("airflow_mode", "high".into())]).airflow_option(),
            "high"
        );
        assert_eq!(
            snapshot(&[("airflow_mode", "custom".into())]).airflow_option(),
            "wall_unit"
        );
    }

    #[test]
    fn test_effective_flow_rate() {
        let switch = snapshot(&[
            ("modbus_control", FieldValue::Int(1)),
            ("desired_flow_rate", FieldValue::Int(250)),
            ("supply_airflow_actual", FieldValue::Int(180)),
        ]);
        assert_eq!(switch.effective_flow_rate(), Some(180));

        let custom = snapshot(&[
            ("modbus_control", FieldValue::Int(2)),
            ("desired_flow_rate", FieldValue::Int(250)),
            ("supply_airflow_actual", FieldValue::Int(180)),
        ]);
        assert_eq!(custom.effective_flow_rate(), Some(250));
    }

    #[test]
    fn test_bypass_option_default() {
        assert_eq!(snapshot(&[]).bypass_option(), "Automatic");
        assert_eq!(
            snapshot(&[("bypass_mode", "Open".into())]).bypass_option(),
            "Open"
        );
    }

    #[test]
    fn test_serializes_absent_as_null() {
        let snap = snapshot(&[
            ("co2_sensor1", FieldValue::Absent),
            ("supply_pressure", FieldValue::Float(12.5)),
        ]);
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json["fields"]["co2_sensor1"].is_null());
        assert_eq!(json["fields"]["supply_pressure"], 12.5);
    }
}
