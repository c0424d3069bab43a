//! Zenoh surface: snapshot publishing and the command subscriber.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use vigor_bridge_framework::{BridgeError, Publisher, TelemetryPoint, TelemetryValue};
use zenoh::sample::SampleKind;

use crate::commands::{Command, CommandEncoder};
use crate::coordinator::RefreshTrigger;
use crate::registers::{is_counter, unit_of};
use crate::snapshot::{DeviceSnapshot, FieldValue};

fn telemetry_value(field: &str, value: &FieldValue) -> TelemetryValue {
    match value {
        FieldValue::Int(v) if is_counter(field) && *v >= 0 => TelemetryValue::Counter(*v as u64),
        FieldValue::Int(v) => TelemetryValue::Gauge(*v as f64),
        FieldValue::Float(v) => TelemetryValue::Gauge(*v),
        FieldValue::Text(s) => TelemetryValue::Text(s.clone()),
        FieldValue::Absent => TelemetryValue::Unavailable,
    }
}

/// Derived values published next to the raw fields.
fn projections(snapshot: &DeviceSnapshot) -> Vec<(&'static str, FieldValue)> {
    let mut derived = vec![
        ("airflow_option", snapshot.airflow_option().into()),
        ("bypass_option", snapshot.bypass_option().into()),
    ];
    if let Some(rate) = snapshot.effective_flow_rate() {
        derived.push(("effective_flow_rate", FieldValue::Int(rate)));
    }
    derived
}

/// One telemetry point per snapshot field, keyed `<device>/<field>`, plus
/// the airflow, bypass and flow-rate projections.
pub fn snapshot_points(device: &str, snapshot: &DeviceSnapshot) -> Vec<(String, TelemetryPoint)> {
    let timestamp = snapshot.captured_at().timestamp_millis();
    let serial = snapshot.serial_number();
    let derived = projections(snapshot);

    snapshot
        .iter()
        .chain(derived.iter().map(|(field, value)| (*field, value)))
        .map(|(field, value)| {
            let mut point =
                TelemetryPoint::new(device, field, telemetry_value(field, value)).at(timestamp);
            if let Some(unit) = unit_of(field) {
                point = point.with_label("unit", unit);
            }
            if let Some(serial) = serial {
                point = point.with_label("serial", serial);
            }
            (format!("{}/{}", device, field), point)
        })
        .collect()
}

/// Publish every snapshot the coordinator produces until it goes away.
pub async fn publish_snapshots(
    publisher: Publisher,
    device: String,
    mut snapshots: watch::Receiver<Option<Arc<DeviceSnapshot>>>,
) {
    while snapshots.changed().await.is_ok() {
        let latest = snapshots.borrow_and_update().clone();
        let Some(snapshot) = latest else {
            continue;
        };

        let points = snapshot_points(&device, &snapshot);
        let batch: Vec<(&str, &TelemetryPoint)> =
            points.iter().map(|(key, point)| (key.as_str(), point)).collect();
        let stats = publisher.publish_batch(batch).await;

        debug!(
            device = %device,
            published = stats.success,
            failed = stats.failed,
            "Published snapshot"
        );
    }

    debug!(device = %device, "Snapshot channel closed");
}

/// Key expression the command subscriber listens on.
pub fn command_key(key_prefix: &str, device: &str) -> String {
    format!("{}/{}/@/command", key_prefix, device)
}

/// Apply commands received on `key`, refreshing the snapshot after each
/// successful write.
pub async fn listen_for_commands(
    session: Arc<zenoh::Session>,
    key: String,
    commands: CommandEncoder,
    refresh: RefreshTrigger,
) -> Result<(), BridgeError> {
    let subscriber =
        session
            .declare_subscriber(&key)
            .await
            .map_err(|e| BridgeError::Subscribe {
                key: key.clone(),
                message: e.to_string(),
            })?;

    info!(key = %key, "Listening for commands");

    loop {
        let sample = match subscriber.recv_async().await {
            Ok(sample) => sample,
            Err(e) => {
                debug!(error = %e, "Command subscriber closed");
                return Ok(());
            }
        };

        if sample.kind() == SampleKind::Delete {
            trace!(key = %sample.key_expr(), "Ignoring delete sample");
            continue;
        }

        let payload = sample.payload().to_bytes();
        let command: Command = match vigor_common::decode_auto(&payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(key = %sample.key_expr(), error = %e, "Ignoring malformed command");
                continue;
            }
        };

        if commands.execute(&command).await.is_ok() {
            refresh.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot() -> DeviceSnapshot {
        let mut snap = DeviceSnapshot::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        snap.insert("serial_number", "123456789012");
        snap.insert("operating_hours", FieldValue::Int(65536));
        snap.insert("supply_fan_speed", FieldValue::Int(1320));
        snap.insert("outside_temperature", FieldValue::Float(-2.5));
        snap.insert("co2_sensor1", FieldValue::Absent);
        snap
    }

    fn point<'a>(points: &'a [(String, TelemetryPoint)], key: &str) -> &'a TelemetryPoint {
        &points.iter().find(|(k, _)| k == key).unwrap().1
    }

    #[test]
    fn test_snapshot_points() {
        let points = snapshot_points("attic", &snapshot());
        // five fields plus airflow_option and bypass_option
        assert_eq!(points.len(), 7);
        assert!(!points.iter().any(|(k, _)| k == "attic/effective_flow_rate"));

        let hours = point(&points, "attic/operating_hours");
        assert_eq!(hours.value, TelemetryValue::Counter(65536));
        assert_eq!(hours.labels.get("unit").map(String::as_str), Some("h"));
        assert_eq!(hours.timestamp, 1_700_000_000_000);
        assert_eq!(hours.source, "attic");

        let speed = point(&points, "attic/supply_fan_speed");
        assert_eq!(speed.value, TelemetryValue::Gauge(1320.0));

        let temp = point(&points, "attic/outside_temperature");
        assert_eq!(temp.value, TelemetryValue::Gauge(-2.5));
        assert_eq!(temp.labels.get("unit").map(String::as_str), Some("°C"));
        assert_eq!(
            temp.labels.get("serial").map(String::as_str),
            Some("123456789012")
        );

        let co2 = point(&points, "attic/co2_sensor1");
        assert_eq!(co2.value, TelemetryValue::Unavailable);
        assert_eq!(co2.metric, "co2_sensor1");
    }

    #[test]
    fn test_projection_points() {
        let mut snap = DeviceSnapshot::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        snap.insert("modbus_control", FieldValue::Int(2));
        snap.insert("desired_flow_rate", FieldValue::Int(250));
        snap.insert("supply_airflow_actual", FieldValue::Int(180));
        snap.insert("airflow_mode", "custom");
        snap.insert("bypass_mode", "Open");

        let points = snapshot_points("d", &snap);

        let flow = point(&points, "d/effective_flow_rate");
        assert_eq!(flow.value, TelemetryValue::Gauge(250.0));
        assert_eq!(flow.labels.get("unit").map(String::as_str), Some("m³/h"));
        assert_eq!(
            point(&points, "d/airflow_option").value,
            TelemetryValue::Text("wall_unit".to_string())
        );
        assert_eq!(
            point(&points, "d/bypass_option").value,
            TelemetryValue::Text("Open".to_string())
        );
        assert_eq!(
            point(&points, "d/airflow_mode").value,
            TelemetryValue::Text("custom".to_string())
        );
    }

    #[test]
    fn test_bridge_tasks_are_spawnable() {
        fn assert_send<T: Send + 'static>(_: &T) {}

        // type-checked only; building a Publisher needs a live session
        let _check = |publisher: Publisher,
                      snapshots: watch::Receiver<Option<Arc<DeviceSnapshot>>>,
                      session: Arc<zenoh::Session>,
                      commands: CommandEncoder| {
            let publish = publish_snapshots(publisher, "attic".to_string(), snapshots);
            assert_send(&publish);
            let listen = listen_for_commands(
                session,
                command_key("zensight/vigor", "attic"),
                commands,
                RefreshTrigger::default(),
            );
            assert_send(&listen);
        };
    }

    #[test]
    fn test_command_key() {
        assert_eq!(
            command_key("zensight/vigor", "attic"),
            "zensight/vigor/attic/@/command"
        );
    }
}
