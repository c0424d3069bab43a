//! Register batch decoding.
//!
//! Each [`Batch`] is one contiguous read. Decoding is pure: raw words in,
//! named field values out.

use crate::registers::{self as reg, RegisterSpec};
use crate::snapshot::FieldValue;

/// Error type for decoding operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{batch} batch: expected {expected} registers, got {actual}")]
    ShortBatch {
        batch: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Decoded fields of one batch, in register order.
pub type Fields = Vec<(&'static str, FieldValue)>;

/// Two's-complement reading of a 16-bit word.
pub fn to_signed(word: u16) -> i64 {
    i64::from(word as i16)
}

/// Signed tenths as a value rounded to one decimal.
pub fn tenths(word: u16) -> f64 {
    round1(to_signed(word) as f64 / 10.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Relative humidity in percent; anything above 100.0 % means no sensor.
pub fn humidity(word: u16) -> Option<f64> {
    (word <= reg::HUMIDITY_RAW_MAX).then(|| round1(f64::from(word) / 10.0))
}

/// Dwelling temperature, absent when the sensor is not fitted.
pub fn dwelling_temperature(word: u16) -> Option<f64> {
    (to_signed(word) != i64::from(reg::NO_SENSOR)).then(|| tenths(word))
}

/// BCD nibbles of every word, most significant first.
pub fn bcd_digits(words: &[u16]) -> String {
    words
        .iter()
        .flat_map(|word| [12u16, 8, 4, 0].map(|shift| (word >> shift) & 0xF))
        .map(|nibble| nibble.to_string())
        .collect()
}

/// 32-bit counter from a high and a low word.
pub fn join_u32(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// CO2 reading, meaningful only while its sensor reports running.
pub fn co2(status: u16, value: u16) -> Option<u16> {
    (status == reg::CO2_SENSOR_ACTIVE).then_some(value)
}

/// Label for a status code, or `Unknown (<code>)`.
pub fn label(table: &[(u16, &'static str)], code: u16) -> String {
    reg::lookup(table, code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown ({})", code))
}

/// Airflow mode from the remote-control mode and switch-position registers.
pub fn airflow_mode(control: u16, switch_position: u16) -> &'static str {
    match control {
        reg::CONTROL_WALL_UNIT => "wall_unit",
        reg::CONTROL_SWITCH => {
            reg::lookup(reg::SWITCH_POSITIONS, switch_position).unwrap_or("unknown")
        }
        reg::CONTROL_FLOW_RATE => "custom",
        _ => "unknown",
    }
}

/// The register blocks read in one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Batch {
    Core,
    SupplyFan,
    ExhaustFan,
    Bypass,
    Preheater,
    Frost,
    Climate,
    Filter,
    OperatingHours,
    Co2,
    SystemError,
    SerialNumber,
    FlowPresets,
    BypassConfig,
    FilterWarning,
    RemoteControl,
}

impl Batch {
    /// Batches read after [`Batch::Core`], in poll order.
    pub const OPTIONAL: [Batch; 15] = [
        Batch::SupplyFan,
        Batch::ExhaustFan,
        Batch::Bypass,
        Batch::Preheater,
        Batch::Frost,
        Batch::Climate,
        Batch::Filter,
        Batch::OperatingHours,
        Batch::Co2,
        Batch::SystemError,
        Batch::SerialNumber,
        Batch::FlowPresets,
        Batch::BypassConfig,
        Batch::FilterWarning,
        Batch::RemoteControl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Batch::Core => "core",
            Batch::SupplyFan => "supply_fan",
            Batch::ExhaustFan => "exhaust_fan",
            Batch::Bypass => "bypass",
            Batch::Preheater => "preheater",
            Batch::Frost => "frost",
            Batch::Climate => "climate",
            Batch::Filter => "filter",
            Batch::OperatingHours => "operating_hours",
            Batch::Co2 => "co2",
            Batch::SystemError => "system_error",
            Batch::SerialNumber => "serial_number",
            Batch::FlowPresets => "flow_presets",
            Batch::BypassConfig => "bypass_config",
            Batch::FilterWarning => "filter_warning",
            Batch::RemoteControl => "remote_control",
        }
    }

    pub fn spec(&self) -> RegisterSpec {
        match self {
            Batch::Core => RegisterSpec::input(reg::ACTIVE_FUNCTION, 5),
            Batch::SupplyFan => RegisterSpec::input(reg::FAN_INLET_STATUS, 8),
            Batch::ExhaustFan => RegisterSpec::input(reg::FAN_EXHAUST_STATUS, 8),
            Batch::Bypass => RegisterSpec::input(reg::BYPASS_STATUS, 2),
            Batch::Preheater => RegisterSpec::input(reg::PREHEATER_STATUS, 2),
            Batch::Frost => RegisterSpec::input(reg::FROST_STATUS, 3),
            Batch::Climate => RegisterSpec::input(reg::FLOW_SWITCH_POSITION, 4),
            Batch::Filter => RegisterSpec::input(reg::FILTER_STATUS, 1),
            Batch::OperatingHours => RegisterSpec::input(reg::OPERATING_HOURS_HI, 3),
            Batch::Co2 => RegisterSpec::input(reg::CO2_SENSOR1_STATUS, 4),
            Batch::SystemError => RegisterSpec::input(reg::SYSTEM_ERROR_STATUS, 2),
            Batch::SerialNumber => RegisterSpec::input(reg::SERIAL_NUMBER, 3),
            Batch::FlowPresets => RegisterSpec::holding(reg::FLOW_PRESET_HOLIDAY, 4),
            Batch::BypassConfig => RegisterSpec::holding(reg::BYPASS_MODE, 3),
            Batch::FilterWarning => RegisterSpec::holding(reg::FILTER_WARNING_DAYS, 1),
            Batch::RemoteControl => RegisterSpec::holding(reg::MODBUS_CONTROL, 4),
        }
    }

    /// Decode the words returned for this batch.
    pub fn decode(&self, words: &[u16]) -> Result<Fields, DecodeError> {
        let expected = usize::from(self.spec().count);
        if words.len() < expected {
            return Err(DecodeError::ShortBatch {
                batch: self.name(),
                expected,
                actual: words.len(),
            });
        }
        let r = words;

        let fields: Fields = match self {
            Batch::Core => vec![
                ("active_function", label(reg::ACTIVE_FUNCTIONS, r[0]).into()),
                ("active_function_raw", r[0].into()),
                ("fan_control_type", r[1].into()),
                ("ventilation_mode", label(reg::VENTILATION_MODES, r[2]).into()),
                ("ventilation_mode_raw", r[2].into()),
                ("supply_pressure", tenths(r[3]).into()),
                ("exhaust_pressure", tenths(r[4]).into()),
            ],
            // r[5] is the inlet anemometer
            Batch::SupplyFan => vec![
                ("fan_inlet_status", label(reg::FAN_STATUSES, r[0]).into()),
                ("supply_airflow_setpoint", r[1].into()),
                ("supply_airflow_actual", r[2].into()),
                ("supply_massflow", r[3].into()),
                ("supply_fan_speed", r[4].into()),
                ("supply_fan_temperature", tenths(r[6]).into()),
                ("supply_fan_humidity", humidity(r[7]).into()),
            ],
            Batch::ExhaustFan => vec![
                ("fan_exhaust_status", label(reg::FAN_STATUSES, r[0]).into()),
                ("exhaust_airflow_actual", r[2].into()),
                ("exhaust_fan_speed", r[4].into()),
                ("exhaust_fan_temperature", tenths(r[6]).into()),
                ("exhaust_fan_humidity", humidity(r[7]).into()),
            ],
            Batch::Bypass => vec![
                ("bypass_status", label(reg::BYPASS_STATUSES, r[0]).into()),
                ("bypass_status_raw", r[0].into()),
                ("bypass_step_position", r[1].into()),
            ],
            Batch::Preheater => vec![
                ("preheater_status", label(reg::PREHEATER_STATUSES, r[0]).into()),
                ("preheater_capacity", r[1].into()),
            ],
            Batch::Frost => vec![
                ("frost_status_raw", r[0].into()),
                ("frost_heater_power", r[1].into()),
                ("frost_fan_reduction", r[2].into()),
            ],
            Batch::Climate => vec![
                ("flow_switch_position", r[0].into()),
                ("outside_temperature", tenths(r[1]).into()),
                ("dwelling_temperature", dwelling_temperature(r[2]).into()),
                ("rht_humidity", humidity(r[3]).into()),
            ],
            Batch::Filter => vec![("filter_status", label(reg::FILTER_STATUSES, r[0]).into())],
            Batch::OperatingHours => vec![
                ("operating_hours", i64::from(join_u32(r[0], r[1])).into()),
                ("filter_hours", r[2].into()),
            ],
            Batch::Co2 => vec![
                ("co2_sensor1", co2(r[0], r[1]).into()),
                ("co2_sensor2", co2(r[2], r[3]).into()),
            ],
            Batch::SystemError => vec![
                ("system_error", label(reg::SYSTEM_ERRORS, r[0]).into()),
                ("system_error_raw", r[0].into()),
                ("active_incident", (r[1] != 0).then_some(r[1]).into()),
            ],
            Batch::SerialNumber => vec![("serial_number", bcd_digits(&r[..3]).into())],
            Batch::FlowPresets => vec![
                ("flow_preset_holiday", r[0].into()),
                ("flow_preset_low", r[1].into()),
                ("flow_preset_normal", r[2].into()),
                ("flow_preset_high", r[3].into()),
            ],
            Batch::BypassConfig => vec![
                ("bypass_mode", label(reg::BYPASS_MODES, r[0]).into()),
                ("bypass_mode_raw", r[0].into()),
                ("bypass_temp_dwelling", tenths(r[1]).into()),
                ("bypass_temp_outside", tenths(r[2]).into()),
            ],
            Batch::FilterWarning => vec![("filter_warning_days", r[0].into())],
            Batch::RemoteControl => vec![
                ("modbus_control", r[0].into()),
                ("switch_position", r[1].into()),
                ("desired_flow_rate", r[2].into()),
                ("standby_status", r[3].into()),
                ("airflow_mode", airflow_mode(r[0], r[1]).into()),
            ],
        };

        Ok(fields)
    }
}
