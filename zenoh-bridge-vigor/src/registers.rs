//! Register map of the Vigor ventilation unit.
//!
//! Input registers (4000 range) report live state, holding registers in the
//! 6000 range carry installer settings and the 8000 range is the Modbus
//! remote control block.

// Device information (input)
pub const SW_VERSION_TYPE: u16 = 4000;
pub const SW_VERSION_MINOR: u16 = 4001;
pub const APPLIANCE_TYPE: u16 = 4004;
pub const SERIAL_NUMBER: u16 = 4010;

// Operating state (input)
pub const ACTIVE_FUNCTION: u16 = 4020;
pub const FAN_CONTROL_TYPE: u16 = 4021;
pub const VENTILATION_MODE: u16 = 4022;
pub const SUPPLY_PRESSURE: u16 = 4023;
pub const EXHAUST_PRESSURE: u16 = 4024;

// Supply fan (input)
pub const FAN_INLET_STATUS: u16 = 4030;
pub const SUPPLY_AIRFLOW_SETPOINT: u16 = 4031;
pub const SUPPLY_AIRFLOW_ACTUAL: u16 = 4032;
pub const SUPPLY_MASSFLOW: u16 = 4033;
pub const SUPPLY_FAN_SPEED: u16 = 4034;
pub const SUPPLY_FAN_TEMPERATURE: u16 = 4036;
pub const SUPPLY_FAN_HUMIDITY: u16 = 4037;

// Exhaust fan (input)
pub const FAN_EXHAUST_STATUS: u16 = 4040;
pub const EXHAUST_AIRFLOW_ACTUAL: u16 = 4042;
pub const EXHAUST_FAN_SPEED: u16 = 4044;
pub const EXHAUST_FAN_TEMPERATURE: u16 = 4046;
pub const EXHAUST_FAN_HUMIDITY: u16 = 4047;

// Bypass, preheater and frost protection (input)
pub const BYPASS_STATUS: u16 = 4050;
pub const BYPASS_STEP_POSITION: u16 = 4051;
pub const PREHEATER_STATUS: u16 = 4060;
pub const PREHEATER_CAPACITY: u16 = 4061;
pub const FROST_STATUS: u16 = 4070;
pub const FROST_HEATER_POWER: u16 = 4071;
pub const FROST_FAN_REDUCTION: u16 = 4072;

// Climate sensors (input)
pub const FLOW_SWITCH_POSITION: u16 = 4080;
pub const OUTSIDE_TEMP: u16 = 4081;
pub const DWELLING_TEMP: u16 = 4082;
pub const RHT_HUMIDITY: u16 = 4083;

// Filter and counters (input)
pub const FILTER_STATUS: u16 = 4100;
pub const EBUS_POWER: u16 = 4101;
pub const OPERATING_HOURS_HI: u16 = 4113;
pub const OPERATING_HOURS_LO: u16 = 4114;
pub const FILTER_HOURS: u16 = 4115;

// CO2 sensors (input)
pub const CO2_SENSOR1_STATUS: u16 = 4200;
pub const CO2_SENSOR1_VALUE: u16 = 4201;
pub const CO2_SENSOR2_STATUS: u16 = 4202;
pub const CO2_SENSOR2_VALUE: u16 = 4203;

// Errors (input)
pub const SYSTEM_ERROR_STATUS: u16 = 4800;
pub const ACTIVE_INCIDENT: u16 = 4801;

// Flow presets in m³/h (holding)
pub const FLOW_PRESET_HOLIDAY: u16 = 6000;
pub const FLOW_PRESET_LOW: u16 = 6001;
pub const FLOW_PRESET_NORMAL: u16 = 6002;
pub const FLOW_PRESET_HIGH: u16 = 6003;
pub const FLOW_TYPE: u16 = 6030;
pub const IMBALANCE_ALLOWED: u16 = 6033;
pub const IMBALANCE_VALUE: u16 = 6034;

// Bypass configuration (holding)
pub const BYPASS_MODE: u16 = 6100;
pub const BYPASS_TEMP_DWELLING: u16 = 6101;
pub const BYPASS_TEMP_OUTSIDE: u16 = 6102;
pub const BYPASS_TEMP_HYSTERESIS: u16 = 6103;
pub const BYPASS_BOOST: u16 = 6104;
pub const BYPASS_BOOST_SWITCH: u16 = 6105;

// Frost, filter, heaters and sensor modes (holding)
pub const FROST_CONTROL_TEMP: u16 = 6110;
pub const FROST_MIN_INLET_TEMP: u16 = 6111;
pub const FILTER_WARNING_DAYS: u16 = 6120;
pub const EXTERNAL_HEATER_MODE: u16 = 6130;
pub const POSTHEATER_SETPOINT: u16 = 6131;
pub const RHT_SENSOR_MODE: u16 = 6140;
pub const CO2_SENSOR_MODE: u16 = 6150;

// Remote control (holding)
pub const MODBUS_CONTROL: u16 = 8000;
pub const SWITCH_POSITION: u16 = 8001;
pub const DESIRED_FLOW_RATE: u16 = 8002;
pub const STANDBY: u16 = 8003;
pub const FILTER_RESET: u16 = 8010;
pub const APPLIANCE_RESET: u16 = 8011;

/// Modbus control (8000) values.
pub const CONTROL_WALL_UNIT: u16 = 0;
pub const CONTROL_SWITCH: u16 = 1;
pub const CONTROL_FLOW_RATE: u16 = 2;

/// Standby (8003) values.
pub const STANDBY_ON: u16 = 1;
pub const STANDBY_OFF: u16 = 2;

/// Valid range of the custom flow rate in m³/h.
pub const FLOW_RATE_MIN: i64 = 0;
pub const FLOW_RATE_MAX: i64 = 400;

/// Bypass thresholds in tenths of a degree.
pub const BYPASS_DWELLING_RANGE: (i64, i64) = (150, 350);
pub const BYPASS_OUTSIDE_RANGE: (i64, i64) = (70, 150);

/// Raw value the appliance reports when a temperature sensor is missing.
pub const NO_SENSOR: u16 = 9999;

/// Highest plausible raw humidity (100.0 %).
pub const HUMIDITY_RAW_MAX: u16 = 1000;

/// CO2 sensor status meaning "present and reporting".
pub const CO2_SENSOR_ACTIVE: u16 = 4;

/// Register type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Read-only 16-bit registers
    Input,
    /// Read/write 16-bit registers
    Holding,
}

/// A contiguous block of registers read in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub kind: RegisterKind,
    pub address: u16,
    pub count: u16,
}

impl RegisterSpec {
    pub const fn input(address: u16, count: u16) -> Self {
        Self {
            kind: RegisterKind::Input,
            address,
            count,
        }
    }

    pub const fn holding(address: u16, count: u16) -> Self {
        Self {
            kind: RegisterKind::Holding,
            address,
            count,
        }
    }
}

pub const ACTIVE_FUNCTIONS: &[(u16, &str)] = &[
    (0, "Standby"),
    (1, "Bootloader"),
    (4, "Manual"),
    (5, "Holiday"),
    (6, "Night Ventilation"),
    (7, "Party"),
    (8, "Bypass Boost"),
    (9, "Normal Boost"),
    (10, "Auto CO2"),
    (11, "Auto eBus"),
    (12, "Auto Modbus"),
    (13, "Auto LAN/WLAN Portal"),
    (14, "Auto LAN/WLAN Local"),
];

pub const VENTILATION_MODES: &[(u16, &str)] = &[
    (0, "Holiday"),
    (1, "Low"),
    (2, "Normal"),
    (3, "High"),
    (4, "Auto"),
];

pub const BYPASS_STATUSES: &[(u16, &str)] = &[
    (0, "Initializing"),
    (1, "Opening"),
    (2, "Closing"),
    (3, "Open"),
    (4, "Closed"),
];

pub const BYPASS_MODES: &[(u16, &str)] = &[(0, "Automatic"), (1, "Closed"), (2, "Open")];

pub const FILTER_STATUSES: &[(u16, &str)] = &[(0, "Clean"), (1, "Dirty")];

pub const SYSTEM_ERRORS: &[(u16, &str)] = &[
    (0, "No Error"),
    (1, "Warning"),
    (2, "Non-blocking Error"),
    (3, "Blocking Error"),
];

pub const FAN_STATUSES: &[(u16, &str)] = &[
    (2, "No Communication"),
    (3, "Idle"),
    (4, "Running"),
    (5, "Blocked"),
    (6, "Fan Error"),
];

pub const PREHEATER_STATUSES: &[(u16, &str)] = &[
    (0, "Initializing"),
    (1, "Inactive"),
    (2, "Active"),
    (3, "Test Mode"),
];

/// Switch positions written to 8001 when the unit is in switch mode.
pub const SWITCH_POSITIONS: &[(u16, &str)] = &[
    (0, "holiday"),
    (1, "low"),
    (2, "normal"),
    (3, "high"),
];

/// Airflow options selectable from outside.
pub const AIRFLOW_OPTIONS: [&str; 5] = ["wall_unit", "holiday", "low", "normal", "high"];

/// Name for `code` in `table`.
pub fn lookup(table: &[(u16, &'static str)], code: u16) -> Option<&'static str> {
    table
        .iter()
        .find(|(value, _)| *value == code)
        .map(|(_, name)| *name)
}

/// Code for `name` in `table`.
pub fn reverse_lookup(table: &[(u16, &'static str)], name: &str) -> Option<u16> {
    table
        .iter()
        .find(|(_, label)| *label == name)
        .map(|(code, _)| *code)
}

/// Unit of measurement for a snapshot field, if it has one.
pub fn unit_of(field: &str) -> Option<&'static str> {
    let unit = match field {
        "supply_pressure" | "exhaust_pressure" => "Pa",
        "supply_airflow_setpoint"
        | "supply_airflow_actual"
        | "exhaust_airflow_actual"
        | "desired_flow_rate"
        | "flow_preset_holiday"
        | "flow_preset_low"
        | "flow_preset_normal"
        | "flow_preset_high"
        | "effective_flow_rate" => "m³/h",
        "supply_massflow" => "kg/h",
        "supply_fan_speed" | "exhaust_fan_speed" => "rpm",
        "supply_fan_temperature"
        | "exhaust_fan_temperature"
        | "outside_temperature"
        | "dwelling_temperature"
        | "bypass_temp_dwelling"
        | "bypass_temp_outside" => "°C",
        "supply_fan_humidity" | "exhaust_fan_humidity" | "rht_humidity" => "%",
        "bypass_step_position" | "preheater_capacity" | "frost_fan_reduction" => "%",
        "frost_heater_power" => "W",
        "co2_sensor1" | "co2_sensor2" => "ppm",
        "operating_hours" | "filter_hours" => "h",
        "filter_warning_days" => "d",
        _ => return None,
    };
    Some(unit)
}

/// Fields that only ever grow.
pub fn is_counter(field: &str) -> bool {
    matches!(field, "operating_hours" | "filter_hours")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(ACTIVE_FUNCTIONS, 12), Some("Auto Modbus"));
        assert_eq!(lookup(ACTIVE_FUNCTIONS, 2), None);
        assert_eq!(lookup(FAN_STATUSES, 4), Some("Running"));
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(reverse_lookup(BYPASS_MODES, "Closed"), Some(1));
        assert_eq!(reverse_lookup(SWITCH_POSITIONS, "high"), Some(3));
        assert_eq!(reverse_lookup(BYPASS_MODES, "closed"), None);
    }

    #[test]
    fn test_units() {
        assert_eq!(unit_of("supply_pressure"), Some("Pa"));
        assert_eq!(unit_of("co2_sensor2"), Some("ppm"));
        assert_eq!(unit_of("active_function"), None);
        assert!(is_counter("operating_hours"));
        assert!(!is_counter("supply_fan_speed"));
    }
}
