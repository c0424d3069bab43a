//! Control writes.
//!
//! Inputs are checked before anything goes on the wire. Two-register
//! commands stop at the first failed write and do not undo the first one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::registers as reg;
use crate::transport::{TransportError, VigorClient};

/// Error type for commands.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid value: {0}")]
    Validation(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Airflow selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirflowMode {
    WallUnit,
    Holiday,
    Low,
    Normal,
    High,
}

impl AirflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirflowMode::WallUnit => "wall_unit",
            AirflowMode::Holiday => "holiday",
            AirflowMode::Low => "low",
            AirflowMode::Normal => "normal",
            AirflowMode::High => "high",
        }
    }

    /// Value for the switch-position register, `None` for the wall unit.
    pub fn switch_code(&self) -> Option<u16> {
        reg::reverse_lookup(reg::SWITCH_POSITIONS, self.as_str())
    }
}

impl FromStr for AirflowMode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wall_unit" => Ok(AirflowMode::WallUnit),
            "holiday" => Ok(AirflowMode::Holiday),
            "low" => Ok(AirflowMode::Low),
            "normal" => Ok(AirflowMode::Normal),
            "high" => Ok(AirflowMode::High),
            other => Err(CommandError::Validation(format!(
                "unknown airflow mode '{}'",
                other
            ))),
        }
    }
}

/// Bypass valve mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BypassMode(u16);

impl BypassMode {
    pub fn code(&self) -> u16 {
        self.0
    }
}

impl FromStr for BypassMode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        reg::reverse_lookup(reg::BYPASS_MODES, s)
            .map(BypassMode)
            .ok_or_else(|| CommandError::Validation(format!("unknown bypass mode '{}'", s)))
    }
}

/// Clamp a requested flow rate to what the unit accepts.
pub fn clamp_flow_rate(rate: i64) -> u16 {
    // the clamped range fits in u16
    rate.clamp(reg::FLOW_RATE_MIN, reg::FLOW_RATE_MAX) as u16
}

/// Degrees Celsius to truncated tenths, clamped to `range`.
pub fn threshold_tenths(celsius: f64, range: (i64, i64)) -> Result<u16, CommandError> {
    if !celsius.is_finite() {
        return Err(CommandError::Validation(format!(
            "temperature must be a number, got {}",
            celsius
        )));
    }
    let tenths = (celsius * 10.0).trunc() as i64;
    Ok(tenths.clamp(range.0, range.1) as u16)
}

/// A control command as received from the outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetAirflowMode { mode: String },
    SetCustomFlowRate { rate: i64 },
    SetBypassMode { mode: String },
    SetBypassTempDwelling { celsius: f64 },
    SetBypassTempOutside { celsius: f64 },
    ResetFilter,
    ResetAppliance,
    SetStandby { standby: bool },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetAirflowMode { mode } => write!(f, "set_airflow_mode({})", mode),
            Command::SetCustomFlowRate { rate } => write!(f, "set_custom_flow_rate({})", rate),
            Command::SetBypassMode { mode } => write!(f, "set_bypass_mode({})", mode),
            Command::SetBypassTempDwelling { celsius } => {
                write!(f, "set_bypass_temp_dwelling({})", celsius)
            }
            Command::SetBypassTempOutside { celsius } => {
                write!(f, "set_bypass_temp_outside({})", celsius)
            }
            Command::ResetFilter => f.write_str("reset_filter"),
            Command::ResetAppliance => f.write_str("reset_appliance"),
            Command::SetStandby { standby } => write!(f, "set_standby({})", standby),
        }
    }
}

/// Issues control writes through the transport client.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    client: Arc<VigorClient>,
}

impl CommandEncoder {
    pub fn new(client: Arc<VigorClient>) -> Self {
        Self { client }
    }

    pub async fn execute(&self, command: &Command) -> Result<(), CommandError> {
        let result = match command {
            Command::SetAirflowMode { mode } => self.set_airflow_mode(mode).await,
            Command::SetCustomFlowRate { rate } => self.set_custom_flow_rate(*rate).await,
            Command::SetBypassMode { mode } => self.set_bypass_mode(mode).await,
            Command::SetBypassTempDwelling { celsius } => {
                self.set_bypass_temp_dwelling(*celsius).await
            }
            Command::SetBypassTempOutside { celsius } => {
                self.set_bypass_temp_outside(*celsius).await
            }
            Command::ResetFilter => self.reset_filter().await,
            Command::ResetAppliance => self.reset_appliance().await,
            Command::SetStandby { standby } => self.set_standby(*standby).await,
        };

        match &result {
            Ok(()) => info!(command = %command, "Command applied"),
            Err(e) => error!(command = %command, error = %e, "Command failed"),
        }
        result
    }

    /// `wall_unit` hands control back to the wall switch; a preset puts the
    /// unit under Modbus switch control and selects the position.
    pub async fn set_airflow_mode(&self, mode: &str) -> Result<(), CommandError> {
        let mode: AirflowMode = mode.parse()?;
        match mode.switch_code() {
            None => self.write(reg::MODBUS_CONTROL, reg::CONTROL_WALL_UNIT).await,
            Some(code) => {
                self.write(reg::MODBUS_CONTROL, reg::CONTROL_SWITCH).await?;
                self.write(reg::SWITCH_POSITION, code).await
            }
        }
    }

    /// Flow-rate control at `rate` m³/h, clamped to 0..=400.
    pub async fn set_custom_flow_rate(&self, rate: i64) -> Result<(), CommandError> {
        let rate = clamp_flow_rate(rate);
        self.write(reg::MODBUS_CONTROL, reg::CONTROL_FLOW_RATE).await?;
        self.write(reg::DESIRED_FLOW_RATE, rate).await
    }

    pub async fn set_bypass_mode(&self, mode: &str) -> Result<(), CommandError> {
        let mode: BypassMode = mode.parse()?;
        self.write(reg::BYPASS_MODE, mode.code()).await
    }

    /// Dwelling temperature above which the bypass may open (15.0..=35.0 °C).
    pub async fn set_bypass_temp_dwelling(&self, celsius: f64) -> Result<(), CommandError> {
        let value = threshold_tenths(celsius, reg::BYPASS_DWELLING_RANGE)?;
        self.write(reg::BYPASS_TEMP_DWELLING, value).await
    }

    /// Minimum outside temperature for the bypass (7.0..=15.0 °C).
    pub async fn set_bypass_temp_outside(&self, celsius: f64) -> Result<(), CommandError> {
        let value = threshold_tenths(celsius, reg::BYPASS_OUTSIDE_RANGE)?;
        self.write(reg::BYPASS_TEMP_OUTSIDE, value).await
    }

    pub async fn reset_filter(&self) -> Result<(), CommandError> {
        self.write(reg::FILTER_RESET, 1).await
    }

    pub async fn reset_appliance(&self) -> Result<(), CommandError> {
        self.write(reg::APPLIANCE_RESET, 1).await
    }

    pub async fn set_standby(&self, standby: bool) -> Result<(), CommandError> {
        let value = if standby {
            reg::STANDBY_ON
        } else {
            reg::STANDBY_OFF
        };
        self.write(reg::STANDBY, value).await
    }

    async fn write(&self, address: u16, value: u16) -> Result<(), CommandError> {
        Ok(self.client.write_register(address, value).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_flow_rate() {
        assert_eq!(clamp_flow_rate(500), 400);
        assert_eq!(clamp_flow_rate(-10), 0);
        assert_eq!(clamp_flow_rate(225), 225);
    }

    #[test]
    fn test_threshold_tenths() {
        assert_eq!(threshold_tenths(21.3, reg::BYPASS_DWELLING_RANGE), Ok(213));
        assert_eq!(threshold_tenths(40.0, reg::BYPASS_DWELLING_RANGE), Ok(350));
        assert_eq!(threshold_tenths(10.0, reg::BYPASS_DWELLING_RANGE), Ok(150));
        assert_eq!(threshold_tenths(12.55, reg::BYPASS_OUTSIDE_RANGE), Ok(125));
        assert_eq!(threshold_tenths(-5.0, reg::BYPASS_OUTSIDE_RANGE), Ok(70));
        assert!(threshold_tenths(f64::NAN, reg::BYPASS_OUTSIDE_RANGE).is_err());
    }

    #[test]
    fn test_airflow_mode_parse() {
        assert_eq!("low".parse::<AirflowMode>(), Ok(AirflowMode::Low));
        assert_eq!(AirflowMode::High.switch_code(), Some(3));
        assert_eq!(AirflowMode::WallUnit.switch_code(), None);
        assert!(matches!(
            "invalid".parse::<AirflowMode>(),
            Err(CommandError::Validation(_))
        ));
        assert!("custom".parse::<AirflowMode>().is_err());
    }

    #[test]
    fn test_bypass_mode_parse() {
        assert_eq!("Closed".parse::<BypassMode>().map(|m| m.code()), Ok(1));
        assert_eq!("Open".parse::<BypassMode>().map(|m| m.code()), Ok(2));
        assert!("open".parse::<BypassMode>().is_err());
    }

    #[test]
    fn test_command_json() {
        let cmd: Command =
            serde_json::from_str(r#"{"command":"set_airflow_mode","mode":"low"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::SetAirflowMode {
                mode: "low".to_string()
            }
        );

        let cmd: Command = serde_json::from_str(r#"{"command":"reset_filter"}"#).unwrap();
        assert_eq!(cmd, Command::ResetFilter);

        let cmd: Command =
            serde_json::from_str(r#"{"command":"set_bypass_temp_outside","celsius":12.5}"#)
                .unwrap();
        assert_eq!(cmd.to_string(), "set_bypass_temp_outside(12.5)");

        assert!(serde_json::from_str::<Command>(r#"{"command":"self_destruct"}"#).is_err());
    }
}
