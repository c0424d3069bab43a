//! Configuration for the Vigor bridge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use vigor_bridge_framework::{BridgeConfig, BridgeError, Format, LoggingConfig, ZenohConfig};

use crate::coordinator::PollSettings;
use crate::transport::TransportSettings;

/// Baud rates the appliance's Modbus interface can be configured for.
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 56000, 115200];

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigorBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Serialization format for published telemetry
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Appliance settings
    pub vigor: VigorConfig,
}

/// Vigor-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigorConfig {
    /// Key expression prefix (default: "zensight/vigor")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// The appliance to poll
    pub device: DeviceConfig,
}

fn default_key_prefix() -> String {
    "zensight/vigor".to_string()
}

/// Configuration for the ventilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used in key expressions)
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Physical link to the appliance
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Normal poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Poll interval in seconds while the appliance is unreachable
    #[serde(default = "default_backoff_interval")]
    pub backoff_interval_secs: u64,

    /// Consecutive failed cycles before switching to the backoff interval
    #[serde(default = "default_failures_before_backoff")]
    pub failures_before_backoff: u32,

    /// Pause before every request, in milliseconds
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Extra attempts after a timed out request
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Response timeout in milliseconds (default: 3000 serial, 5000 TCP)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_device_name() -> String {
    "vigor".to_string()
}

fn default_unit_id() -> u8 {
    20
}

fn default_poll_interval() -> u64 {
    30
}

fn default_backoff_interval() -> u64 {
    120
}

fn default_failures_before_backoff() -> u32 {
    3
}

fn default_request_delay_ms() -> u64 {
    150
}

fn default_retries() -> u32 {
    2
}

/// Connection configuration (direct serial or TCP through a bridge device).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus RTU on a local serial port
    Serial {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 19200)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Parity: "N", "E" or "O" (default: "E")
        #[serde(default)]
        parity: Parity,
    },
    /// Modbus over TCP through a serial-to-network bridge
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
        /// What kind of bridge sits at the other end
        #[serde(default)]
        bridge: BridgeKind,
    },
}

fn default_baud_rate() -> u32 {
    19200
}

fn default_modbus_port() -> u16 {
    502
}

/// Serial parity. Stop bits follow from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N", alias = "none", alias = "n")]
    None,
    #[default]
    #[serde(rename = "E", alias = "even", alias = "e")]
    Even,
    #[serde(rename = "O", alias = "odd", alias = "o")]
    Odd,
}

impl Parity {
    /// Two stop bits without parity, one otherwise, keeping the frame at 11 bits.
    pub fn stop_bits(self) -> u8 {
        match self {
            Parity::None => 2,
            Parity::Even | Parity::Odd => 1,
        }
    }

    fn as_char(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

/// Framing spoken by the TCP bridge device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeKind {
    /// Raw serial tunnel (ser2net style): RTU frames over the byte stream.
    #[default]
    #[serde(rename = "tunnel", alias = "ser2net")]
    Tunnel,
    /// Protocol converting gateway (mbusd style): Modbus TCP with MBAP header.
    #[serde(rename = "gateway", alias = "mbusd")]
    Gateway,
}

impl BridgeKind {
    /// Return the string name for this bridge kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Tunnel => "tunnel",
            BridgeKind::Gateway => "gateway",
        }
    }
}

impl ConnectionConfig {
    /// Response timeout used when none is configured.
    pub fn default_timeout(&self) -> Duration {
        match self {
            ConnectionConfig::Serial { .. } => Duration::from_secs(3),
            ConnectionConfig::Tcp { .. } => Duration::from_secs(5),
        }
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionConfig::Serial {
                port,
                baud_rate,
                parity,
            } => write!(
                f,
                "serial://{} {} 8{}{}",
                port,
                baud_rate,
                parity.as_char(),
                parity.stop_bits()
            ),
            ConnectionConfig::Tcp { host, port, bridge } => {
                write!(f, "tcp://{}:{} ({})", host, port, bridge.as_str())
            }
        }
    }
}

impl DeviceConfig {
    /// Response timeout for a single request.
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.connection.default_timeout())
    }

    /// Pacing, timeout and retry settings for the transport client.
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            request_delay: Duration::from_millis(self.request_delay_ms),
            timeout: self.timeout(),
            retries: self.retries,
        }
    }

    /// Cadence settings for the coordinator.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            backoff_interval: Duration::from_secs(self.backoff_interval_secs),
            failures_before_backoff: self.failures_before_backoff,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Device name cannot be empty".to_string());
        }

        if !(1..=247).contains(&self.unit_id) {
            return Err(format!(
                "Device '{}': unit_id must be 1-247, got {}",
                self.name, self.unit_id
            ));
        }

        if self.poll_interval_secs == 0 || self.backoff_interval_secs == 0 {
            return Err(format!(
                "Device '{}': poll intervals must be greater than zero",
                self.name
            ));
        }

        if self.failures_before_backoff == 0 {
            return Err(format!(
                "Device '{}': failures_before_backoff must be at least 1",
                self.name
            ));
        }

        if self.timeout_ms == Some(0) {
            return Err(format!("Device '{}': timeout_ms must be positive", self.name));
        }

        match &self.connection {
            ConnectionConfig::Serial {
                port, baud_rate, ..
            } => {
                if port.is_empty() {
                    return Err(format!("Device '{}': serial port cannot be empty", self.name));
                }
                if !SUPPORTED_BAUD_RATES.contains(baud_rate) {
                    return Err(format!(
                        "Device '{}': unsupported baud rate {} (use one of {:?})",
                        self.name, baud_rate, SUPPORTED_BAUD_RATES
                    ));
                }
            }
            ConnectionConfig::Tcp { host, port, .. } => {
                if host.is_empty() {
                    return Err(format!("Device '{}': host cannot be empty", self.name));
                }
                if *port == 0 {
                    return Err(format!("Device '{}': TCP port cannot be 0", self.name));
                }
            }
        }

        Ok(())
    }
}

impl BridgeConfig for VigorBridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        &self.vigor.key_prefix
    }

    fn serialization(&self) -> Format {
        self.serialization
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.vigor.key_prefix.is_empty() {
            return Err(BridgeError::validation("key_prefix cannot be empty"));
        }
        self.vigor.device.validate().map_err(BridgeError::validation)
    }
}
