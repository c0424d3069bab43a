//! Zenoh bridge for Ubbink/Brink Vigor ventilation units.
//!
//! Polls the appliance over Modbus (RTU on a serial port, or through a
//! TCP bridge) and publishes the decoded state to Zenoh as telemetry.
//! Control commands arrive on a per-device command key.
//!
//! # Key Expressions
//!
//! ```text
//! zensight/vigor/<device>/<field>       telemetry, one key per field
//! zensight/vigor/<device>/@/command     control commands (JSON)
//! zensight/vigor/@/status               bridge status
//! ```
//!
//! # Commands
//!
//! ```json
//! {"command": "set_airflow_mode", "mode": "low"}
//! {"command": "set_custom_flow_rate", "rate": 220}
//! {"command": "set_standby", "standby": true}
//! ```

pub mod bridge;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod decode;
pub mod registers;
pub mod snapshot;
pub mod transport;

pub use commands::{Command, CommandEncoder, CommandError};
pub use coordinator::{Coordinator, CoordinatorHandle, PollError, PollSettings, PollState};
pub use snapshot::{DeviceSnapshot, FieldValue, SnapshotProvider};
pub use transport::{Connector, RegisterLink, TransportError, TransportSettings, VigorClient};
