//! Pulse-generator PLC control over Modbus RTU
//!
//! This library drives the pulse generator of an analog signal test rig over a
//! serial Modbus RTU link. Device registers are exposed as typed parameters
//! (pulse enable, frequency, duty ratio, switch outputs); every operation opens
//! the port, runs one transaction under a link-wide lock and closes it again.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, DeviceConfig};
pub use devices::{ConnectionState, Parameter, Plc, PlcController, RegisterAddress, RegisterMap};
pub use modbus::{Connector, LinkGuard, SerialConnector, SimulatedSlave, Transaction};
pub use utils::error::{ConfigError, ErrorKind, ModbusError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
