pub mod error;

pub use error::{ConfigError, ErrorKind, ModbusError};
