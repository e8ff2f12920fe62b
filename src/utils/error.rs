use std::fmt;
use std::io;
use thiserror::Error;

/// Coarse classification of a failed exchange.
///
/// The controller's boolean surface throws this away; callers using the
/// `Result` returning methods can match on it to tell an absent device from a
/// garbled reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Port missing, cannot be opened, or I/O failed mid-exchange.
    Transport,
    /// Malformed reply, CRC mismatch, slave exception or a request that cannot be framed.
    Protocol,
    /// No complete reply within the configured timeout.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC checksum mismatch (calculated 0x{calculated:04X}, received 0x{received:04X})")]
    CrcError { calculated: u16, received: u16 },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Slave exception 0x{code:02X} ({}) for function 0x{function:02X}", exception_name(*.code))]
    Exception { function: u8, code: u8 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout occurred")]
    Timeout,
}

impl ModbusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModbusError::PortNotFound(_)
            | ModbusError::ConnectionError(_)
            | ModbusError::CommunicationError(_) => ErrorKind::Transport,
            ModbusError::CrcError { .. }
            | ModbusError::InvalidResponse(_)
            | ModbusError::Exception { .. }
            | ModbusError::InvalidRequest(_) => ErrorKind::Protocol,
            ModbusError::Timeout => ErrorKind::Timeout,
        }
    }
}

impl From<io::Error> for ModbusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ModbusError::Timeout,
            _ => ModbusError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => ModbusError::PortNotFound(err.description),
            serialport::ErrorKind::Io(io::ErrorKind::TimedOut) => ModbusError::Timeout,
            _ => ModbusError::ConnectionError(err.description),
        }
    }
}

/// Standard Modbus exception code names.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "slave device failure",
        0x05 => "acknowledge",
        0x06 => "slave device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
