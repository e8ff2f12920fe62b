pub mod crc;
pub mod guard;
pub mod link;
pub mod protocol;
pub mod simulator;
pub mod transaction;

pub use crc::crc16_modbus;
pub use guard::LinkGuard;
pub use link::{Connector, Link, SerialConnector};
pub use protocol::{ModbusRequest, ModbusResponse};
pub use simulator::{Fault, SimulatedSlave};
pub use transaction::Transaction;
