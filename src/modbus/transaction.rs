use log::{debug, warn};
use std::io::ErrorKind as IoErrorKind;
use std::time::Instant;

use super::link::{Connector, Link};
use super::protocol::{ModbusRequest, ModbusResponse, EXCEPTION_FLAG, EXCEPTION_FRAME_LEN};
use crate::config::DeviceConfig;
use crate::utils::error::ModbusError;

/// One request/response exchange over a freshly opened port.
///
/// The port is opened when the operation starts and dropped when it returns,
/// whatever the outcome. Nothing is retried.
pub struct Transaction<'a> {
    connector: &'a dyn Connector,
    config: &'a DeviceConfig,
}

impl<'a> Transaction<'a> {
    pub fn new(connector: &'a dyn Connector, config: &'a DeviceConfig) -> Self {
        Self { connector, config }
    }

    pub fn read_registers(self, slave: u8, address: u16, count: u16) -> Result<Vec<u16>, ModbusError> {
        let request = ModbusRequest::ReadHoldingRegisters { slave, start_register: address, quantity: count };
        match self.execute(&request)? {
            ModbusResponse::Registers(values) => Ok(values),
            other => Err(ModbusError::InvalidResponse(format!("Unexpected reply {:?}", other))),
        }
    }

    pub fn write_register(self, slave: u8, address: u16, value: u16) -> Result<(), ModbusError> {
        let request = ModbusRequest::WriteSingleRegister { slave, register: address, value };
        self.execute(&request).map(|_| ())
    }

    pub fn write_registers(self, slave: u8, address: u16, values: &[u16]) -> Result<(), ModbusError> {
        let request = ModbusRequest::WriteMultipleRegisters {
            slave,
            start_register: address,
            values: values.to_vec(),
        };
        self.execute(&request).map(|_| ())
    }

    fn execute(&self, request: &ModbusRequest) -> Result<ModbusResponse, ModbusError> {
        // Frame before opening so a bad request never touches the port.
        let frame = request.to_frame()?;

        let mut link = self.connector.open(self.config)?;
        let result = self.exchange(link.as_mut(), request, &frame);
        drop(link);

        if let Err(e) = &result {
            warn!(
                "⚠️  Function 0x{:02x} to slave {} on {} failed ({}): {}",
                request.function_code(),
                request.slave(),
                self.config.port_name,
                e.kind(),
                e
            );
        }
        result
    }

    fn exchange(
        &self,
        link: &mut dyn Link,
        request: &ModbusRequest,
        frame: &[u8],
    ) -> Result<ModbusResponse, ModbusError> {
        debug!("📤 Sending frame: {}", hex::encode(frame));

        link.set_timeout(self.config.write_timeout)?;
        link.write_all(frame)?;
        link.flush()?;

        link.set_timeout(self.config.read_timeout)?;
        let response = self.read_response(link, request.expected_response_len())?;
        debug!("📥 Complete response: {}", hex::encode(&response));

        request.parse_response(&response)
    }

    fn read_response(&self, link: &mut dyn Link, expected_length: usize) -> Result<Vec<u8>, ModbusError> {
        let mut response = Vec::with_capacity(expected_length);
        let mut buffer = [0u8; 256];
        let deadline = Instant::now() + self.config.read_timeout;

        while response.len() < expected_length {
            // An exception reply is shorter than any normal one.
            if response.len() >= EXCEPTION_FRAME_LEN && response[1] & EXCEPTION_FLAG != 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ModbusError::Timeout);
            }

            let wanted = (expected_length - response.len()).min(buffer.len());
            match link.read(&mut buffer[..wanted]) {
                Ok(0) => return Err(ModbusError::Timeout),
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(ref e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(response)
    }
}
