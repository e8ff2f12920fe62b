//! Modbus RTU master framing for the three holding-register functions the
//! PLC uses.

use super::crc::{append_crc, verify_crc};
use crate::utils::error::ModbusError;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Slave address + exception function + exception code + CRC.
pub const EXCEPTION_FRAME_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadHoldingRegisters {
        slave: u8,
        start_register: u16,
        quantity: u16,
    },
    WriteSingleRegister {
        slave: u8,
        register: u16,
        value: u16,
    },
    WriteMultipleRegisters {
        slave: u8,
        start_register: u16,
        values: Vec<u16>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    Registers(Vec<u16>),
    WriteSingleAck { register: u16, value: u16 },
    WriteMultipleAck { start_register: u16, quantity: u16 },
}

impl ModbusRequest {
    pub fn slave(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { slave, .. }
            | ModbusRequest::WriteSingleRegister { slave, .. }
            | ModbusRequest::WriteMultipleRegisters { slave, .. } => *slave,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
            ModbusRequest::WriteSingleRegister { .. } => WRITE_SINGLE_REGISTER,
            ModbusRequest::WriteMultipleRegisters { .. } => WRITE_MULTIPLE_REGISTERS,
        }
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        match self {
            ModbusRequest::ReadHoldingRegisters { quantity, .. } => {
                if *quantity == 0 || *quantity > MAX_READ_REGISTERS {
                    return Err(ModbusError::InvalidRequest(format!(
                        "Read quantity {} out of range 1-{}",
                        quantity, MAX_READ_REGISTERS
                    )));
                }
            }
            ModbusRequest::WriteMultipleRegisters { values, .. } => {
                if values.is_empty() || values.len() > MAX_WRITE_REGISTERS as usize {
                    return Err(ModbusError::InvalidRequest(format!(
                        "Write quantity {} out of range 1-{}",
                        values.len(),
                        MAX_WRITE_REGISTERS
                    )));
                }
            }
            ModbusRequest::WriteSingleRegister { .. } => {}
        }
        Ok(())
    }

    /// Complete RTU frame including CRC.
    pub fn to_frame(&self) -> Result<Vec<u8>, ModbusError> {
        self.validate()?;

        let mut frame = vec![self.slave(), self.function_code()];
        match self {
            ModbusRequest::ReadHoldingRegisters { start_register, quantity, .. } => {
                frame.extend_from_slice(&start_register.to_be_bytes());
                frame.extend_from_slice(&quantity.to_be_bytes());
            }
            ModbusRequest::WriteSingleRegister { register, value, .. } => {
                frame.extend_from_slice(&register.to_be_bytes());
                frame.extend_from_slice(&value.to_be_bytes());
            }
            ModbusRequest::WriteMultipleRegisters { start_register, values, .. } => {
                frame.extend_from_slice(&start_register.to_be_bytes());
                frame.extend_from_slice(&(values.len() as u16).to_be_bytes());
                frame.push((values.len() * 2) as u8);
                for value in values {
                    frame.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
        append_crc(&mut frame);
        Ok(frame)
    }

    /// Length of a normal (non-exception) reply.
    pub fn expected_response_len(&self) -> usize {
        match self {
            // address + function + byte count + data + CRC
            ModbusRequest::ReadHoldingRegisters { quantity, .. } => 5 + (*quantity as usize) * 2,
            // echo of address, function, register, value/quantity + CRC
            ModbusRequest::WriteSingleRegister { .. }
            | ModbusRequest::WriteMultipleRegisters { .. } => 8,
        }
    }

    /// Decodes a complete reply frame to this request.
    pub fn parse_response(&self, frame: &[u8]) -> Result<ModbusResponse, ModbusError> {
        if frame.len() < EXCEPTION_FRAME_LEN {
            return Err(ModbusError::InvalidResponse(format!(
                "Response too short: {} bytes",
                frame.len()
            )));
        }

        verify_crc(frame)
            .map_err(|(calculated, received)| ModbusError::CrcError { calculated, received })?;

        if frame[0] != self.slave() {
            return Err(ModbusError::InvalidResponse(format!(
                "Response from slave {} while addressing slave {}",
                frame[0],
                self.slave()
            )));
        }

        let function = frame[1];
        if function == self.function_code() | EXCEPTION_FLAG {
            return Err(ModbusError::Exception {
                function: self.function_code(),
                code: frame[2],
            });
        }
        if function != self.function_code() {
            return Err(ModbusError::InvalidResponse(format!(
                "Unexpected function code: 0x{:02x}",
                function
            )));
        }

        if frame.len() != self.expected_response_len() {
            return Err(ModbusError::InvalidResponse(format!(
                "Expected {} bytes, got {}",
                self.expected_response_len(),
                frame.len()
            )));
        }

        let word = |offset: usize| u16::from_be_bytes([frame[offset], frame[offset + 1]]);

        match self {
            ModbusRequest::ReadHoldingRegisters { quantity, .. } => {
                let byte_count = frame[2] as usize;
                if byte_count != (*quantity as usize) * 2 {
                    return Err(ModbusError::InvalidResponse(format!(
                        "Byte count {} does not match {} registers",
                        byte_count, quantity
                    )));
                }
                let registers = frame[3..3 + byte_count]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(ModbusResponse::Registers(registers))
            }
            ModbusRequest::WriteSingleRegister { register, value, .. } => {
                let (echo_register, echo_value) = (word(2), word(4));
                if echo_register != *register || echo_value != *value {
                    return Err(ModbusError::InvalidResponse(format!(
                        "Write echo mismatch: register {} value {}",
                        echo_register, echo_value
                    )));
                }
                Ok(ModbusResponse::WriteSingleAck { register: echo_register, value: echo_value })
            }
            ModbusRequest::WriteMultipleRegisters { start_register, values, .. } => {
                let (echo_start, echo_quantity) = (word(2), word(4));
                if echo_start != *start_register || echo_quantity as usize != values.len() {
                    return Err(ModbusError::InvalidResponse(format!(
                        "Write echo mismatch: start {} quantity {}",
                        echo_start, echo_quantity
                    )));
                }
                Ok(ModbusResponse::WriteMultipleAck {
                    start_register: echo_start,
                    quantity: echo_quantity,
                })
            }
        }
    }

    /// Decodes a request frame as a slave would see it.
    pub fn from_frame(frame: &[u8]) -> Result<Self, ModbusError> {
        if frame.len() < 8 {
            return Err(ModbusError::InvalidRequest(format!(
                "Request too short: {} bytes",
                frame.len()
            )));
        }
        verify_crc(frame)
            .map_err(|(calculated, received)| ModbusError::CrcError { calculated, received })?;

        let slave = frame[0];
        let word = |offset: usize| u16::from_be_bytes([frame[offset], frame[offset + 1]]);

        let request = match frame[1] {
            READ_HOLDING_REGISTERS => ModbusRequest::ReadHoldingRegisters {
                slave,
                start_register: word(2),
                quantity: word(4),
            },
            WRITE_SINGLE_REGISTER => ModbusRequest::WriteSingleRegister {
                slave,
                register: word(2),
                value: word(4),
            },
            WRITE_MULTIPLE_REGISTERS => {
                let quantity = word(4) as usize;
                let byte_count = frame[6] as usize;
                if byte_count != quantity * 2 || frame.len() != 9 + byte_count {
                    return Err(ModbusError::InvalidRequest(format!(
                        "Malformed write-multiple frame: quantity {}, byte count {}",
                        quantity, byte_count
                    )));
                }
                let values = frame[7..7 + byte_count]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                ModbusRequest::WriteMultipleRegisters { slave, start_register: word(2), values }
            }
            other => {
                return Err(ModbusError::InvalidRequest(format!(
                    "Unsupported function code: 0x{:02x}",
                    other
                )))
            }
        };
        Ok(request)
    }

    /// Frame length implied by the first bytes of a request, once enough of
    /// it has arrived to tell.
    pub fn frame_len_hint(partial: &[u8]) -> Option<usize> {
        match partial.get(1)? {
            &WRITE_MULTIPLE_REGISTERS => partial.get(6).map(|count| 9 + *count as usize),
            _ => Some(8),
        }
    }
}

/// Builds the slave-side reply frame for a successful request.
pub fn encode_response(request: &ModbusRequest, response: &ModbusResponse) -> Vec<u8> {
    let mut frame = vec![request.slave(), request.function_code()];
    match response {
        ModbusResponse::Registers(registers) => {
            frame.push((registers.len() * 2) as u8);
            for register in registers {
                frame.extend_from_slice(&register.to_be_bytes());
            }
        }
        ModbusResponse::WriteSingleAck { register, value } => {
            frame.extend_from_slice(&register.to_be_bytes());
            frame.extend_from_slice(&value.to_be_bytes());
        }
        ModbusResponse::WriteMultipleAck { start_register, quantity } => {
            frame.extend_from_slice(&start_register.to_be_bytes());
            frame.extend_from_slice(&quantity.to_be_bytes());
        }
    }
    append_crc(&mut frame);
    frame
}

/// Builds a slave exception reply frame.
pub fn encode_exception(slave: u8, function: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![slave, function | EXCEPTION_FLAG, code];
    append_crc(&mut frame);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_matches_reference_frame() {
        let request = ModbusRequest::ReadHoldingRegisters { slave: 1, start_register: 0, quantity: 1 };
        assert_eq!(
            request.to_frame().unwrap(),
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
        assert_eq!(request.expected_response_len(), 7);
    }

    #[test]
    fn write_multiple_frame_layout() {
        let request = ModbusRequest::WriteMultipleRegisters {
            slave: 2,
            start_register: 0x0001,
            values: vec![0x000A, 0x0102],
        };
        let frame = request.to_frame().unwrap();
        assert_eq!(&frame[..11], &[0x02, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        assert_eq!(frame.len(), 13);
        assert_eq!(ModbusRequest::frame_len_hint(&frame[..7]), Some(13));
        assert_eq!(ModbusRequest::from_frame(&frame).unwrap(), request);
    }

    #[test]
    fn rejects_out_of_range_quantities() {
        let read = ModbusRequest::ReadHoldingRegisters { slave: 1, start_register: 0, quantity: 0 };
        assert!(matches!(read.to_frame(), Err(ModbusError::InvalidRequest(_))));

        let write = ModbusRequest::WriteMultipleRegisters {
            slave: 1,
            start_register: 0,
            values: vec![0; 124],
        };
        assert!(matches!(write.to_frame(), Err(ModbusError::InvalidRequest(_))));
    }

    #[test]
    fn parses_register_reply() {
        let request = ModbusRequest::ReadHoldingRegisters { slave: 2, start_register: 1, quantity: 2 };
        let reply = encode_response(&request, &ModbusResponse::Registers(vec![1000, 0xFFFF]));
        assert_eq!(
            request.parse_response(&reply).unwrap(),
            ModbusResponse::Registers(vec![1000, 0xFFFF])
        );
    }

    #[test]
    fn detects_crc_mismatch() {
        let request = ModbusRequest::ReadHoldingRegisters { slave: 2, start_register: 1, quantity: 1 };
        let mut reply = encode_response(&request, &ModbusResponse::Registers(vec![42]));
        let last = reply.len() - 1;
        reply[last] ^= 0x55;
        assert!(matches!(request.parse_response(&reply), Err(ModbusError::CrcError { .. })));
    }

    #[test]
    fn surfaces_slave_exception() {
        let request = ModbusRequest::WriteSingleRegister { slave: 2, register: 9, value: 1 };
        let reply = encode_exception(2, WRITE_SINGLE_REGISTER, 0x02);
        assert!(matches!(
            request.parse_response(&reply),
            Err(ModbusError::Exception { function: 0x06, code: 0x02 })
        ));
    }

    #[test]
    fn rejects_reply_from_other_slave() {
        let request = ModbusRequest::WriteSingleRegister { slave: 2, register: 1, value: 7 };
        let other = ModbusRequest::WriteSingleRegister { slave: 3, register: 1, value: 7 };
        let reply = encode_response(&other, &ModbusResponse::WriteSingleAck { register: 1, value: 7 });
        assert!(matches!(request.parse_response(&reply), Err(ModbusError::InvalidResponse(_))));
    }
}
