//! In-memory Modbus RTU slave behind the [`Connector`] seam.
//!
//! Every `open` hands out a fresh link that decodes the master's request
//! frame, applies it to a shared register bank and queues the reply frame.
//! Faults can be injected to exercise the error paths, and session counters
//! show whether links were released and whether two ever overlapped.

use log::debug;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::link::{Connector, Link};
use super::protocol::{encode_exception, encode_response, ModbusRequest, ModbusResponse};
use crate::config::DeviceConfig;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The slave stays silent.
    NoResponse,
    /// The reply's last CRC byte is flipped.
    CorruptCrc,
    /// The slave answers with this exception code.
    Exception(u8),
}

#[derive(Debug, Default)]
struct SlaveState {
    registers: HashMap<u16, u16>,
    fault: Option<Fault>,
    response_delay: Duration,
    read_chunk: Option<usize>,
}

#[derive(Debug)]
struct Shared {
    slave_address: u8,
    port_name: String,
    state: Mutex<SlaveState>,
    open_sessions: AtomicUsize,
    max_concurrent_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SlaveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedSlave {
    shared: Arc<Shared>,
}

impl SimulatedSlave {
    pub fn new(slave_address: u8, port_name: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                slave_address,
                port_name: port_name.to_string(),
                state: Mutex::new(SlaveState::default()),
                open_sessions: AtomicUsize::new(0),
                max_concurrent_sessions: AtomicUsize::new(0),
                sessions_opened: AtomicUsize::new(0),
            }),
        }
    }

    pub fn register(&self, address: u16) -> u16 {
        self.shared.state().registers.get(&address).copied().unwrap_or(0)
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.shared.state().registers.insert(address, value);
    }

    pub fn set_fault(&self, fault: Option<Fault>) {
        self.shared.state().fault = fault;
    }

    /// Time the slave takes to answer, spent while the link is open.
    pub fn set_response_delay(&self, delay: Duration) {
        self.shared.state().response_delay = delay;
    }

    /// Caps how many reply bytes a single `read` hands back, like a UART
    /// delivering a frame in pieces. `None` returns everything queued.
    pub fn set_read_chunk(&self, chunk: Option<usize>) {
        self.shared.state().read_chunk = chunk.map(|n| n.max(1));
    }

    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.shared.max_concurrent_sessions.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }
}

impl Connector for SimulatedSlave {
    fn available_ports(&self) -> Result<Vec<String>, ModbusError> {
        Ok(vec![self.shared.port_name.clone()])
    }

    fn open(&self, config: &DeviceConfig) -> Result<Box<dyn Link>, ModbusError> {
        if config.port_name != self.shared.port_name {
            return Err(ModbusError::PortNotFound(config.port_name.clone()));
        }

        let now_open = self.shared.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_concurrent_sessions.fetch_max(now_open, Ordering::SeqCst);
        self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SimulatedLink {
            shared: Arc::clone(&self.shared),
            request: Vec::new(),
            reply: VecDeque::new(),
        }))
    }
}

struct SimulatedLink {
    shared: Arc<Shared>,
    request: Vec<u8>,
    reply: VecDeque<u8>,
}

impl SimulatedLink {
    fn handle_frame(&mut self) {
        let frame = std::mem::take(&mut self.request);
        let request = match ModbusRequest::from_frame(&frame) {
            Ok(request) => request,
            Err(e) => {
                debug!("Simulated slave ignored frame {}: {}", hex::encode(&frame), e);
                return;
            }
        };
        if request.slave() != self.shared.slave_address {
            return;
        }

        let (delay, fault) = {
            let state = self.shared.state();
            (state.response_delay, state.fault)
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let reply = match fault {
            Some(Fault::NoResponse) => return,
            Some(Fault::Exception(code)) => {
                encode_exception(request.slave(), request.function_code(), code)
            }
            Some(Fault::CorruptCrc) | None => {
                let mut reply = match self.apply(&request) {
                    Ok(response) => encode_response(&request, &response),
                    Err(code) => encode_exception(request.slave(), request.function_code(), code),
                };
                if fault == Some(Fault::CorruptCrc) {
                    if let Some(last) = reply.last_mut() {
                        *last ^= 0xFF;
                    }
                }
                reply
            }
        };
        self.reply.extend(reply);
    }

    fn apply(&self, request: &ModbusRequest) -> Result<ModbusResponse, u8> {
        const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
        const ILLEGAL_DATA_VALUE: u8 = 0x03;

        let mut state = self.shared.state();
        match request {
            ModbusRequest::ReadHoldingRegisters { start_register, quantity, .. } => {
                if request.validate().is_err() {
                    return Err(ILLEGAL_DATA_VALUE);
                }
                let end = *start_register as u32 + *quantity as u32;
                if end > 0x1_0000 {
                    return Err(ILLEGAL_DATA_ADDRESS);
                }
                let values = (*start_register as u32..end)
                    .map(|address| state.registers.get(&(address as u16)).copied().unwrap_or(0))
                    .collect();
                Ok(ModbusResponse::Registers(values))
            }
            ModbusRequest::WriteSingleRegister { register, value, .. } => {
                state.registers.insert(*register, *value);
                Ok(ModbusResponse::WriteSingleAck { register: *register, value: *value })
            }
            ModbusRequest::WriteMultipleRegisters { start_register, values, .. } => {
                if *start_register as usize + values.len() > 0x1_0000 {
                    return Err(ILLEGAL_DATA_ADDRESS);
                }
                for (offset, value) in values.iter().enumerate() {
                    state.registers.insert(start_register + offset as u16, *value);
                }
                Ok(ModbusResponse::WriteMultipleAck {
                    start_register: *start_register,
                    quantity: values.len() as u16,
                })
            }
        }
    }
}

impl Read for SimulatedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reply.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply from simulated slave"));
        }
        let chunk = self.shared.state().read_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(self.reply.len()).min(chunk);
        for (slot, byte) in buf.iter_mut().zip(self.reply.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.request.extend_from_slice(buf);
        if let Some(len) = ModbusRequest::frame_len_hint(&self.request) {
            if self.request.len() >= len {
                self.handle_frame();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for SimulatedLink {
    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), ModbusError> {
        Ok(())
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::crc::verify_crc;

    fn config(port: &str) -> DeviceConfig {
        DeviceConfig {
            port_name: port.to_string(),
            baud_rate: 9600,
            slave_address: 1,
            read_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn answers_read_with_valid_frame() {
        let slave = SimulatedSlave::new(1, "SIM0");
        slave.set_register(3, 0xFF00);

        let mut link = slave.open(&config("SIM0")).unwrap();
        let request = ModbusRequest::ReadHoldingRegisters { slave: 1, start_register: 3, quantity: 1 };
        link.write_all(&request.to_frame().unwrap()).unwrap();

        let mut reply = [0u8; 7];
        link.read_exact(&mut reply).unwrap();
        assert!(verify_crc(&reply).is_ok());
        assert_eq!(&reply[..5], &[0x01, 0x03, 0x02, 0xFF, 0x00]);
    }

    #[test]
    fn ignores_other_slave_addresses() {
        let slave = SimulatedSlave::new(1, "SIM0");
        let mut link = slave.open(&config("SIM0")).unwrap();
        let request = ModbusRequest::WriteSingleRegister { slave: 9, register: 1, value: 1 };
        link.write_all(&request.to_frame().unwrap()).unwrap();

        let mut byte = [0u8; 1];
        assert_eq!(link.read(&mut byte).unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert_eq!(slave.register(1), 0);
    }

    #[test]
    fn read_chunk_splits_the_reply() {
        let slave = SimulatedSlave::new(1, "SIM0");
        slave.set_read_chunk(Some(2));

        let mut link = slave.open(&config("SIM0")).unwrap();
        let request = ModbusRequest::ReadHoldingRegisters { slave: 1, start_register: 0, quantity: 1 };
        link.write_all(&request.to_frame().unwrap()).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(link.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn tracks_open_sessions() {
        let slave = SimulatedSlave::new(1, "SIM0");
        let first = slave.open(&config("SIM0")).unwrap();
        let second = slave.open(&config("SIM0")).unwrap();
        assert_eq!(slave.open_sessions(), 2);
        assert_eq!(slave.max_concurrent_sessions(), 2);

        drop(first);
        drop(second);
        assert_eq!(slave.open_sessions(), 0);
        assert!(slave.open(&config("COM7")).is_err());
    }
}
