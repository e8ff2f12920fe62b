use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::registers::{Parameter, RegisterMap};
use super::traits::Plc;
use crate::config::DeviceConfig;
use crate::modbus::{Connector, LinkGuard, SerialConnector, Transaction};
use crate::utils::error::ModbusError;

/// Sentinel left in a single-register output after a failed read.
pub const READ_FAILED: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Modbus RTU controller for the pulse-generator PLC.
///
/// Every operation opens the port, runs one transaction under the link guard
/// and closes the port again; nothing is held open between calls. A failed
/// read or write leaves the connection state untouched, only `connect` and
/// `disconnect` change it.
pub struct PlcController {
    config: DeviceConfig,
    connected: AtomicBool,
    guard: LinkGuard,
    connector: Arc<dyn Connector>,
}

impl PlcController {
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_connector(config, Arc::new(SerialConnector))
    }

    pub fn with_connector(config: DeviceConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connected: AtomicBool::new(false),
            guard: LinkGuard::new(),
            connector,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Swaps the serial identity. Always disconnects first.
    pub fn reconfigure(&mut self, config: DeviceConfig) {
        self.disconnect();
        info!("⚙️  Reconfigured PLC link: {} @ {} baud", config.port_name, config.baud_rate);
        self.config = config;
    }

    pub fn available_ports(&self) -> Result<Vec<String>, ModbusError> {
        self.connector.available_ports()
    }

    pub fn read_registers(&self, register: u16, count: u16) -> Result<Vec<u16>, ModbusError> {
        self.guard.with_exclusive_access(|| {
            Transaction::new(self.connector.as_ref(), &self.config).read_registers(
                self.config.slave_address,
                register,
                count,
            )
        })
    }

    pub fn write_register(&self, register: u16, value: u16) -> Result<(), ModbusError> {
        self.guard.with_exclusive_access(|| {
            Transaction::new(self.connector.as_ref(), &self.config).write_register(
                self.config.slave_address,
                register,
                value,
            )
        })
    }

    pub fn write_registers(&self, register: u16, values: &[u16]) -> Result<(), ModbusError> {
        self.guard.with_exclusive_access(|| {
            Transaction::new(self.connector.as_ref(), &self.config).write_registers(
                self.config.slave_address,
                register,
                values,
            )
        })
    }

    fn port_is_present(&self) -> Result<(), ModbusError> {
        if self.config.port_name.trim().is_empty() {
            return Err(ModbusError::PortNotFound("<empty>".to_string()));
        }
        let ports = self.connector.available_ports()?;
        if !ports.iter().any(|p| p == &self.config.port_name) {
            return Err(ModbusError::PortNotFound(self.config.port_name.clone()));
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        self.connected.store(state == ConnectionState::Connected, Ordering::SeqCst);
    }
}

impl Plc for PlcController {
    fn connect(&self) -> bool {
        info!(
            "🔌 Connecting to PLC on {} ({} baud, slave {})",
            self.config.port_name, self.config.baud_rate, self.config.slave_address
        );

        if let Err(e) = self.port_is_present() {
            warn!("❌ {}", e);
            self.set_state(ConnectionState::Disconnected);
            return false;
        }

        let probe = RegisterMap::resolve(Parameter::PulseEnable);
        match self.read_registers(probe.offset, probe.width) {
            Ok(_) => {
                self.set_state(ConnectionState::Connected);
                info!("✅ PLC on {} is responsive", self.config.port_name);
                true
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                warn!("📵 PLC on {} did not answer the liveness read: {}", self.config.port_name, e);
                false
            }
        }
    }

    fn disconnect(&self) {
        self.set_state(ConnectionState::Disconnected);
        info!("PLC on {} marked disconnected", self.config.port_name);
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn write(&self, register: u16, value: u16) -> bool {
        match self.write_register(register, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Write of {} to register 0x{:04x} failed: {}", value, register, e);
                false
            }
        }
    }

    fn write_many(&self, register: u16, values: &[u16]) -> bool {
        match self.write_registers(register, values) {
            Ok(()) => true,
            Err(e) => {
                warn!("Write of {} registers at 0x{:04x} failed: {}", values.len(), register, e);
                false
            }
        }
    }

    fn read(&self, register: u16, value: &mut u16) -> bool {
        *value = READ_FAILED;
        match self.read_registers(register, 1) {
            Ok(values) => match values.first() {
                Some(v) => {
                    *value = *v;
                    true
                }
                None => false,
            },
            Err(e) => {
                warn!("Read of register 0x{:04x} failed: {}", register, e);
                false
            }
        }
    }

    fn read_many(&self, register: u16, count: u16, values: &mut Vec<u16>) -> bool {
        values.clear();
        match self.read_registers(register, count) {
            Ok(read) => {
                *values = read;
                true
            }
            Err(e) => {
                warn!("Read of {} registers at 0x{:04x} failed: {}", count, register, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::{Fault, SimulatedSlave};
    use crate::utils::error::ErrorKind;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    const PORT: &str = "SIM0";

    fn config() -> DeviceConfig {
        DeviceConfig {
            port_name: PORT.to_string(),
            baud_rate: 115_200,
            slave_address: 2,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
        }
    }

    fn controller() -> (PlcController, SimulatedSlave) {
        let slave = SimulatedSlave::new(2, PORT);
        let plc = PlcController::with_connector(config(), Arc::new(slave.clone()));
        (plc, slave)
    }

    fn connected() -> (PlcController, SimulatedSlave) {
        let (plc, slave) = controller();
        assert!(plc.connect());
        (plc, slave)
    }

    #[test]
    fn connect_succeeds_when_slave_answers() {
        let (plc, slave) = controller();
        assert_eq!(plc.state(), ConnectionState::Disconnected);

        assert!(plc.connect());
        assert_eq!(plc.state(), ConnectionState::Connected);
        assert_eq!(slave.sessions_opened(), 1);
    }

    #[test]
    fn connect_rejects_unlisted_port_without_opening() {
        let slave = SimulatedSlave::new(2, PORT);
        let mut config = config();
        config.port_name = "COM9".to_string();
        let plc = PlcController::with_connector(config, Arc::new(slave.clone()));

        assert!(!plc.connect());
        assert_eq!(plc.state(), ConnectionState::Disconnected);
        assert_eq!(slave.sessions_opened(), 0);
    }

    #[test]
    fn connect_rejects_empty_port() {
        let slave = SimulatedSlave::new(2, "");
        let mut config = config();
        config.port_name = String::new();
        let plc = PlcController::with_connector(config, Arc::new(slave.clone()));

        assert!(!plc.connect());
        assert_eq!(slave.sessions_opened(), 0);
    }

    #[test]
    fn failed_liveness_read_leaves_disconnected() {
        let (plc, slave) = connected();
        slave.set_fault(Some(Fault::NoResponse));

        assert!(!plc.connect());
        assert_eq!(plc.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_unconditional_and_reversible() {
        let (plc, _slave) = connected();
        plc.disconnect();
        plc.disconnect();
        assert!(!plc.is_connected());
        assert!(plc.connect());
    }

    #[test]
    fn properties_return_sentinels_when_disconnected() {
        let (plc, slave) = controller();
        slave.set_register(0x0001, 1000);

        assert!(!plc.pulse_enabled());
        assert_eq!(plc.frequency(), -1);
        assert_eq!(plc.duty_ratio(), -1);
        assert!(!plc.output(0));
        assert_eq!(slave.sessions_opened(), 0);
    }

    #[test]
    fn setters_are_no_ops_when_disconnected() {
        let (plc, slave) = controller();
        plc.set_frequency(500);
        plc.set_pulse_enabled(true);
        plc.set_output(0, true);

        assert_eq!(slave.sessions_opened(), 0);
        assert_eq!(slave.register(0x0001), 0);
    }

    #[test]
    fn logical_properties_round_trip() {
        let (plc, slave) = connected();

        plc.set_frequency(1000);
        plc.set_pulse_enabled(true);
        plc.set_duty_ratio(40);
        plc.set_output(1, true);

        assert_eq!(plc.frequency(), 1000);
        assert!(plc.pulse_enabled());
        assert_eq!(plc.duty_ratio(), 40);
        assert!(plc.output(1));
        assert!(!plc.output(0));

        assert_eq!(slave.register(0x0000), 0x0001);
        assert_eq!(slave.register(0x0004), 0xFF00);
    }

    #[test]
    fn duty_ratio_is_passed_through_unclamped() {
        let (plc, slave) = connected();
        plc.set_duty_ratio(150);

        assert_eq!(slave.register(RegisterMap::resolve(Parameter::DutyRatio).offset), 150);
        assert_eq!(plc.duty_ratio(), 150);
    }

    #[test]
    fn setters_truncate_to_the_register_width() {
        let (plc, slave) = connected();
        let frequency = RegisterMap::resolve(Parameter::Frequency).offset;

        plc.set_frequency(70_000);
        assert_eq!(slave.register(frequency), 70_000u32 as u16);

        plc.set_frequency(-1);
        assert_eq!(slave.register(frequency), 0xFFFF);
        assert_eq!(plc.frequency(), 65_535);
    }

    #[test]
    fn single_register_round_trip_across_range() {
        let (plc, _slave) = connected();
        for n in [0u16, 1, 255, 256, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF] {
            assert!(plc.write(0x0010, n));
            let mut value = 0;
            assert!(plc.read(0x0010, &mut value));
            assert_eq!(value, n);
        }
    }

    #[test]
    fn block_write_and_read() {
        let (plc, _slave) = connected();
        assert!(plc.write_many(0x0020, &[1, 2, 3, 4]));

        let mut values = Vec::new();
        assert!(plc.read_many(0x0020, 4, &mut values));
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn failed_reads_leave_sentinels_and_stay_connected() {
        let (plc, slave) = connected();
        slave.set_fault(Some(Fault::CorruptCrc));

        let mut value = 7;
        assert!(!plc.read(0x0001, &mut value));
        assert_eq!(value, READ_FAILED);

        let mut values = vec![9, 9];
        assert!(!plc.read_many(0x0001, 2, &mut values));
        assert!(values.is_empty());

        assert!(!plc.write(0x0001, 5));
        assert_eq!(plc.frequency(), -1);
        assert_eq!(plc.state(), ConnectionState::Connected);
        assert_eq!(slave.open_sessions(), 0);
    }

    #[test]
    fn rich_api_keeps_the_error_kind() {
        let (plc, slave) = connected();

        slave.set_fault(Some(Fault::NoResponse));
        assert_eq!(plc.read_registers(0, 1).unwrap_err().kind(), ErrorKind::Timeout);

        slave.set_fault(Some(Fault::Exception(0x02)));
        assert_eq!(plc.write_register(0, 1).unwrap_err().kind(), ErrorKind::Protocol);
    }

    #[test]
    fn reconfigure_forces_disconnect() {
        let (mut plc, _slave) = connected();
        let mut other = config();
        other.baud_rate = 9600;

        plc.reconfigure(other);
        assert!(!plc.is_connected());
        assert_eq!(plc.config().baud_rate, 9600);
    }

    #[test]
    fn concurrent_callers_never_share_the_link() {
        let (plc, slave) = connected();
        slave.set_response_delay(Duration::from_millis(15));
        let plc = Arc::new(plc);

        let handles: Vec<_> = (0..6u16)
            .map(|i| {
                let plc = Arc::clone(&plc);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        assert!(plc.write(0x0030 + i, i));
                    } else {
                        let mut value = 0;
                        assert!(plc.read(0x0030, &mut value));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(slave.max_concurrent_sessions(), 1);
        assert_eq!(slave.open_sessions(), 0);
    }

    #[test]
    fn second_caller_waits_for_slow_transaction() {
        let (plc, slave) = connected();
        slave.set_response_delay(Duration::from_millis(80));
        let plc = Arc::new(plc);

        let (tx, rx) = mpsc::channel();
        let slow = {
            let plc = Arc::clone(&plc);
            thread::spawn(move || {
                tx.send(()).unwrap();
                assert!(plc.write(0x0040, 1));
            })
        };
        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        let mut value = 0;
        assert!(plc.read(0x0041, &mut value));
        // Our own 80 ms reply plus whatever remained of the first one.
        assert!(started.elapsed() >= Duration::from_millis(100));

        slow.join().unwrap();
        assert_eq!(slave.max_concurrent_sessions(), 1);
    }
}
