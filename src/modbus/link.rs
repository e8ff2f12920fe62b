use log::{debug, error, info};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

use crate::config::DeviceConfig;
use crate::utils::error::ModbusError;

/// An open byte stream to the slave. Dropping it closes the port.
pub trait Link: Read + Write + Send {
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ModbusError>;
}

impl Link for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ModbusError> {
        SerialPort::set_timeout(self.as_mut(), timeout).map_err(ModbusError::from)
    }
}

/// Opens links to the serial identity named in a [`DeviceConfig`].
pub trait Connector: Send + Sync {
    fn available_ports(&self) -> Result<Vec<String>, ModbusError>;
    fn open(&self, config: &DeviceConfig) -> Result<Box<dyn Link>, ModbusError>;
}

/// Host serial ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn available_ports(&self) -> Result<Vec<String>, ModbusError> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|port| port.port_name).collect())
    }

    fn open(&self, config: &DeviceConfig) -> Result<Box<dyn Link>, ModbusError> {
        debug!(
            "🔌 Opening {} at {} baud, 8 data bits, no parity, 1 stop bit",
            config.port_name, config.baud_rate
        );

        let port = serialport::new(config.port_name.as_str(), config.baud_rate)
            .timeout(config.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port_name, e);
                ModbusError::from(e)
            })?;

        Ok(Box::new(port))
    }
}

/// Lists host serial ports with whatever USB details the OS reports.
pub fn describe_ports() -> Result<Vec<String>, ModbusError> {
    let ports = serialport::available_ports()?;
    info!("📡 Found {} serial port(s)", ports.len());

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "{} (USB {:04x}:{:04x}{})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.manufacturer.map(|m| format!(", {}", m)).unwrap_or_default()
            ),
            serialport::SerialPortType::PciPort => format!("{} (PCI)", port.port_name),
            serialport::SerialPortType::BluetoothPort => format!("{} (Bluetooth)", port.port_name),
            serialport::SerialPortType::Unknown => port.port_name,
        })
        .collect())
}
