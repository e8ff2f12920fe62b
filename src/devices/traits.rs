use super::registers::{Parameter, RegisterMap};

/// Public contract of a pulse-generator PLC.
///
/// The register primitives report plain success/failure. The logical
/// properties are built on top of them: getters return `false` / `-1` while
/// disconnected and setters do nothing.
pub trait Plc: Send + Sync {
    fn connect(&self) -> bool;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;

    fn write(&self, register: u16, value: u16) -> bool;
    fn write_many(&self, register: u16, values: &[u16]) -> bool;

    /// On failure `value` is left at 0xFFFF.
    fn read(&self, register: u16, value: &mut u16) -> bool;
    /// On failure `values` is left empty.
    fn read_many(&self, register: u16, count: u16, values: &mut Vec<u16>) -> bool;

    fn pulse_enabled(&self) -> bool {
        self.read_flag(RegisterMap::resolve(Parameter::PulseEnable).offset)
    }

    fn set_pulse_enabled(&self, enabled: bool) {
        if self.is_connected() {
            let register = RegisterMap::resolve(Parameter::PulseEnable).offset;
            self.write(register, RegisterMap::encode_enable(enabled));
        }
    }

    /// Output frequency in Hz.
    fn frequency(&self) -> i32 {
        self.read_word(RegisterMap::resolve(Parameter::Frequency).offset)
    }

    /// Values outside 0-65535 are truncated to the register's 16 bits.
    fn set_frequency(&self, hz: i32) {
        if self.is_connected() {
            self.write(RegisterMap::resolve(Parameter::Frequency).offset, hz as u16);
        }
    }

    /// Duty ratio in percent. The device documents 1-100; values are passed
    /// through unchecked in both directions.
    fn duty_ratio(&self) -> i32 {
        self.read_word(RegisterMap::resolve(Parameter::DutyRatio).offset)
    }

    fn set_duty_ratio(&self, percent: i32) {
        if self.is_connected() {
            self.write(RegisterMap::resolve(Parameter::DutyRatio).offset, percent as u16);
        }
    }

    fn output(&self, number: u16) -> bool {
        match RegisterMap::output(number) {
            Some(address) => self.read_flag(address.offset),
            None => false,
        }
    }

    fn set_output(&self, number: u16, on: bool) {
        if !self.is_connected() {
            return;
        }
        if let Some(address) = RegisterMap::output(number) {
            self.write(address.offset, RegisterMap::encode_switch(on));
        }
    }

    #[doc(hidden)]
    fn read_word(&self, register: u16) -> i32 {
        if !self.is_connected() {
            return -1;
        }
        let mut values = Vec::new();
        if !self.read_many(register, 1, &mut values) {
            return -1;
        }
        values.first().map(|v| *v as i32).unwrap_or(-1)
    }

    #[doc(hidden)]
    fn read_flag(&self, register: u16) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut values = Vec::new();
        self.read_many(register, 1, &mut values)
            && values.first().copied().map(RegisterMap::decode_flag).unwrap_or(false)
    }
}
