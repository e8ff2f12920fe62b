use std::fmt;
use std::str::FromStr;

/// Logical parameters exposed by the pulse-generator PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    PulseEnable,
    Frequency,
    DutyRatio,
    SwitchStatus,
}

impl Parameter {
    pub const ALL: [Parameter; 4] = [
        Parameter::PulseEnable,
        Parameter::Frequency,
        Parameter::DutyRatio,
        Parameter::SwitchStatus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Parameter::PulseEnable => "pulse-enable",
            Parameter::Frequency => "frequency",
            Parameter::DutyRatio => "duty-ratio",
            Parameter::SwitchStatus => "switch-status",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown parameter '{}', expected one of: {}",
                    s,
                    Parameter::ALL.map(|p| p.name()).join(", ")
                )
            })
    }
}

/// A holding-register offset plus how many registers make up the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterAddress {
    pub offset: u16,
    pub width: u16,
}

impl RegisterAddress {
    pub const fn single(offset: u16) -> Self {
        Self { offset, width: 1 }
    }
}

// Register layout of the pulse generator. Pulse enable sits at 0x0000 so it
// no longer shares 0x0002 with the duty ratio.
const PULSE_ENABLE_ADDR: u16 = 0x0000;
const FREQUENCY_ADDR: u16 = 0x0001;
const DUTY_RATIO_ADDR: u16 = 0x0002;
const SWITCH_STATUS_ADDR: u16 = 0x0003;

pub const ENABLE_ON: u16 = 0x0001;
pub const ENABLE_OFF: u16 = 0x0000;
pub const SWITCH_ON: u16 = 0xFF00;
pub const SWITCH_OFF: u16 = 0x0000;

/// Static parameter → register table.
pub struct RegisterMap;

impl RegisterMap {
    pub const fn resolve(parameter: Parameter) -> RegisterAddress {
        match parameter {
            Parameter::PulseEnable => RegisterAddress::single(PULSE_ENABLE_ADDR),
            Parameter::Frequency => RegisterAddress::single(FREQUENCY_ADDR),
            Parameter::DutyRatio => RegisterAddress::single(DUTY_RATIO_ADDR),
            Parameter::SwitchStatus => RegisterAddress::single(SWITCH_STATUS_ADDR),
        }
    }

    /// Switch output `number` lives `number` registers past the switch-status base.
    pub fn output(number: u16) -> Option<RegisterAddress> {
        SWITCH_STATUS_ADDR
            .checked_add(number)
            .map(RegisterAddress::single)
    }

    pub fn encode_enable(enabled: bool) -> u16 {
        if enabled {
            ENABLE_ON
        } else {
            ENABLE_OFF
        }
    }

    pub fn encode_switch(on: bool) -> u16 {
        if on {
            SWITCH_ON
        } else {
            SWITCH_OFF
        }
    }

    /// Any non-zero register reads as set, for both flag encodings.
    pub fn decode_flag(value: u16) -> bool {
        value != 0
    }
}
