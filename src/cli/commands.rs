use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use log::info;

use crate::config::parse_number;
use crate::devices::{Parameter, Plc, PlcController, RegisterMap};
use crate::modbus::link::describe_ports;

pub fn handle_subcommands(matches: &ArgMatches, plc: &PlcController) -> Result<()> {
    match matches.subcommand() {
        Some(("ports", _)) => list_ports(matches, plc),
        Some(("probe", _)) => {
            require_connection(plc)?;
            println!("✅ PLC answers on {}", plc.config().port_name);
            Ok(())
        }
        Some(("get", sub)) => {
            let parameter = parameter_arg(sub)?;
            require_connection(plc)?;
            println!("📈 {}: {}", parameter, read_parameter(plc, parameter));
            Ok(())
        }
        Some(("set", sub)) => {
            let parameter = parameter_arg(sub)?;
            let value = string_arg(sub, "value")?;
            require_connection(plc)?;
            set_parameter(plc, parameter, value)?;
            println!("✅ {} is now {}", parameter, read_parameter(plc, parameter));
            Ok(())
        }
        Some(("read", sub)) => {
            let register: u16 = parse_number(string_arg(sub, "register")?, "register")?;
            let count: u16 = parse_number(string_arg(sub, "count")?, "count")?;
            let values = plc
                .read_registers(register, count)
                .with_context(|| format!("reading {} register(s) at 0x{:04x}", count, register))?;
            for (offset, value) in values.iter().enumerate() {
                println!("0x{:04x}: {:5} (0x{:04x})", register as usize + offset, value, value);
            }
            Ok(())
        }
        Some(("write", sub)) => {
            let register: u16 = parse_number(string_arg(sub, "register")?, "register")?;
            let values = sub
                .get_many::<String>("values")
                .ok_or_else(|| anyhow!("no values given"))?
                .map(|v| parse_number::<u16>(v, "value"))
                .collect::<Result<Vec<_>, _>>()?;

            let written = match values.as_slice() {
                [single] => plc.write_register(register, *single),
                block => plc.write_registers(register, block),
            };
            written.with_context(|| format!("writing {} register(s) at 0x{:04x}", values.len(), register))?;
            println!("✅ Wrote {} register(s) at 0x{:04x}", values.len(), register);
            Ok(())
        }
        Some(("output", sub)) => {
            let number: u16 = parse_number(string_arg(sub, "number")?, "number")?;
            require_connection(plc)?;
            if let Some(state) = sub.get_one::<String>("state") {
                let address =
                    RegisterMap::output(number).ok_or_else(|| anyhow!("output {} has no register", number))?;
                plc.write_register(address.offset, RegisterMap::encode_switch(parse_flag(state)?))
                    .with_context(|| format!("switching output {} at 0x{:04x}", number, address.offset))?;
            }
            println!("🔘 Output {}: {}", number, on_off(plc.output(number)));
            Ok(())
        }
        _ => bail!("unknown command, see --help"),
    }
}

fn list_ports(matches: &ArgMatches, plc: &PlcController) -> Result<()> {
    let ports = if matches.get_flag("simulate") {
        plc.available_ports()?
    } else {
        describe_ports()?
    };

    println!("📡 Available Serial Ports:");
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
    }
    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port);
    }
    Ok(())
}

fn require_connection(plc: &PlcController) -> Result<()> {
    if plc.connect() {
        info!("Connected to {}", plc.config().port_name);
        Ok(())
    } else {
        bail!(
            "PLC not reachable on {} (slave {}); run `pulse-plc ports` to list available ports",
            plc.config().port_name,
            plc.config().slave_address
        )
    }
}

fn read_parameter(plc: &dyn Plc, parameter: Parameter) -> String {
    match parameter {
        Parameter::PulseEnable => on_off(plc.pulse_enabled()).to_string(),
        Parameter::Frequency => format!("{} Hz", plc.frequency()),
        Parameter::DutyRatio => format!("{} %", plc.duty_ratio()),
        Parameter::SwitchStatus => on_off(plc.output(0)).to_string(),
    }
}

fn set_parameter(plc: &PlcController, parameter: Parameter, value: &str) -> Result<()> {
    let register = RegisterMap::resolve(parameter).offset;
    let word = match parameter {
        Parameter::PulseEnable => RegisterMap::encode_enable(parse_flag(value)?),
        Parameter::Frequency => parse_number(value, "frequency")?,
        Parameter::DutyRatio => parse_number(value, "duty-ratio")?,
        Parameter::SwitchStatus => RegisterMap::encode_switch(parse_flag(value)?),
    };
    plc.write_register(register, word)
        .with_context(|| format!("setting {} at 0x{:04x}", parameter, register))
}

fn parameter_arg(sub: &ArgMatches) -> Result<Parameter> {
    string_arg(sub, "parameter")?.parse::<Parameter>().map_err(|e| anyhow!(e))
}

fn string_arg<'a>(sub: &'a ArgMatches, name: &str) -> Result<&'a str> {
    sub.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{}>", name))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "enable" => Ok(true),
        "off" | "false" | "0" | "disable" => Ok(false),
        other => bail!("expected on/off, got '{}'", other),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
