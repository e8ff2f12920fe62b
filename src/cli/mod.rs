pub mod commands;

use clap::{Arg, ArgAction, Command};

pub use commands::handle_subcommands;

pub fn build_cli() -> Command {
    Command::new("pulse-plc")
        .version(crate::VERSION)
        .about("Drive the pulse-generator PLC over Modbus RTU")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML file with serial_port, baud_rate, slave_address and timeouts")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Serial port, e.g. COM3 or /dev/ttyUSB0")
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .help("Baud rate")
                .global(true),
        )
        .arg(
            Arg::new("slave")
                .short('s')
                .long("slave")
                .value_name("ADDR")
                .help("Modbus slave address (decimal or 0x..)")
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Read and write timeout in milliseconds")
                .global(true),
        )
        .arg(
            Arg::new("simulate")
                .long("simulate")
                .action(ArgAction::SetTrue)
                .help("Talk to an in-memory slave instead of a serial port")
                .global(true),
        )
        .subcommand(Command::new("ports").about("List serial ports on this host"))
        .subcommand(Command::new("probe").about("Check that the PLC answers on the configured port"))
        .subcommand(
            Command::new("get")
                .about("Read a logical parameter")
                .arg(Arg::new("parameter").required(true).help(PARAMETER_HELP)),
        )
        .subcommand(
            Command::new("set")
                .about("Write a logical parameter and read it back")
                .arg(Arg::new("parameter").required(true).help(PARAMETER_HELP))
                .arg(Arg::new("value").required(true).help("Number, or on/off for flags")),
        )
        .subcommand(
            Command::new("read")
                .about("Read raw holding registers")
                .arg(Arg::new("register").required(true).help("Start register (decimal or 0x..)"))
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_name("N")
                        .default_value("1"),
                ),
        )
        .subcommand(
            Command::new("write")
                .about("Write raw holding registers")
                .arg(Arg::new("register").required(true).help("Start register (decimal or 0x..)"))
                .arg(
                    Arg::new("values")
                        .required(true)
                        .num_args(1..)
                        .help("One value writes a single register, several write a block"),
                ),
        )
        .subcommand(
            Command::new("output")
                .about("Read or switch a digital output")
                .arg(Arg::new("number").required(true).help("Output number, 0 = first"))
                .arg(Arg::new("state").help("on or off; omit to read")),
        )
}

const PARAMETER_HELP: &str = "pulse-enable, frequency, duty-ratio or switch-status";
