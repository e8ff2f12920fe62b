use anyhow::Result;
use log::info;
use std::sync::Arc;

use pulse_plc::cli::{build_cli, handle_subcommands};
use pulse_plc::{Config, PlcController, SimulatedSlave};

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let matches = build_cli().get_matches();
    let config = Config::from_matches(&matches)?;
    let device = config.device_config();

    let plc = if matches.get_flag("simulate") {
        info!("🧪 Using simulated slave {} on {}", device.slave_address, device.port_name);
        let slave = SimulatedSlave::new(device.slave_address, &device.port_name);
        PlcController::with_connector(device, Arc::new(slave))
    } else {
        PlcController::new(device)
    };

    handle_subcommands(&matches, &plc)
}
