pub mod settings;

pub use settings::{parse_number, Config, DeviceConfig};
