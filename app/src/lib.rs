pub mod commands;
pub mod config;

pub use commands::{parse_filter, parse_kind, Client};
pub use config::{load_config, AppConfig};
