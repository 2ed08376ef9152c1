pub mod config;
pub mod region;
pub mod types;

pub use config::{ConfigError, RosterConfig, parse_duration};
pub use region::decode_region;
pub use types::*;
