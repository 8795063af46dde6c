// Core Module - Foundational types, config, logging, trading calendar

pub mod types;
pub mod config;
pub mod logger;
pub mod trading_day;

// Re-export commonly used items for convenience
pub use types::*;
pub use config::{
    ProviderConfig, MonitoringConfig, ConfigManager, ConfigSummary, ConfigError,
};
pub use logger::setup_logging;
pub use trading_day::{last_trading_day, last_trading_day_string, previous_trading_day_from_now};
